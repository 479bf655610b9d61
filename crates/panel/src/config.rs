//! Panel description
//!
//! Immutable snapshot handed to [`Panel::new`](crate::Panel::new). Parsing
//! (device tree, JSON) happens outside the core; with the `serde` feature
//! every type here can be read from JSON directly.
//!
//! [`PanelConfig::validate`] checks every invariant the runtime relies on, so
//! the lifecycle, backlight and mode code never re-check them.

use heapless::{String, Vec};
use platform::{CommandSet, CommandSetKind, RailId};

use crate::error::ConfigError;

// ── Limits ───────────────────────────────────────────────────────────────────

/// Largest raw backlight level.
pub const MAX_BL_LEVEL: u32 = 4096;
/// Denominator of the normal backlight scale.
pub const MAX_BL_SCALE_LEVEL: u32 = 1024;
/// Denominator of the ambient (AD) backlight scale.
pub const MAX_AD_BL_SCALE_LEVEL: u32 = 65535;
/// Most display modes a panel can declare.
pub const DSI_MODE_MAX: usize = 5;
/// Default wait after the fingerprint overlay is switched off, in ms.
pub const DEFAULT_FOD_OFF_DIMMING_DELAY: u32 = 170;
/// Largest backlight delta correction, in raw levels.
pub const HIST_BL_OFFSET_LIMIT: u32 = 48;

/// Rails per panel.
pub const MAX_RAILS: usize = 6;
/// Reset steps per panel.
pub const MAX_RESET_STEPS: usize = 8;
/// Pre-power lines per panel.
pub const MAX_PRE_POWER_LINES: usize = 6;
/// Entries per dimming table.
pub const MAX_LUT_ENTRIES: usize = 32;
/// Panel-wide command sets.
pub const MAX_PANEL_SETS: usize = 20;
/// Mode-specific command sets.
pub const MAX_MODE_SETS: usize = 4;
/// Refresh rates in the DFPS list.
pub const MAX_DFPS_RATES: usize = 8;
/// Bit clocks in the dynamic clock list.
pub const MAX_DYN_CLK_RATES: usize = 8;
/// ESD check groups.
pub const MAX_ESD_GROUPS: usize = 4;
/// Bytes per ESD check group.
pub const MAX_ESD_BYTES: usize = 8;

/// Panel, rail and mode names.
pub type Name = String<32>;

// ── Top level ────────────────────────────────────────────────────────────────

/// Complete panel description.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PanelConfig {
    /// Panel name.
    pub name: Name,
    /// Physical panel or bridge passthrough.
    pub kind: PanelKind,
    /// Host settings shared by every mode.
    #[cfg_attr(feature = "serde", serde(default))]
    pub host: HostConfigCommon,
    /// Declared modes.
    pub modes: Vec<DisplayMode, DSI_MODE_MAX>,
    /// Mode selected at start-up.
    #[cfg_attr(feature = "serde", serde(default))]
    pub default_mode: usize,
    /// Dynamic refresh rate capabilities.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dfps: DfpsCaps,
    /// Dynamic bit clock capabilities.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dyn_clk: DynClkCaps,
    /// Dynamic mode switch support.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dms: DmsMode,
    /// Physical properties.
    #[cfg_attr(feature = "serde", serde(default))]
    pub phy: PhyProps,
}

/// Physical panel or bridge passthrough.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(clippy::large_enum_variant)]
pub enum PanelKind {
    /// DSI panel driven by this core.
    Dsi(DsiPanelConfig),
    /// External bridge; the core only tracks state.
    ExtBridge,
}

/// Host settings shared by every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HostConfigCommon {
    /// Data lanes in use.
    pub num_lanes: u8,
    /// Uncompressed bits per pixel.
    pub bpp: u8,
}

impl Default for HostConfigCommon {
    fn default() -> Self {
        Self {
            num_lanes: 4,
            bpp: 24,
        }
    }
}

/// Everything a physical DSI panel needs beyond its modes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DsiPanelConfig {
    /// Regulator rails.
    pub power: PowerConfig,
    /// Lines raised before the rails.
    pub pre_power: PrePowerConfig,
    /// Reset sequence and control lines.
    pub reset: ResetConfig,
    /// Backlight.
    pub backlight: BacklightConfig,
    /// ESD checking, if supported.
    pub esd: Option<EsdConfig>,
    /// Panel-wide command sets.
    pub command_sets: Vec<CommandSet, MAX_PANEL_SETS>,
    /// Optional behaviours.
    pub features: PanelFeatures,
}

impl DsiPanelConfig {
    /// Look up a command set, preferring the mode's own table.
    pub fn command_set<'a>(
        &'a self,
        kind: CommandSetKind,
        mode: Option<&'a DisplayMode>,
    ) -> Option<&'a CommandSet> {
        mode.and_then(|m| m.command_sets.iter().find(|s| s.kind == kind))
            .or_else(|| self.command_sets.iter().find(|s| s.kind == kind))
    }
}

// ── Power and reset ──────────────────────────────────────────────────────────

/// Regulator rails, in power-on order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PowerConfig {
    /// Rails, enabled in order and disabled in reverse.
    pub rails: Vec<Rail, MAX_RAILS>,
}

/// One regulator rail.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rail {
    /// Rail handle passed to the power collaborator.
    pub id: RailId,
    /// Supply name.
    pub name: Name,
    /// Wait before enabling, ms.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pre_on_ms: u32,
    /// Wait after enabling, ms.
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_on_ms: u32,
    /// Wait before disabling, ms.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pre_off_ms: u32,
    /// Wait after disabling, ms.
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_off_ms: u32,
}

/// External enable lines raised in `pre_prepare`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrePowerConfig {
    /// Line indices, driven high in order and low in reverse.
    pub lines: Vec<u8, MAX_PRE_POWER_LINES>,
}

/// One reset step: drive the line, then wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResetStep {
    /// Line level, non-zero is high.
    pub level: u8,
    /// Wait after the write, ms.
    pub sleep_ms: u32,
}

impl ResetStep {
    /// Create a step.
    pub const fn new(level: u8, sleep_ms: u32) -> Self {
        Self { level, sleep_ms }
    }

    /// Line is driven high.
    pub const fn is_high(self) -> bool {
        self.level != 0
    }
}

/// Mode-select line setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeSelect {
    /// Dual-port panel (line low).
    DualPort,
    /// Single-port panel (line high).
    SinglePort,
    /// Drive high.
    High,
    /// Drive low.
    Low,
}

impl ModeSelect {
    /// Line level.
    pub const fn is_high(self) -> bool {
        matches!(self, Self::SinglePort | Self::High)
    }
}

/// Reset sequence and control lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResetConfig {
    /// Steps replayed in order on power-on.
    pub steps: Vec<ResetStep, MAX_RESET_STEPS>,
    /// Panel has a display-enable line.
    pub display_enable: bool,
    /// Panel has a mode-select line.
    pub mode_select: Option<ModeSelect>,
    /// Leave the reset line alone on power-on (bootloader already reset it).
    pub skip_reset: bool,
}

// ── Backlight ────────────────────────────────────────────────────────────────

/// How the backlight level reaches the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BacklightTransport {
    /// PWM channel.
    Pwm {
        /// PWM period.
        period_us: u32,
    },
    /// WLED driver.
    Wled,
    /// DCS brightness command over the command channel.
    Dcs {
        /// Send the low byte first.
        byte_swap: bool,
    },
    /// No backlight control.
    #[default]
    Unknown,
}

/// Where the delta correction applies relative to scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeltaOrder {
    /// Scale, then add the delta.
    #[default]
    AfterScale,
    /// Add the delta, then scale.
    BeforeScale,
}

/// One (brightness, alpha) point of a dimming table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DimPair {
    /// Raw backlight level.
    pub brightness: u32,
    /// Overlay alpha at that level.
    pub alpha: u32,
}

impl DimPair {
    /// Create a point.
    pub const fn new(brightness: u32, alpha: u32) -> Self {
        Self { brightness, alpha }
    }
}

/// Dimming table, ascending by brightness.
pub type DimLut = Vec<DimPair, MAX_LUT_ENTRIES>;

/// Backlight configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BacklightConfig {
    /// Output transport.
    pub transport: BacklightTransport,
    /// Lowest non-zero raw level.
    pub bl_min_level: u32,
    /// Highest raw level.
    pub bl_max_level: u32,
    /// Highest logical brightness.
    pub brightness_max_level: u32,
    /// Doze target, low brightness.
    pub bl_doze_lbm: u32,
    /// Doze target, high brightness.
    pub bl_doze_hbm: u32,
    /// Delta placement.
    pub delta_order: DeltaOrder,
    /// Overlay alpha table.
    pub dim_lut: DimLut,
    /// Overlay alpha table while the fingerprint overlay is on.
    pub fod_dim_lut: DimLut,
    /// Lowest level driven while DC dimming is on; 0 when the panel has no
    /// DC dimming.
    pub dc_threshold: u32,
}

impl Default for BacklightConfig {
    fn default() -> Self {
        Self {
            transport: BacklightTransport::Unknown,
            bl_min_level: 1,
            bl_max_level: MAX_BL_LEVEL.saturating_sub(1),
            brightness_max_level: 255,
            bl_doze_lbm: 0,
            bl_doze_hbm: 0,
            delta_order: DeltaOrder::AfterScale,
            dim_lut: Vec::new(),
            fod_dim_lut: Vec::new(),
            dc_threshold: 0,
        }
    }
}

// ── Features ─────────────────────────────────────────────────────────────────

/// ELVSS dimming offset correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElvssDimming {
    /// Bits of the read-back register that carry the offset.
    pub valid_bits: u8,
}

/// Optional panel behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PanelFeatures {
    /// Send `Lp11Init` during prepare.
    pub lp11_init: bool,
    /// Signed correction added to every non-zero level.
    pub backlight_delta: i32,
    /// Doze picks low brightness at or below this raw level.
    pub doze_backlight_threshold: u32,
    /// Delay before `DimmingOn` after post-enable, ms. Zero disables the ramp.
    pub panel_on_dimming_delay_ms: u32,
    /// ELVSS dimming offset correction.
    pub elvss_dimming: Option<ElvssDimming>,
    /// Send `CrcP3Gamut` after post-on.
    pub crc_p3_gamut: bool,
    /// Wait after the fingerprint overlay is switched off, ms.
    pub fod_off_dimming_delay_ms: u32,
}

impl Default for PanelFeatures {
    fn default() -> Self {
        Self {
            lp11_init: false,
            backlight_delta: 0,
            doze_backlight_threshold: 0,
            panel_on_dimming_delay_ms: 0,
            elvss_dimming: None,
            crc_p3_gamut: false,
            fod_off_dimming_delay_ms: DEFAULT_FOD_OFF_DIMMING_DELAY,
        }
    }
}

// ── ESD ──────────────────────────────────────────────────────────────────────

/// Expected content of one ESD check group.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EsdExpect {
    /// Healthy when the masked bytes equal these.
    Valid(Vec<u8, MAX_ESD_BYTES>),
    /// Unhealthy when the masked bytes equal these.
    Invalid(Vec<u8, MAX_ESD_BYTES>),
}

impl EsdExpect {
    /// Reference bytes.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Valid(b) | Self::Invalid(b) => b,
        }
    }
}

/// One slice of the status response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EsdCheckGroup {
    /// First byte of the slice in the response.
    pub offset: usize,
    /// Per-byte mask; the slice length is the mask length.
    pub mask: Vec<u8, MAX_ESD_BYTES>,
    /// Reference value.
    pub expect: EsdExpect,
}

/// Register read-back check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegReadCheck {
    /// Status query command set.
    pub status_cmd: CommandSet,
    /// Response bytes to read.
    pub read_len: usize,
    /// Groups; all must pass.
    pub groups: Vec<EsdCheckGroup, MAX_ESD_GROUPS>,
}

/// ESD detection mode.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EsdMode {
    /// Read status registers and compare.
    RegisterRead(RegReadCheck),
    /// Software bus-turn-around.
    BusTurnaround,
    /// Tearing-effect signal must arrive.
    PanelTe {
        /// Wait budget, ms.
        timeout_ms: u32,
    },
}

/// ESD checking.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EsdConfig {
    /// Detection mode.
    pub mode: EsdMode,
    /// Move onto the command link for the query.
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_cmd_channel: bool,
    /// Polling period, ms.
    #[cfg_attr(feature = "serde", serde(default = "default_esd_interval"))]
    pub check_interval_ms: u32,
}

#[cfg(feature = "serde")]
fn default_esd_interval() -> u32 {
    5000
}

// ── Modes ────────────────────────────────────────────────────────────────────

/// Mode timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModeTiming {
    /// Active pixels per line.
    pub h_active: u32,
    /// Horizontal front porch.
    pub h_front_porch: u32,
    /// Horizontal back porch.
    pub h_back_porch: u32,
    /// Horizontal sync width.
    pub h_sync_width: u32,
    /// Horizontal skew.
    pub h_skew: u32,
    /// Active lines.
    pub v_active: u32,
    /// Vertical front porch.
    pub v_front_porch: u32,
    /// Vertical back porch.
    pub v_back_porch: u32,
    /// Vertical sync width.
    pub v_sync_width: u32,
    /// Frames per second.
    pub refresh_rate: u32,
}

impl ModeTiming {
    /// Pixels per line including blanking.
    pub fn h_total(&self) -> u32 {
        self.h_active
            .saturating_add(self.h_front_porch)
            .saturating_add(self.h_back_porch)
            .saturating_add(self.h_sync_width)
    }

    /// Lines per frame including blanking.
    pub fn v_total(&self) -> u32 {
        self.v_active
            .saturating_add(self.v_front_porch)
            .saturating_add(self.v_back_porch)
            .saturating_add(self.v_sync_width)
    }

    /// Pixel clock for this timing.
    pub fn pixel_clock_hz(&self) -> u64 {
        u64::from(self.h_total())
            .saturating_mul(u64::from(self.v_total()))
            .saturating_mul(u64::from(self.refresh_rate))
    }

    /// Same active area.
    pub fn same_resolution(&self, other: &Self) -> bool {
        self.h_active == other.h_active && self.v_active == other.v_active
    }
}

/// Video or command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpMode {
    /// Continuous video stream.
    #[default]
    Video,
    /// Frame updates by command.
    Command,
}

/// Display stream compression slice parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DscConfig {
    /// Slice width, pixels.
    pub slice_width: u32,
    /// Slice height, lines.
    pub slice_height: u32,
    /// Slices per packet.
    pub slice_per_pkt: u32,
    /// Compressed bits per pixel.
    pub bpp: u32,
    /// Bits per component.
    pub bpc: u8,
}

/// One declared mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayMode {
    /// Mode name.
    pub name: Name,
    /// Timing.
    pub timing: ModeTiming,
    /// Video or command mode.
    #[cfg_attr(feature = "serde", serde(default))]
    pub op_mode: OpMode,
    /// Compression, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dsc: Option<DscConfig>,
    /// Link bit clock, Hz. Zero lets the host derive it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub bit_clk_hz: u64,
    /// Mode-specific command sets.
    #[cfg_attr(feature = "serde", serde(default))]
    pub command_sets: Vec<CommandSet, MAX_MODE_SETS>,
}

/// How a refresh rate change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DfpsType {
    /// Needs a full suspend / resume.
    #[default]
    SuspendResume,
    /// Rescale the pixel clock.
    ImmediateClock,
    /// Stretch the horizontal front porch.
    ImmediateHfp,
    /// Stretch the vertical front porch.
    ImmediateVfp,
}

/// Dynamic refresh rate capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DfpsCaps {
    /// Update method.
    pub dfps_type: DfpsType,
    /// Lowest rate.
    pub min_refresh_rate: u32,
    /// Highest rate.
    pub max_refresh_rate: u32,
    /// Allowed rates.
    pub dfps_list: Vec<u32, MAX_DFPS_RATES>,
    /// Refresh rate changes allowed at all.
    pub dfps_support: bool,
}

/// Dynamic bit clock capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DynClkCaps {
    /// Bit clock changes allowed at all.
    pub support: bool,
    /// Allowed bit clocks, Hz.
    pub bit_clk_list: Vec<u64, MAX_DYN_CLK_RATES>,
}

/// Dynamic mode switch support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DmsMode {
    /// Resolution changes need a full modeset.
    #[default]
    Disabled,
    /// Resolution changes applied immediately.
    ResSwitchImmediate,
}

/// Panel orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rotation {
    /// As mounted.
    #[default]
    None,
    /// Horizontal and vertical flip.
    HvFlip,
    /// Horizontal flip.
    HFlip,
    /// Vertical flip.
    VFlip,
}

/// Physical properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PhyProps {
    /// Active area width, mm.
    pub width_mm: u32,
    /// Active area height, mm.
    pub height_mm: u32,
    /// Orientation.
    pub rotation: Rotation,
}

// ── Validation ───────────────────────────────────────────────────────────────

/// `true` if brightness and alpha never decrease.
pub fn lut_is_monotonic(lut: &[DimPair]) -> bool {
    lut.windows(2).all(|w| match w {
        [a, b] => a.brightness <= b.brightness && a.alpha <= b.alpha,
        _ => true,
    })
}

impl PanelConfig {
    /// Check every invariant the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modes.is_empty() {
            return Err(ConfigError::ModeCount {
                found: 0,
                max: DSI_MODE_MAX,
            });
        }
        if self.default_mode >= self.modes.len() {
            return Err(ConfigError::DefaultMode(self.default_mode));
        }
        for (i, mode) in self.modes.iter().enumerate() {
            validate_mode(i, mode)?;
        }
        self.validate_dfps()?;
        if self.dyn_clk.support && self.dyn_clk.bit_clk_list.is_empty() {
            return Err(ConfigError::DynClkCaps);
        }
        match &self.kind {
            PanelKind::Dsi(dsi) => dsi.validate(),
            PanelKind::ExtBridge => Ok(()),
        }
    }

    fn validate_dfps(&self) -> Result<(), ConfigError> {
        let caps = &self.dfps;
        if !caps.dfps_support {
            return Ok(());
        }
        if caps.dfps_list.is_empty() || caps.min_refresh_rate > caps.max_refresh_rate {
            return Err(ConfigError::DfpsCaps);
        }
        let in_range = caps
            .dfps_list
            .iter()
            .all(|r| (caps.min_refresh_rate..=caps.max_refresh_rate).contains(r));
        if in_range {
            Ok(())
        } else {
            Err(ConfigError::DfpsCaps)
        }
    }

    /// Physical panel settings, `None` for a bridge.
    pub fn dsi(&self) -> Option<&DsiPanelConfig> {
        match &self.kind {
            PanelKind::Dsi(dsi) => Some(dsi),
            PanelKind::ExtBridge => None,
        }
    }
}

fn validate_mode(index: usize, mode: &DisplayMode) -> Result<(), ConfigError> {
    let t = &mode.timing;
    if t.h_active == 0 || t.v_active == 0 || t.refresh_rate == 0 {
        return Err(ConfigError::Timing(index));
    }
    if let Some(dsc) = &mode.dsc {
        let ok = dsc.slice_width != 0
            && dsc.slice_height != 0
            && dsc.slice_per_pkt != 0
            && dsc.bpp != 0
            && dsc.slice_width <= t.h_active
            && t.h_active.checked_rem(dsc.slice_width) == Some(0);
        if !ok {
            return Err(ConfigError::Dsc(index));
        }
    }
    Ok(())
}

impl DsiPanelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let bl = &self.backlight;
        if bl.brightness_max_level == 0
            || bl.bl_min_level > bl.bl_max_level
            || bl.bl_max_level > MAX_BL_LEVEL
            || bl.bl_doze_lbm > bl.bl_max_level
            || bl.bl_doze_hbm > bl.bl_max_level
            || bl.dc_threshold > bl.bl_max_level
        {
            return Err(ConfigError::BacklightRange);
        }
        if !lut_is_monotonic(&bl.dim_lut) || !lut_is_monotonic(&bl.fod_dim_lut) {
            return Err(ConfigError::DimmingLut);
        }
        if self.features.backlight_delta.unsigned_abs() > HIST_BL_OFFSET_LIMIT {
            return Err(ConfigError::BacklightDelta(self.features.backlight_delta));
        }

        for (i, line) in self.pre_power.lines.iter().enumerate() {
            if self.pre_power.lines.iter().skip(i.saturating_add(1)).any(|l| l == line) {
                return Err(ConfigError::PrePowerLine(*line));
            }
        }

        if let Some(EsdConfig {
            mode: EsdMode::RegisterRead(check),
            ..
        }) = &self.esd
        {
            for (i, group) in check.groups.iter().enumerate() {
                let end = group.offset.saturating_add(group.mask.len());
                if group.mask.is_empty()
                    || group.mask.len() != group.expect.bytes().len()
                    || end > check.read_len
                    || check.read_len > platform::channel::MAX_READ_LEN
                {
                    return Err(ConfigError::EsdGroup(i));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::testing::sample_config;

    #[test]
    fn test_sample_is_valid() {
        assert_eq!(sample_config().validate(), Ok(()));
    }

    #[test]
    fn test_no_modes_rejected() {
        let mut cfg = sample_config();
        cfg.modes.clear();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ModeCount {
                found: 0,
                max: DSI_MODE_MAX
            })
        );
    }

    #[test]
    fn test_default_mode_out_of_range() {
        let mut cfg = sample_config();
        cfg.default_mode = cfg.modes.len();
        assert_eq!(cfg.validate(), Err(ConfigError::DefaultMode(cfg.modes.len())));
    }

    #[test]
    fn test_non_monotonic_lut_rejected() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.dim_lut.clear();
            dsi.backlight.dim_lut.push(DimPair::new(10, 200)).unwrap();
            dsi.backlight.dim_lut.push(DimPair::new(20, 100)).unwrap();
        }
        assert_eq!(cfg.validate(), Err(ConfigError::DimmingLut));
    }

    #[test]
    fn test_dc_threshold_above_max_rejected() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.dc_threshold = dsi.backlight.bl_max_level + 1;
        }
        assert_eq!(cfg.validate(), Err(ConfigError::BacklightRange));
    }

    #[test]
    fn test_backlight_max_above_hardware_limit() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.bl_max_level = MAX_BL_LEVEL + 1;
        }
        assert_eq!(cfg.validate(), Err(ConfigError::BacklightRange));
    }

    #[test]
    fn test_dfps_rate_outside_range() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_list.push(144).unwrap();
        assert_eq!(cfg.validate(), Err(ConfigError::DfpsCaps));
    }

    #[test]
    fn test_esd_group_past_read_len() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            if let Some(EsdConfig {
                mode: EsdMode::RegisterRead(check),
                ..
            }) = &mut dsi.esd
            {
                check.groups[0].offset = check.read_len;
            }
        }
        assert_eq!(cfg.validate(), Err(ConfigError::EsdGroup(0)));
    }

    #[test]
    fn test_mode_sets_shadow_panel_sets() {
        let cfg = sample_config();
        let dsi = cfg.dsi().unwrap();
        let mode = &cfg.modes[1];
        let set = dsi.command_set(CommandSetKind::TimingSwitch, Some(mode)).unwrap();
        assert_eq!(set.commands[0].payload.as_slice(), &[0x2f, 0x02]);
        let fallback = dsi.command_set(CommandSetKind::TimingSwitch, None).unwrap();
        assert_eq!(fallback.commands[0].payload.as_slice(), &[0x2f, 0x00]);
    }

    #[test]
    fn test_bridge_skips_panel_checks() {
        let mut cfg = sample_config();
        cfg.kind = PanelKind::ExtBridge;
        assert_eq!(cfg.validate(), Ok(()));
        assert!(cfg.dsi().is_none());
    }

    #[test]
    fn test_timing_totals() {
        let t = ModeTiming {
            h_active: 1080,
            h_front_porch: 16,
            h_back_porch: 16,
            h_sync_width: 8,
            v_active: 2400,
            v_front_porch: 20,
            v_back_porch: 8,
            v_sync_width: 2,
            refresh_rate: 60,
            ..ModeTiming::default()
        };
        assert_eq!(t.h_total(), 1120);
        assert_eq!(t.v_total(), 2430);
        assert_eq!(t.pixel_clock_hz(), 1120 * 2430 * 60);
    }
}
