//! Display mode management
//!
//! Owns the declared mode list, the current mode and any runtime timing or
//! bit clock override derived from the capability lists. Requests outside
//! the declared capabilities are refused before any hardware is touched.

use heapless::Vec;

use crate::config::{
    DfpsCaps, DfpsType, DisplayMode, DmsMode, DscConfig, DynClkCaps, HostConfigCommon, ModeTiming,
    OpMode, PanelConfig, DSI_MODE_MAX,
};
use crate::error::UnsupportedModeError;

/// DSC packet parameters for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DscPclkParams {
    /// Slices across the interface.
    pub slice_per_intf: u32,
    /// Slices per packet.
    pub slice_per_pkt: u32,
    /// Compressed bytes per slice line.
    pub bytes_in_slice: u32,
    /// Compressed bytes per line.
    pub total_bytes_per_intf: u32,
    /// Bytes left over at end of line.
    pub eol_byte_num: u32,
    /// Pixel clocks per line.
    pub pclk_per_line: u32,
    /// Bytes per packet.
    pub bytes_per_pkt: u32,
    /// Packets per line.
    pub pkt_per_line: u32,
}

/// Packet parameters for a DSC interface `intf_width` pixels wide.
///
/// Returns `None` for a zero slice width or slices-per-packet, or an
/// interface narrower than one slice.
pub fn dsc_pclk_params(intf_width: u32, dsc: &DscConfig) -> Option<DscPclkParams> {
    if dsc.slice_width == 0 || dsc.slice_per_pkt == 0 || intf_width < dsc.slice_width {
        return None;
    }
    let slice_per_intf = intf_width.div_ceil(dsc.slice_width);
    let slice_per_pkt = if dsc.slice_per_pkt > slice_per_intf {
        1
    } else {
        dsc.slice_per_pkt
    };
    let bytes_in_slice = dsc.slice_width.checked_mul(dsc.bpp)?.div_ceil(8);
    let total_bytes_per_intf = bytes_in_slice.checked_mul(slice_per_intf)?;
    Some(DscPclkParams {
        slice_per_intf,
        slice_per_pkt,
        bytes_in_slice,
        total_bytes_per_intf,
        eol_byte_num: total_bytes_per_intf.checked_rem(3)?,
        pclk_per_line: total_bytes_per_intf.div_ceil(3),
        bytes_per_pkt: bytes_in_slice.checked_mul(slice_per_pkt)?,
        pkt_per_line: slice_per_intf.checked_div(slice_per_pkt)?,
    })
}

/// Settings the DSI host needs for the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Effective timing (with any refresh rate adjustment).
    pub timing: ModeTiming,
    /// Video or command mode.
    pub op_mode: OpMode,
    /// Link bit clock, Hz.
    pub bit_clk_hz: u64,
    /// Pixel clock, Hz.
    pub pixel_clock_hz: u64,
    /// Data lanes.
    pub num_lanes: u8,
    /// Uncompressed bits per pixel.
    pub bpp: u8,
    /// DSC packet parameters, if compressed.
    pub dsc: Option<DscPclkParams>,
}

/// What a mode switch involves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPlan {
    /// Current mode index.
    pub from: usize,
    /// Destination mode index.
    pub to: usize,
    /// Active area changes.
    pub resolution_change: bool,
}

/// How a refresh rate request is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Already running at that rate.
    Unchanged,
    /// A declared mode with the same resolution runs at that rate.
    SwitchMode(usize),
    /// Current timing adjusted in place.
    Adjust(ModeTiming),
}

/// Declared modes and the current selection.
#[derive(Debug, Clone)]
pub struct ModeManager {
    modes: Vec<DisplayMode, DSI_MODE_MAX>,
    current: usize,
    timing_override: Option<ModeTiming>,
    bit_clk_override: Option<u64>,
    dfps: DfpsCaps,
    dyn_clk: DynClkCaps,
    dms: DmsMode,
    host: HostConfigCommon,
}

impl ModeManager {
    /// Take the mode list and capabilities from a validated config.
    pub fn new(cfg: &PanelConfig) -> Self {
        Self {
            modes: cfg.modes.clone(),
            current: cfg.default_mode,
            timing_override: None,
            bit_clk_override: None,
            dfps: cfg.dfps.clone(),
            dyn_clk: cfg.dyn_clk.clone(),
            dms: cfg.dms,
            host: cfg.host,
        }
    }

    /// Number of declared modes.
    pub fn count(&self) -> usize {
        self.modes.len()
    }

    /// Mode at `index`, if declared.
    pub fn validate(&self, index: usize) -> Result<&DisplayMode, UnsupportedModeError> {
        self.modes
            .get(index)
            .ok_or(UnsupportedModeError::Index(index))
    }

    /// Current mode index.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Current mode.
    ///
    /// `current` is only ever set from a validated index, so the fallback
    /// to the first mode is unreachable in practice.
    pub fn current(&self) -> Option<&DisplayMode> {
        self.modes.get(self.current).or_else(|| self.modes.first())
    }

    /// Effective timing of the current mode.
    pub fn current_timing(&self) -> ModeTiming {
        self.timing_override
            .or_else(|| self.current().map(|m| m.timing))
            .unwrap_or_default()
    }

    /// Refresh rate capabilities.
    pub fn dfps_caps(&self) -> &DfpsCaps {
        &self.dfps
    }

    /// Check a switch to `to` without changing anything.
    pub fn plan_switch(&self, to: usize) -> Result<SwitchPlan, UnsupportedModeError> {
        let dest = self.validate(to)?;
        let resolution_change = !self.current_timing().same_resolution(&dest.timing);
        if resolution_change && self.dms == DmsMode::Disabled {
            return Err(UnsupportedModeError::ResolutionSwitch);
        }
        Ok(SwitchPlan {
            from: self.current,
            to,
            resolution_change,
        })
    }

    /// Make `to` current, dropping any runtime override.
    pub fn commit(&mut self, to: usize) {
        if to < self.modes.len() {
            self.current = to;
            self.timing_override = None;
            self.bit_clk_override = None;
        }
    }

    /// Decide how to run at `fps`.
    pub fn plan_refresh_rate(&self, fps: u32) -> Result<RefreshPlan, UnsupportedModeError> {
        if !self.dfps.dfps_support || !self.dfps.dfps_list.contains(&fps) {
            return Err(UnsupportedModeError::RefreshRate(fps));
        }
        let timing = self.current_timing();
        if timing.refresh_rate == fps {
            return Ok(RefreshPlan::Unchanged);
        }
        if let Some(index) = self
            .modes
            .iter()
            .position(|m| m.timing.same_resolution(&timing) && m.timing.refresh_rate == fps)
        {
            return Ok(RefreshPlan::SwitchMode(index));
        }
        let adjusted = match self.dfps.dfps_type {
            DfpsType::SuspendResume => return Err(UnsupportedModeError::NeedsModeset),
            DfpsType::ImmediateClock => Some(ModeTiming {
                refresh_rate: fps,
                ..timing
            }),
            DfpsType::ImmediateVfp => stretch_vfp(&timing, fps),
            DfpsType::ImmediateHfp => stretch_hfp(&timing, fps),
        };
        adjusted
            .map(RefreshPlan::Adjust)
            .ok_or(UnsupportedModeError::RefreshRate(fps))
    }

    /// Run the current mode with an adjusted timing.
    pub fn apply_timing(&mut self, timing: ModeTiming) {
        self.timing_override = Some(timing);
    }

    /// Select a bit clock from the declared list.
    pub fn set_bit_clock(&mut self, hz: u64) -> Result<(), UnsupportedModeError> {
        if !self.dyn_clk.support || !self.dyn_clk.bit_clk_list.contains(&hz) {
            return Err(UnsupportedModeError::BitClock(hz));
        }
        self.bit_clk_override = Some(hz);
        Ok(())
    }

    /// Host settings for the current mode.
    pub fn host_config(&self) -> HostConfig {
        let timing = self.current_timing();
        let mode = self.current();
        let bit_clk_hz = self
            .bit_clk_override
            .or_else(|| mode.map(|m| m.bit_clk_hz))
            .unwrap_or(0);
        HostConfig {
            timing,
            op_mode: mode.map(|m| m.op_mode).unwrap_or_default(),
            bit_clk_hz,
            pixel_clock_hz: timing.pixel_clock_hz(),
            num_lanes: self.host.num_lanes,
            bpp: self.host.bpp,
            dsc: mode
                .and_then(|m| m.dsc.as_ref())
                .and_then(|d| dsc_pclk_params(timing.h_active, d)),
        }
    }
}

/// Keep the pixel clock, change the frame length.
fn stretch_vfp(t: &ModeTiming, fps: u32) -> Option<ModeTiming> {
    let per_frame = u64::from(t.h_total()).checked_mul(u64::from(fps))?;
    let v_total = t.pixel_clock_hz().checked_div(per_frame)?;
    let fixed = u64::from(
        t.v_active
            .checked_add(t.v_back_porch)?
            .checked_add(t.v_sync_width)?,
    );
    let vfp = u32::try_from(v_total.checked_sub(fixed)?).ok()?;
    Some(ModeTiming {
        v_front_porch: vfp,
        refresh_rate: fps,
        ..*t
    })
}

/// Keep the pixel clock, change the line length.
fn stretch_hfp(t: &ModeTiming, fps: u32) -> Option<ModeTiming> {
    let per_line = u64::from(t.v_total()).checked_mul(u64::from(fps))?;
    let h_total = t.pixel_clock_hz().checked_div(per_line)?;
    let fixed = u64::from(
        t.h_active
            .checked_add(t.h_back_porch)?
            .checked_add(t.h_sync_width)?,
    );
    let hfp = u32::try_from(h_total.checked_sub(fixed)?).ok()?;
    Some(ModeTiming {
        h_front_porch: hfp,
        refresh_rate: fps,
        ..*t
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use crate::testing::sample_config;
    use proptest::prelude::*;

    #[test]
    fn test_validate_rejects_undeclared_index() {
        let mm = ModeManager::new(&sample_config());
        assert!(mm.validate(1).is_ok());
        assert_eq!(mm.validate(5).unwrap_err(), UnsupportedModeError::Index(5));
    }

    #[test]
    fn test_rate_outside_list_rejected_and_mode_kept() {
        let mm = ModeManager::new(&sample_config());
        let before = mm.current_index();
        assert_eq!(
            mm.plan_refresh_rate(75),
            Err(UnsupportedModeError::RefreshRate(75))
        );
        assert_eq!(mm.current_index(), before);
    }

    #[test]
    fn test_rate_prefers_declared_mode() {
        let mm = ModeManager::new(&sample_config());
        assert_eq!(mm.plan_refresh_rate(90), Ok(RefreshPlan::SwitchMode(1)));
        assert_eq!(mm.plan_refresh_rate(60), Ok(RefreshPlan::Unchanged));
    }

    #[test]
    fn test_vfp_stretch_keeps_pixel_clock() {
        let mm = ModeManager::new(&sample_config());
        let base = mm.current_timing();
        let Ok(RefreshPlan::Adjust(t)) = mm.plan_refresh_rate(120) else {
            panic!("expected an adjusted timing");
        };
        assert_eq!(t.refresh_rate, 120);
        assert_eq!(t.h_total(), base.h_total());
        // 120 Hz from 60 Hz needs half the lines; active lines are kept.
        assert_eq!(t.v_active, base.v_active);
        assert!(t.v_total() < base.v_total());
        assert!(t.pixel_clock_hz() <= base.pixel_clock_hz());
    }

    #[test]
    fn test_vfp_stretch_impossible_when_blanking_too_short() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_list.push(240).unwrap();
        cfg.dfps.max_refresh_rate = 240;
        let mm = ModeManager::new(&cfg);
        assert_eq!(
            mm.plan_refresh_rate(240),
            Err(UnsupportedModeError::RefreshRate(240))
        );
    }

    #[test]
    fn test_hfp_stretch() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_type = DfpsType::ImmediateHfp;
        // Wide lines, short frames: halving the line length is possible.
        cfg.modes[0].timing.h_front_porch = 1136;
        cfg.modes[0].timing.v_front_porch = 18;
        let mm = ModeManager::new(&cfg);
        let base = mm.current_timing();
        let Ok(RefreshPlan::Adjust(t)) = mm.plan_refresh_rate(120) else {
            panic!("expected an adjusted timing");
        };
        assert_eq!(t.v_total(), base.v_total());
        assert_eq!(t.h_total(), base.h_total() / 2);
        assert_eq!(t.h_front_porch, 16);
        assert_eq!(t.pixel_clock_hz(), base.pixel_clock_hz());
    }

    #[test]
    fn test_clock_dfps_keeps_porches() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_type = DfpsType::ImmediateClock;
        let mm = ModeManager::new(&cfg);
        let base = mm.current_timing();
        let Ok(RefreshPlan::Adjust(t)) = mm.plan_refresh_rate(120) else {
            panic!("expected an adjusted timing");
        };
        assert_eq!(t.v_total(), base.v_total());
        assert_eq!(t.pixel_clock_hz(), base.pixel_clock_hz() * 2);
    }

    #[test]
    fn test_applied_timing_reaches_host_config() {
        let mut mm = ModeManager::new(&sample_config());
        let Ok(RefreshPlan::Adjust(t)) = mm.plan_refresh_rate(120) else {
            panic!("expected an adjusted timing");
        };
        mm.apply_timing(t);
        assert_eq!(mm.host_config().timing.refresh_rate, 120);
        assert_eq!(mm.plan_refresh_rate(120), Ok(RefreshPlan::Unchanged));
        mm.commit(1);
        assert_eq!(mm.current_timing().refresh_rate, 90);
    }

    #[test]
    fn test_suspend_resume_needs_modeset() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_type = DfpsType::SuspendResume;
        let mm = ModeManager::new(&cfg);
        assert_eq!(
            mm.plan_refresh_rate(120),
            Err(UnsupportedModeError::NeedsModeset)
        );
    }

    #[test]
    fn test_dfps_unsupported() {
        let mut cfg = sample_config();
        cfg.dfps.dfps_support = false;
        let mm = ModeManager::new(&cfg);
        assert_eq!(
            mm.plan_refresh_rate(90),
            Err(UnsupportedModeError::RefreshRate(90))
        );
    }

    #[test]
    fn test_bit_clock_from_list_only() {
        let mut mm = ModeManager::new(&sample_config());
        assert_eq!(
            mm.set_bit_clock(123),
            Err(UnsupportedModeError::BitClock(123))
        );
        mm.set_bit_clock(1_200_000_000).unwrap();
        assert_eq!(mm.host_config().bit_clk_hz, 1_200_000_000);
        mm.commit(0);
        assert_eq!(mm.host_config().bit_clk_hz, 1_100_000_000);
    }

    #[test]
    fn test_resolution_switch_needs_dms() {
        let mut cfg = sample_config();
        let mut fhd = cfg.modes[0].clone();
        fhd.timing.h_active = 720;
        fhd.timing.v_active = 1600;
        cfg.modes.push(fhd).unwrap();
        let mm = ModeManager::new(&cfg);
        assert_eq!(
            mm.plan_switch(2),
            Err(UnsupportedModeError::ResolutionSwitch)
        );
        cfg.dms = DmsMode::ResSwitchImmediate;
        let mm = ModeManager::new(&cfg);
        assert!(mm.plan_switch(2).unwrap().resolution_change);
    }

    #[test]
    fn test_dsc_params_reference_values() {
        let dsc = DscConfig {
            slice_width: 540,
            slice_height: 40,
            slice_per_pkt: 2,
            bpp: 8,
            bpc: 8,
        };
        let p = dsc_pclk_params(1080, &dsc).unwrap();
        assert_eq!(p.slice_per_intf, 2);
        assert_eq!(p.slice_per_pkt, 2);
        assert_eq!(p.bytes_in_slice, 540);
        assert_eq!(p.total_bytes_per_intf, 1080);
        assert_eq!(p.eol_byte_num, 0);
        assert_eq!(p.pclk_per_line, 360);
        assert_eq!(p.bytes_per_pkt, 1080);
        assert_eq!(p.pkt_per_line, 1);
    }

    #[test]
    fn test_dsc_slice_per_pkt_falls_back_to_one() {
        let dsc = DscConfig {
            slice_width: 1080,
            slice_height: 20,
            slice_per_pkt: 2,
            bpp: 10,
            bpc: 10,
        };
        let p = dsc_pclk_params(1080, &dsc).unwrap();
        assert_eq!(p.slice_per_intf, 1);
        assert_eq!(p.slice_per_pkt, 1);
        assert_eq!(p.bytes_in_slice, 1350);
        assert_eq!(p.eol_byte_num, 0);
        assert_eq!(p.pclk_per_line, 450);
    }

    #[test]
    fn test_dsc_invalid_input() {
        let mut dsc = DscConfig {
            slice_width: 0,
            slice_height: 20,
            slice_per_pkt: 1,
            bpp: 8,
            bpc: 8,
        };
        assert!(dsc_pclk_params(1080, &dsc).is_none());
        dsc.slice_width = 2000;
        assert!(dsc_pclk_params(1080, &dsc).is_none());
    }

    proptest! {
        #[test]
        fn prop_dsc_relations(slice_width in 1u32..2048, slices in 1u32..8, per_pkt in 1u32..4, bpp in 6u32..16) {
            let dsc = DscConfig { slice_width, slice_height: 8, slice_per_pkt: per_pkt, bpp, bpc: 8 };
            let p = dsc_pclk_params(slice_width * slices, &dsc).unwrap();
            prop_assert_eq!(p.slice_per_intf, slices);
            prop_assert!(p.slice_per_pkt <= p.slice_per_intf);
            prop_assert!(p.eol_byte_num < 3);
            prop_assert_eq!(p.pclk_per_line * 3 - (if p.eol_byte_num == 0 { 0 } else { 3 - p.eol_byte_num }), p.total_bytes_per_intf);
            prop_assert_eq!(p.bytes_per_pkt, p.bytes_in_slice * p.slice_per_pkt);
        }
    }
}
