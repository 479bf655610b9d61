//! Panel lifecycle
//!
//! [`Panel`] owns every collaborator and all mutable panel state behind one
//! async mutex. Each exposed operation takes the lock for its whole
//! duration, so two transitions, or a transition and a brightness update,
//! never interleave. Reset delays and command waits happen with the lock
//! held.
//!
//! Each operation checks [`Transition::check`] first and only then touches
//! hardware. A hardware failure returns the error and leaves the state at
//! the last one fully reached.
//!
//! Workers that run next to the lifecycle are plain async methods the
//! integrator spawns or joins:
//!
//! | Worker | Wakes on |
//! |---|---|
//! | [`Panel::run_deferred_dimming`] | panel-on dimming delay elapsed |
//! | [`Panel::run_recovery`] | ESD recovery requested |
//! | [`Panel::run_esd_monitor`] | ESD polling period |
//! | [`Panel::run_esd_irq`] | ESD error line edge |

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use embedded_hal_async::delay::DelayNs;
use platform::{
    BacklightDevice, CommandChannel, CommandSet, CommandSetKind, GpioBank, PinctrlState,
    PowerRails, TransportError,
};

use crate::backlight::{BacklightController, BacklightOutput};
use crate::config::{
    BacklightConfig, BacklightTransport, DfpsCaps, DisplayMode, DsiPanelConfig, Name, PanelConfig,
    PanelKind, PhyProps,
};
use crate::deferred::DeferredDimming;
use crate::error::{ConfigError, PanelError, ResetError, UnsupportedModeError};
use crate::mode::{HostConfig, ModeManager, RefreshPlan};
use crate::sequencer;
use crate::state::{PanelState, Step, Transition};
use crate::telemetry::{PanelCounters, Telemetry};

/// DCS "write display brightness".
const DCS_SET_DISPLAY_BRIGHTNESS: u8 = 0x51;

/// Collaborators handed to [`Panel::new`].
#[derive(Debug)]
pub struct PanelHardware<CH, PW, GP, BL, D> {
    /// Command channel.
    pub channel: CH,
    /// Regulator rails.
    pub power: PW,
    /// Control lines and pin-control.
    pub gpio: GP,
    /// PWM / WLED output (unused by DCS backlights).
    pub backlight: BL,
    /// Delay source for sequencing waits.
    pub delay: D,
}

/// Doze brightness band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DozeLevel {
    Low,
    High,
}

impl DozeLevel {
    const fn set_kind(self) -> CommandSetKind {
        match self {
            Self::Low => CommandSetKind::DozeLbm,
            Self::High => CommandSetKind::DozeHbm,
        }
    }
}

/// Mutable panel state, only reachable through the lock.
pub(crate) struct PanelInner<CH, PW, GP, BL, D> {
    pub(crate) name: Name,
    pub(crate) state: PanelState,
    /// State to return to when leaving doze.
    resume_state: PanelState,
    pub(crate) hw: PanelHardware<CH, PW, GP, BL, D>,
    /// `None` for a bridge.
    pub(crate) dsi: Option<DsiPanelConfig>,
    backlight: BacklightController,
    modes: ModeManager,
    telemetry: Telemetry,
    doze: Option<DozeLevel>,
    phy: PhyProps,
}

/// One DSI panel (or bridge) and everything it owns.
pub struct Panel<M: RawMutex, CH, PW, GP, BL, D> {
    pub(crate) inner: Mutex<M, PanelInner<CH, PW, GP, BL, D>>,
    /// Single-slot ESD recovery request.
    pub(crate) esd_pending: AtomicBool,
    pub(crate) recovery: Signal<M, ()>,
    pub(crate) esd_interval_ms: Option<u32>,
    pub(crate) dimming: DeferredDimming<M>,
}

/// Send `kind`, preferring `mode`'s own set. A set that is not configured
/// or has no commands is skipped.
async fn send_from<CH: CommandChannel>(
    channel: &mut CH,
    dsi: Option<&DsiPanelConfig>,
    kind: CommandSetKind,
    mode: Option<&DisplayMode>,
) -> Result<(), TransportError> {
    let Some(set) = dsi.and_then(|d| d.command_set(kind, mode)) else {
        trace!("{} not configured", kind.name());
        return Ok(());
    };
    if set.is_empty() {
        return Ok(());
    }
    channel.send(set).await.map_err(|e| {
        warn!("{} failed", kind.name());
        e
    })
}

/// DCS brightness command, big-endian unless the panel wants it swapped.
fn brightness_set(level: u32, byte_swap: bool) -> Option<CommandSet> {
    let raw = u16::try_from(level).unwrap_or(u16::MAX);
    let [a, b] = if byte_swap {
        raw.to_le_bytes()
    } else {
        raw.to_be_bytes()
    };
    CommandSet::new(CommandSetKind::Brightness).with_command(&[DCS_SET_DISPLAY_BRIGHTNESS, a, b], 0)
}

impl<CH, PW, GP, BL, D> PanelInner<CH, PW, GP, BL, D>
where
    CH: CommandChannel,
    PW: PowerRails,
    GP: GpioBank,
    BL: BacklightDevice,
    D: DelayNs,
{
    /// Check `t` against the current state. `None` means already there.
    fn begin(&self, t: Transition) -> Result<Option<PanelState>, PanelError> {
        match t.check(self.state) {
            Ok(Step::Run(to)) => {
                debug!("{}: {}", t.name(), self.state.name());
                Ok(Some(to))
            }
            Ok(Step::Noop) => Ok(None),
            Err(e) => {
                warn!("{} refused in {}", t.name(), self.state.name());
                Err(e.into())
            }
        }
    }

    fn finish(&mut self, t: Transition, to: PanelState) {
        self.state = to;
        debug!("{} done: {}", t.name(), to.name());
    }

    pub(crate) async fn send_set(&mut self, kind: CommandSetKind) -> Result<(), TransportError> {
        send_from(
            &mut self.hw.channel,
            self.dsi.as_ref(),
            kind,
            self.modes.current(),
        )
        .await
    }

    // ── Power up ──────────────────────────────────────────────────────────

    pub(crate) async fn pre_prepare(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::PrePrepare)? else {
            return Ok(());
        };
        if let Some(dsi) = &self.dsi {
            sequencer::pre_power_on(&mut self.hw.gpio, &dsi.pre_power)?;
        }
        self.finish(Transition::PrePrepare, to);
        Ok(())
    }

    pub(crate) async fn prepare(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::Prepare)? else {
            return Ok(());
        };
        if let Some(dsi) = &self.dsi {
            let hw = &mut self.hw;
            hw.gpio
                .select_pinctrl(PinctrlState::Active)
                .map_err(ResetError::Line)?;
            sequencer::power_on_rails(&mut hw.power, &mut hw.delay, &dsi.power).await?;

            let mode = self.modes.current();
            let rest: Result<(), PanelError> = async {
                sequencer::run_reset_sequence(&mut hw.gpio, &mut hw.delay, &dsi.reset).await?;
                if dsi.features.lp11_init {
                    send_from(
                        &mut hw.channel,
                        Some(dsi),
                        CommandSetKind::Lp11Init,
                        mode,
                    )
                    .await?;
                }
                sequencer::set_mode_select(&mut hw.gpio, &dsi.reset)?;
                Ok(())
            }
            .await;

            if let Err(e) = rest {
                error!("prepare failed, powering down");
                if sequencer::release_lines(&mut hw.gpio, &dsi.reset).is_err() {
                    error!("control lines not released after failed prepare");
                }
                if let Err(off) =
                    sequencer::power_off_rails(&mut hw.power, &mut hw.delay, &dsi.power).await
                {
                    error!("rail {} still on after failed prepare", off.rail().index());
                }
                return Err(e);
            }
        }
        self.finish(Transition::Prepare, to);
        Ok(())
    }

    pub(crate) async fn enable(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::Enable)? else {
            debug!("enable: already on");
            return Ok(());
        };
        self.send_set(CommandSetKind::On).await?;
        self.doze = None;
        self.finish(Transition::Enable, to);
        let now = Instant::now();
        self.telemetry.mark_active(now);
        self.restore_backlight(now).await
    }

    pub(crate) async fn post_enable(&mut self) -> Result<Option<u32>, PanelError> {
        let Some(to) = self.begin(Transition::PostEnable)? else {
            return Ok(None);
        };
        self.send_set(CommandSetKind::PostOn).await?;
        let features = self.dsi.as_ref().map(|d| d.features).unwrap_or_default();
        if let Some(elvss) = features.elvss_dimming {
            self.write_elvss_offset(elvss.valid_bits).await?;
        }
        if features.crc_p3_gamut {
            self.send_set(CommandSetKind::CrcP3Gamut).await?;
        }
        self.finish(Transition::PostEnable, to);
        let delay = features.panel_on_dimming_delay_ms;
        Ok((delay > 0 && self.dsi.is_some()).then_some(delay))
    }

    /// Read the ELVSS register, keep the valid bits and patch them into the
    /// last byte of the offset command.
    async fn write_elvss_offset(&mut self, valid_bits: u8) -> Result<(), PanelError> {
        let Some(dsi) = &self.dsi else {
            return Ok(());
        };
        let mode = self.modes.current();
        let (Some(read), Some(offset)) = (
            dsi.command_set(CommandSetKind::ElvssDimmingRead, mode),
            dsi.command_set(CommandSetKind::ElvssDimmingOffset, mode),
        ) else {
            warn!("elvss dimming enabled without command sets");
            return Ok(());
        };
        let reply = self.hw.channel.send_and_read(read, 1).await?;
        let value = reply.first().copied().unwrap_or(0) & valid_bits;
        let mut patched = offset.clone();
        if let Some(last) = patched
            .commands
            .first_mut()
            .and_then(|c| c.payload.last_mut())
        {
            *last = value;
        }
        self.hw.channel.send(&patched).await?;
        Ok(())
    }

    // ── Doze ──────────────────────────────────────────────────────────────

    pub(crate) async fn set_low_power(&mut self, t: Transition) -> Result<(), PanelError> {
        let Some(to) = self.begin(t)? else {
            return Ok(());
        };
        let kind = if to == PanelState::LowPower1 {
            CommandSetKind::Lp1
        } else {
            CommandSetKind::Lp2
        };
        self.send_set(kind).await?;
        if !self.state.is_low_power() {
            self.resume_state = self.state;
        }
        if self.backlight.fod_active() {
            self.fod_off().await?;
        }
        self.doze = None;
        self.update_doze().await?;
        self.finish(t, to);
        Ok(())
    }

    pub(crate) async fn set_nolp(&mut self) -> Result<(), PanelError> {
        if self.begin(Transition::SetNolp)?.is_none() {
            return Ok(());
        }
        self.send_set(CommandSetKind::Nolp).await?;
        self.doze = None;
        let to = self.resume_state;
        self.finish(Transition::SetNolp, to);
        if to.drives_backlight() {
            self.restore_backlight(Instant::now()).await?;
        }
        Ok(())
    }

    /// Send the doze brightness set matching the last level, if it changed.
    async fn update_doze(&mut self) -> Result<(), PanelError> {
        let Some(dsi) = &self.dsi else {
            return Ok(());
        };
        if self.backlight.fod_active() {
            trace!("doze brightness held while fod hbm is on");
            return Ok(());
        }
        let threshold = dsi.features.doze_backlight_threshold;
        let cfg = self.backlight.config();
        let (target, raw) = if self.backlight.last_level() <= threshold {
            (DozeLevel::Low, cfg.bl_doze_lbm)
        } else {
            (DozeLevel::High, cfg.bl_doze_hbm)
        };
        if self.doze == Some(target) {
            return Ok(());
        }
        self.send_set(target.set_kind()).await?;
        self.doze = Some(target);
        self.telemetry.record_level(raw, Instant::now());
        Ok(())
    }

    // ── Power down ────────────────────────────────────────────────────────

    pub(crate) async fn pre_disable(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::PreDisable)? else {
            return Ok(());
        };
        self.send_set(CommandSetKind::PreOff).await?;
        self.finish(Transition::PreDisable, to);
        Ok(())
    }

    /// `esd_pending` suppresses the OFF set; a panel being recovered
    /// cannot answer it.
    pub(crate) async fn disable(&mut self, esd_pending: bool) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::Disable)? else {
            return Ok(());
        };
        if esd_pending {
            info!("off set skipped, recovery pending");
        } else {
            self.send_set(CommandSetKind::Off).await?;
        }
        if self.backlight.fod_active() {
            self.backlight.set_fod_active(false);
            self.telemetry.record_hbm(false, Instant::now());
        }
        self.doze = None;
        self.telemetry.mark_inactive(Instant::now());
        self.finish(Transition::Disable, to);
        Ok(())
    }

    pub(crate) async fn unprepare(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::Unprepare)? else {
            return Ok(());
        };
        if let Some(dsi) = &self.dsi {
            let hw = &mut self.hw;
            let lines = sequencer::release_lines(&mut hw.gpio, &dsi.reset);
            if let Err(e) = sequencer::power_off_rails(&mut hw.power, &mut hw.delay, &dsi.power).await
            {
                error!("rail {} still on", e.rail().index());
                return Err(e.into());
            }
            if lines.is_err() {
                warn!("control lines not released");
            }
        }
        self.finish(Transition::Unprepare, to);
        Ok(())
    }

    pub(crate) async fn post_unprepare(&mut self) -> Result<(), PanelError> {
        let Some(to) = self.begin(Transition::PostUnprepare)? else {
            return Ok(());
        };
        if let Some(dsi) = &self.dsi {
            sequencer::pre_power_off(&mut self.hw.gpio, &dsi.pre_power)?;
        }
        self.finish(Transition::PostUnprepare, to);
        Ok(())
    }

    // ── Modes ─────────────────────────────────────────────────────────────

    pub(crate) async fn switch(&mut self, to_mode: usize) -> Result<(), PanelError> {
        let Some(state) = self.begin(Transition::Switch)? else {
            return Ok(());
        };
        let plan = self.modes.plan_switch(to_mode)?;
        self.send_switch(plan.to).await?;
        self.modes.commit(plan.to);
        debug!("mode {} -> {}", plan.from, plan.to);
        self.finish(Transition::Switch, state);
        Ok(())
    }

    /// Send the destination mode's timing switch set.
    async fn send_switch(&mut self, to_mode: usize) -> Result<(), PanelError> {
        let dest = self.modes.validate(to_mode)?;
        send_from(
            &mut self.hw.channel,
            self.dsi.as_ref(),
            CommandSetKind::TimingSwitch,
            Some(dest),
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn post_switch(&mut self) -> Result<(), PanelError> {
        let Some(state) = self.begin(Transition::PostSwitch)? else {
            return Ok(());
        };
        self.send_set(CommandSetKind::PostTimingSwitch).await?;
        self.finish(Transition::PostSwitch, state);
        Ok(())
    }

    pub(crate) async fn request_refresh_rate(&mut self, fps: u32) -> Result<RefreshPlan, PanelError> {
        let plan = self.modes.plan_refresh_rate(fps)?;
        match plan {
            RefreshPlan::Unchanged => {}
            RefreshPlan::SwitchMode(index) => {
                if self.state.is_powered() {
                    self.send_switch(index).await?;
                }
                self.modes.commit(index);
            }
            RefreshPlan::Adjust(timing) => self.modes.apply_timing(timing),
        }
        debug!("refresh rate {} Hz", fps);
        Ok(plan)
    }

    // ── Backlight ─────────────────────────────────────────────────────────

    /// Write a level to hardware through the configured transport.
    async fn write_level(&mut self, level: u32) -> Result<(), PanelError> {
        let Some(dsi) = &self.dsi else {
            return Ok(());
        };
        match dsi.backlight.transport {
            BacklightTransport::Dcs { byte_swap } => {
                if let Some(set) = brightness_set(level, byte_swap) {
                    self.hw.channel.send(&set).await?;
                }
            }
            BacklightTransport::Pwm { .. } | BacklightTransport::Wled => {
                self.hw
                    .backlight
                    .set_level(level, dsi.backlight.bl_max_level)
                    .await?;
            }
            BacklightTransport::Unknown => {}
        }
        Ok(())
    }

    pub(crate) async fn set_backlight(
        &mut self,
        brightness: u32,
    ) -> Result<BacklightOutput, PanelError> {
        let (level, alpha) = self.backlight.update(brightness);
        let mut out = BacklightOutput {
            level,
            alpha,
            applied: false,
        };
        if self.dsi.is_none() {
            return Ok(out);
        }
        if self.state.drives_backlight() {
            // Counters follow the intended level even if the write fails.
            self.telemetry.record_level(level, Instant::now());
            self.write_level(level).await?;
            out.applied = true;
        } else if self.state.is_low_power() {
            self.update_doze().await?;
        }
        trace!("backlight {} -> {}", brightness, level);
        Ok(out)
    }

    /// Re-apply the last requested brightness after the panel came back on.
    async fn restore_backlight(&mut self, now: Instant) -> Result<(), PanelError> {
        let brightness = self.backlight.last_brightness();
        if brightness == 0 || self.dsi.is_none() {
            return Ok(());
        }
        let (level, _) = self.backlight.update(brightness);
        self.telemetry.record_level(level, now);
        self.write_level(level).await.map_err(|e| {
            warn!("backlight restore failed");
            e
        })
    }

    /// Drop the FOD overlay without touching the backlight.
    async fn fod_off(&mut self) -> Result<(), PanelError> {
        self.send_set(CommandSetKind::HbmFodOff).await?;
        self.backlight.set_fod_active(false);
        self.telemetry.record_hbm(false, Instant::now());
        Ok(())
    }

    pub(crate) async fn set_fod_hbm(&mut self, on: bool) -> Result<(), PanelError> {
        // Doze entry already drops the overlay, so off is a no-op there.
        let allowed = self.state.is_enabled() || (!on && self.state.is_low_power());
        if !allowed {
            return Err(crate::error::SequenceError {
                op: "set_fod_hbm",
                state: self.state,
            }
            .into());
        }
        if self.backlight.fod_active() == on || self.dsi.is_none() {
            return Ok(());
        }
        if on {
            self.send_set(CommandSetKind::HbmFodOn).await?;
            self.backlight.set_fod_active(true);
            self.telemetry.record_hbm(true, Instant::now());
            return Ok(());
        }
        self.fod_off().await?;
        let wait = self
            .dsi
            .as_ref()
            .map_or(0, |d| d.features.fod_off_dimming_delay_ms);
        if wait > 0 {
            self.hw.delay.delay_ms(wait).await;
        }
        self.restore_backlight(Instant::now()).await
    }

    // ── Recovery ──────────────────────────────────────────────────────────

    /// Full power cycle from an on or dozing state, with the OFF set skipped.
    /// Pre-power lines stay up, so the cycle re-enters at `PrePrepared`.
    pub(crate) async fn power_cycle(&mut self) -> Result<(), PanelError> {
        self.disable(true).await?;
        self.unprepare().await?;
        self.state = PanelState::PrePrepared;
        self.prepare().await?;
        self.enable().await
    }
}

impl<M, CH, PW, GP, BL, D> Panel<M, CH, PW, GP, BL, D>
where
    M: RawMutex,
    CH: CommandChannel,
    PW: PowerRails,
    GP: GpioBank,
    BL: BacklightDevice,
    D: DelayNs,
{
    /// Validate `config` and take ownership of the collaborators.
    ///
    /// The panel starts in [`PanelState::Off`] on the configured default mode.
    pub fn new(
        config: PanelConfig,
        hw: PanelHardware<CH, PW, GP, BL, D>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let modes = ModeManager::new(&config);
        let (dsi, bl_cfg, delta) = match config.kind {
            PanelKind::Dsi(dsi) => {
                let bl = dsi.backlight.clone();
                let delta = dsi.features.backlight_delta;
                (Some(dsi), bl, delta)
            }
            PanelKind::ExtBridge => (None, BacklightConfig::default(), 0),
        };
        let esd_interval_ms = dsi
            .as_ref()
            .and_then(|d| d.esd.as_ref())
            .map(|e| e.check_interval_ms);
        info!("panel {} configured", config.name.as_str());
        Ok(Self {
            inner: Mutex::new(PanelInner {
                name: config.name,
                state: PanelState::Off,
                resume_state: PanelState::Enabled,
                hw,
                dsi,
                backlight: BacklightController::new(bl_cfg, delta),
                modes,
                telemetry: Telemetry::new(),
                doze: None,
                phy: config.phy,
            }),
            esd_pending: AtomicBool::new(false),
            recovery: Signal::new(),
            esd_interval_ms,
            dimming: DeferredDimming::new(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// `Off → PrePrepared`: raise the pre-power lines.
    pub async fn pre_prepare(&self) -> Result<(), PanelError> {
        self.inner.lock().await.pre_prepare().await
    }

    /// `PrePrepared → Prepared`: rails, reset, LP11 init, mode select.
    ///
    /// Any failure after the rails are up powers them down again.
    pub async fn prepare(&self) -> Result<(), PanelError> {
        self.inner.lock().await.prepare().await
    }

    /// `Prepared | LowPower1 | LowPower2 → Enabled`. No-op when already on.
    pub async fn enable(&self) -> Result<(), PanelError> {
        self.inner.lock().await.enable().await
    }

    /// `Enabled → PostEnabled`: post-on tuning, then schedule dimming.
    pub async fn post_enable(&self) -> Result<(), PanelError> {
        let delay = self.inner.lock().await.post_enable().await?;
        if let Some(ms) = delay {
            self.dimming.schedule(ms);
        }
        Ok(())
    }

    /// Enter doze.
    pub async fn set_lp1(&self) -> Result<(), PanelError> {
        self.inner.lock().await.set_low_power(Transition::SetLp1).await
    }

    /// Enter doze-suspend.
    pub async fn set_lp2(&self) -> Result<(), PanelError> {
        self.inner.lock().await.set_low_power(Transition::SetLp2).await
    }

    /// Leave doze for the state the panel dozed from.
    pub async fn set_nolp(&self) -> Result<(), PanelError> {
        self.inner.lock().await.set_nolp().await
    }

    /// Send the pre-off set. Cancels pending dimming.
    pub async fn pre_disable(&self) -> Result<(), PanelError> {
        let mut inner = self.inner.lock().await;
        self.dimming.cancel_pending();
        inner.pre_disable().await
    }

    /// Display off. Cancels pending dimming.
    pub async fn disable(&self) -> Result<(), PanelError> {
        let mut inner = self.inner.lock().await;
        self.dimming.cancel_pending();
        inner.disable(self.esd_pending.load(Ordering::Acquire)).await
    }

    /// Rails off, control lines low.
    ///
    /// A rail that refuses to switch off is fatal: the error is returned and
    /// the state does not advance.
    pub async fn unprepare(&self) -> Result<(), PanelError> {
        self.inner.lock().await.unprepare().await
    }

    /// `Unprepared → Off`: drop the pre-power lines.
    pub async fn post_unprepare(&self) -> Result<(), PanelError> {
        self.inner.lock().await.post_unprepare().await
    }

    /// Switch to declared mode `index` without a power cycle.
    pub async fn switch(&self, index: usize) -> Result<(), PanelError> {
        self.inner.lock().await.switch(index).await
    }

    /// Send the post-switch set for the current mode.
    pub async fn post_switch(&self) -> Result<(), PanelError> {
        self.inner.lock().await.post_switch().await
    }

    /// Run at `fps`, if it is in the declared refresh rate list.
    pub async fn request_refresh_rate(&self, fps: u32) -> Result<RefreshPlan, PanelError> {
        self.inner.lock().await.request_refresh_rate(fps).await
    }

    /// Select a bit clock from the declared list.
    pub async fn set_bit_clock(&self, hz: u64) -> Result<(), PanelError> {
        self.inner.lock().await.modes.set_bit_clock(hz)?;
        Ok(())
    }

    // ── Backlight ─────────────────────────────────────────────────────────

    /// Request a logical brightness.
    ///
    /// The level is written only while the panel is prepared or on; while
    /// dozing the doze band is re-evaluated, otherwise the request is kept
    /// and applied by the next `enable`.
    pub async fn set_backlight(&self, brightness: u32) -> Result<BacklightOutput, PanelError> {
        self.inner.lock().await.set_backlight(brightness).await
    }

    /// Change the scale factors and re-apply the last brightness.
    pub async fn set_bl_scale(
        &self,
        bl_scale: u32,
        bl_scale_ad: u32,
    ) -> Result<BacklightOutput, PanelError> {
        let mut inner = self.inner.lock().await;
        inner.backlight.set_scale(bl_scale, bl_scale_ad);
        let last = inner.backlight.last_brightness();
        inner.set_backlight(last).await
    }

    /// Turn DC dimming on or off and re-apply the last brightness.
    pub async fn set_dc_dimming(&self, on: bool) -> Result<BacklightOutput, PanelError> {
        let mut inner = self.inner.lock().await;
        if on && inner.backlight.config().dc_threshold == 0 {
            return Err(UnsupportedModeError::DcDimming.into());
        }
        inner.backlight.set_dc_enable(on);
        let last = inner.backlight.last_brightness();
        inner.set_backlight(last).await
    }

    /// Switch the fingerprint overlay on or off. The panel must be on.
    pub async fn set_fod_hbm(&self, on: bool) -> Result<(), PanelError> {
        self.inner.lock().await.set_fod_hbm(on).await
    }

    /// Fingerprint-table alpha for the current level.
    pub async fn fod_dim_alpha(&self) -> u32 {
        let inner = self.inner.lock().await;
        inner.backlight.fod_alpha(inner.backlight.last_level())
    }

    /// Count one frame kickoff.
    pub async fn record_kickoff(&self) {
        self.inner.lock().await.telemetry.record_kickoff();
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    /// Panel name.
    pub async fn name(&self) -> Name {
        self.inner.lock().await.name.clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> PanelState {
        self.inner.lock().await.state
    }

    /// Current mode and its index.
    pub async fn current_mode(&self) -> Option<(usize, DisplayMode)> {
        let inner = self.inner.lock().await;
        let index = inner.modes.current_index();
        inner.modes.current().cloned().map(|m| (index, m))
    }

    /// Number of declared modes.
    pub async fn mode_count(&self) -> usize {
        self.inner.lock().await.modes.count()
    }

    /// Check that mode `index` is declared.
    pub async fn validate_mode(&self, index: usize) -> Result<(), UnsupportedModeError> {
        self.inner.lock().await.modes.validate(index).map(|_| ())
    }

    /// Host settings for the current mode.
    pub async fn host_config(&self) -> HostConfig {
        self.inner.lock().await.modes.host_config()
    }

    /// Physical properties.
    pub async fn phy_props(&self) -> PhyProps {
        self.inner.lock().await.phy
    }

    /// Refresh rate capabilities.
    pub async fn dfps_caps(&self) -> DfpsCaps {
        self.inner.lock().await.modes.dfps_caps().clone()
    }

    /// Aging counters up to now.
    pub async fn telemetry(&self) -> PanelCounters {
        self.inner.lock().await.telemetry.snapshot(Instant::now())
    }

    // ── Workers ───────────────────────────────────────────────────────────

    /// Send `DimmingOn` each time a scheduled panel-on delay elapses.
    ///
    /// Never returns; join or spawn it next to the lifecycle owner.
    pub async fn run_deferred_dimming(&self) {
        loop {
            self.dimming.next_due().await;
            let mut inner = self.inner.lock().await;
            if inner.state != PanelState::PostEnabled {
                continue;
            }
            if inner.send_set(CommandSetKind::DimmingOn).await.is_ok() {
                debug!("panel-on dimming applied");
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use crate::config::ElvssDimming;
    use crate::error::SequenceError;
    use crate::testing::{sample_config, set};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use platform::mocks::{
        HwEvent, MockBacklight, MockChannel, MockDelay, MockGpio, MockHardware, MockPower,
    };
    use platform::GpioLine;

    type TestPanel = Panel<NoopRawMutex, MockChannel, MockPower, MockGpio, MockBacklight, MockDelay>;

    fn hardware(hw: &MockHardware) -> PanelHardware<MockChannel, MockPower, MockGpio, MockBacklight, MockDelay> {
        PanelHardware {
            channel: hw.channel.clone(),
            power: hw.power.clone(),
            gpio: hw.gpio.clone(),
            backlight: hw.backlight.clone(),
            delay: hw.delay.clone(),
        }
    }

    fn panel_with(cfg: PanelConfig) -> (TestPanel, MockHardware) {
        let hw = MockHardware::new();
        (Panel::new(cfg, hardware(&hw)).unwrap(), hw)
    }

    async fn powered(cfg: PanelConfig) -> (TestPanel, MockHardware) {
        let (panel, hw) = panel_with(cfg);
        panel.pre_prepare().await.unwrap();
        panel.prepare().await.unwrap();
        panel.enable().await.unwrap();
        hw.log.clear();
        (panel, hw)
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut cfg = sample_config();
        cfg.modes.clear();
        let hw = MockHardware::new();
        assert!(TestPanel::new(cfg, hardware(&hw)).is_err());
    }

    #[tokio::test]
    async fn test_refused_transition_touches_nothing() {
        let (panel, hw) = panel_with(sample_config());
        let err = panel.enable().await.unwrap_err();
        assert_eq!(
            err,
            PanelError::Sequence(SequenceError {
                op: "enable",
                state: PanelState::Off
            })
        );
        assert!(hw.log.events().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_order() {
        let (panel, hw) = panel_with(sample_config());
        panel.pre_prepare().await.unwrap();
        panel.prepare().await.unwrap();
        let events = hw.log.without_delays();
        let expected_prefix = [
            HwEvent::Gpio(GpioLine::PrePower(0), true),
            HwEvent::Gpio(GpioLine::PrePower(1), true),
            HwEvent::Pinctrl(PinctrlState::Active),
            HwEvent::RailOn(platform::RailId(0)),
            HwEvent::RailOn(platform::RailId(1)),
            HwEvent::RailOn(platform::RailId(2)),
            HwEvent::Gpio(GpioLine::DisplayEnable, true),
            HwEvent::Gpio(GpioLine::Reset, true),
            HwEvent::Gpio(GpioLine::Reset, false),
            HwEvent::Gpio(GpioLine::Reset, true),
            HwEvent::Send(CommandSetKind::Lp11Init),
            HwEvent::Gpio(GpioLine::ModeSelect, true),
        ];
        assert_eq!(events, expected_prefix);
        assert_eq!(panel.state().await, PanelState::Prepared);
    }

    #[tokio::test]
    async fn test_enable_twice_is_noop() {
        let (panel, hw) = powered(sample_config()).await;
        panel.enable().await.unwrap();
        assert!(hw.log.events().is_empty());
        assert_eq!(panel.state().await, PanelState::Enabled);
    }

    #[tokio::test]
    async fn test_enable_restores_brightness() {
        let (panel, hw) = panel_with(sample_config());
        panel.pre_prepare().await.unwrap();
        let out = panel.set_backlight(255).await.unwrap();
        assert!(!out.applied);
        panel.prepare().await.unwrap();
        hw.log.clear();
        panel.enable().await.unwrap();
        assert_eq!(
            hw.log.sent_sets(),
            [CommandSetKind::On, CommandSetKind::Brightness]
        );
        let payloads = hw.channel.payloads();
        assert_eq!(payloads.last().unwrap().1, [0x51, 0x07, 0xff]);
    }

    #[tokio::test]
    async fn test_dcs_byte_swap() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.transport = BacklightTransport::Dcs { byte_swap: true };
        }
        let (panel, hw) = powered(cfg).await;
        let out = panel.set_backlight(255).await.unwrap();
        assert!(out.applied);
        assert_eq!(out.level, 2047);
        assert_eq!(hw.channel.payloads().last().unwrap().1, [0x51, 0xff, 0x07]);
    }

    #[tokio::test]
    async fn test_pwm_backlight_goes_to_device() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.transport = BacklightTransport::Pwm { period_us: 100 };
        }
        let (panel, hw) = powered(cfg).await;
        panel.set_backlight(255).await.unwrap();
        assert_eq!(hw.backlight.level(), Some(2047));
        assert!(hw.log.sent_sets().is_empty());
    }

    #[tokio::test]
    async fn test_doze_band_follows_threshold() {
        let (panel, hw) = powered(sample_config()).await;
        // level 8 is at or below the threshold of 100
        panel.set_backlight(1).await.unwrap();
        hw.log.clear();
        panel.set_lp1().await.unwrap();
        assert_eq!(
            hw.log.sent_sets(),
            [CommandSetKind::Lp1, CommandSetKind::DozeLbm]
        );
        hw.log.clear();
        let out = panel.set_backlight(200).await.unwrap();
        assert!(!out.applied);
        assert_eq!(hw.log.sent_sets(), [CommandSetKind::DozeHbm]);
        hw.log.clear();
        panel.set_backlight(210).await.unwrap();
        assert!(hw.log.sent_sets().is_empty());
    }

    #[tokio::test]
    async fn test_nolp_returns_to_dozed_from_state() {
        let (panel, hw) = powered(sample_config()).await;
        panel.set_backlight(100).await.unwrap();
        panel.set_lp2().await.unwrap();
        panel.set_lp1().await.unwrap();
        hw.log.clear();
        panel.set_nolp().await.unwrap();
        assert_eq!(panel.state().await, PanelState::Enabled);
        assert_eq!(
            hw.log.sent_sets(),
            [CommandSetKind::Nolp, CommandSetKind::Brightness]
        );
    }

    #[tokio::test]
    async fn test_post_enable_elvss_patch() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.features.elvss_dimming = Some(ElvssDimming { valid_bits: 0x1f });
            dsi.features.crc_p3_gamut = true;
            for s in [
                set(CommandSetKind::ElvssDimmingRead, &[0xd5]),
                CommandSet::new(CommandSetKind::ElvssDimmingOffset)
                    .with_command(&[0xb7, 0x00, 0x00], 0)
                    .unwrap(),
                set(CommandSetKind::CrcP3Gamut, &[0x81, 0x90]),
            ] {
                dsi.command_sets.push(s).unwrap();
            }
        }
        let (panel, hw) = powered(cfg).await;
        hw.channel.push_read(Ok(&[0xe6][..]));
        panel.post_enable().await.unwrap();
        assert_eq!(
            hw.log.sent_sets(),
            [
                CommandSetKind::PostOn,
                CommandSetKind::ElvssDimmingRead,
                CommandSetKind::ElvssDimmingOffset,
                CommandSetKind::CrcP3Gamut
            ]
        );
        let payloads = hw.channel.payloads();
        let offset = payloads
            .iter()
            .find(|(k, _)| *k == CommandSetKind::ElvssDimmingOffset)
            .unwrap();
        assert_eq!(offset.1, [0xb7, 0x00, 0x06]);
        assert_eq!(panel.state().await, PanelState::PostEnabled);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_state() {
        let (panel, hw) = powered(sample_config()).await;
        hw.channel.fail_on(CommandSetKind::PreOff);
        assert_eq!(
            panel.pre_disable().await,
            Err(PanelError::Transport(TransportError::Communication))
        );
        assert_eq!(panel.state().await, PanelState::Enabled);
    }

    #[tokio::test]
    async fn test_rail_off_failure_is_fatal() {
        let (panel, hw) = powered(sample_config()).await;
        panel.disable().await.unwrap();
        hw.power.fail_disable(platform::RailId(1));
        let err = panel.unprepare().await.unwrap_err();
        assert!(matches!(err, PanelError::Power(_)));
        assert_eq!(panel.state().await, PanelState::Disabled);
    }

    #[tokio::test]
    async fn test_mode_switch_sends_destination_set() {
        let (panel, hw) = powered(sample_config()).await;
        panel.switch(1).await.unwrap();
        panel.post_switch().await.unwrap();
        let payloads = hw.channel.payloads();
        assert_eq!(
            &payloads[payloads.len() - 2..],
            [
                (CommandSetKind::TimingSwitch, std::vec![0x2f, 0x02]),
                (CommandSetKind::PostTimingSwitch, std::vec![0x2f, 0x10]),
            ]
        );
        assert_eq!(panel.current_mode().await.unwrap().0, 1);
        assert_eq!(panel.host_config().await.timing.refresh_rate, 90);
    }

    #[tokio::test]
    async fn test_switch_to_undeclared_mode() {
        let (panel, hw) = powered(sample_config()).await;
        assert_eq!(
            panel.switch(4).await,
            Err(PanelError::UnsupportedMode(UnsupportedModeError::Index(4)))
        );
        assert!(hw.log.events().is_empty());
        assert_eq!(panel.current_mode().await.unwrap().0, 0);
    }

    #[tokio::test]
    async fn test_fod_hbm_cycle() {
        let (panel, hw) = powered(sample_config()).await;
        panel.set_backlight(255).await.unwrap();
        assert_eq!(panel.fod_dim_alpha().await, 250);
        hw.log.clear();
        panel.set_fod_hbm(true).await.unwrap();
        panel.set_fod_hbm(true).await.unwrap();
        panel.set_fod_hbm(false).await.unwrap();
        assert_eq!(
            hw.log.without_delays(),
            [
                HwEvent::Send(CommandSetKind::HbmFodOn),
                HwEvent::Send(CommandSetKind::HbmFodOff),
                HwEvent::Send(CommandSetKind::Brightness),
            ]
        );
        assert_eq!(hw.log.count(HwEvent::Delay(170)), 1);
        assert_eq!(panel.telemetry().await.hbm_times, 1);
    }

    #[tokio::test]
    async fn test_fod_hbm_needs_panel_on() {
        let (panel, _hw) = panel_with(sample_config());
        assert!(matches!(
            panel.set_fod_hbm(true).await,
            Err(PanelError::Sequence(_))
        ));
    }

    #[tokio::test]
    async fn test_doze_entry_drops_fod_hbm() {
        let (panel, hw) = powered(sample_config()).await;
        panel.set_backlight(255).await.unwrap();
        panel.set_fod_hbm(true).await.unwrap();
        hw.log.clear();
        panel.set_lp1().await.unwrap();
        assert_eq!(
            hw.log.sent_sets(),
            [
                CommandSetKind::Lp1,
                CommandSetKind::HbmFodOff,
                CommandSetKind::DozeHbm
            ]
        );
        hw.log.clear();
        panel.set_fod_hbm(false).await.unwrap();
        assert!(hw.log.events().is_empty());
        assert!(matches!(
            panel.set_fod_hbm(true).await,
            Err(PanelError::Sequence(SequenceError {
                state: PanelState::LowPower1,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_restore_failure_reaches_caller() {
        let (panel, hw) = panel_with(sample_config());
        panel.pre_prepare().await.unwrap();
        panel.set_backlight(255).await.unwrap();
        panel.prepare().await.unwrap();
        hw.channel.fail_on(CommandSetKind::Brightness);
        assert!(matches!(
            panel.enable().await,
            Err(PanelError::Transport(_))
        ));
        // ON went out before the brightness write failed.
        assert_eq!(panel.state().await, PanelState::Enabled);

        panel.set_lp1().await.unwrap();
        assert!(matches!(
            panel.set_nolp().await,
            Err(PanelError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_dc_dimming_holds_level() {
        let (panel, hw) = powered(sample_config()).await;
        // 20/255 of 2047 maps to 160
        assert_eq!(panel.set_backlight(20).await.unwrap().level, 160);
        hw.log.clear();
        let out = panel.set_dc_dimming(true).await.unwrap();
        assert_eq!(out.level, 300);
        assert!(out.applied);
        assert_eq!(hw.channel.payloads().last().unwrap().1, [0x51, 0x01, 0x2c]);
        let out = panel.set_dc_dimming(false).await.unwrap();
        assert_eq!(out.level, 160);
    }

    #[tokio::test]
    async fn test_dc_dimming_without_threshold() {
        let mut cfg = sample_config();
        if let PanelKind::Dsi(dsi) = &mut cfg.kind {
            dsi.backlight.dc_threshold = 0;
        }
        let (panel, hw) = powered(cfg).await;
        assert_eq!(
            panel.set_dc_dimming(true).await,
            Err(PanelError::UnsupportedMode(UnsupportedModeError::DcDimming))
        );
        assert!(hw.log.events().is_empty());
        assert!(panel.set_dc_dimming(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_bridge_tracks_state_only() {
        let mut cfg = sample_config();
        cfg.kind = PanelKind::ExtBridge;
        let (panel, hw) = panel_with(cfg);
        panel.pre_prepare().await.unwrap();
        panel.prepare().await.unwrap();
        panel.enable().await.unwrap();
        let out = panel.set_backlight(255).await.unwrap();
        assert!(!out.applied);
        panel.disable().await.unwrap();
        panel.unprepare().await.unwrap();
        panel.post_unprepare().await.unwrap();
        assert!(hw.log.events().is_empty());
        assert_eq!(panel.state().await, PanelState::Off);
    }

    #[tokio::test]
    async fn test_bit_clock_and_accessors() {
        let (panel, _hw) = panel_with(sample_config());
        assert_eq!(panel.mode_count().await, 2);
        assert!(panel.validate_mode(1).await.is_ok());
        assert_eq!(panel.phy_props().await.width_mm, 69);
        assert_eq!(panel.dfps_caps().await.max_refresh_rate, 120);
        assert_eq!(panel.name().await.as_str(), "sample-amoled");
        assert!(panel.set_bit_clock(999).await.is_err());
        panel.set_bit_clock(1_200_000_000).await.unwrap();
        assert_eq!(panel.host_config().await.bit_clk_hz, 1_200_000_000);
    }

    #[tokio::test]
    async fn test_kickoff_counted() {
        let (panel, _hw) = panel_with(sample_config());
        panel.record_kickoff().await;
        panel.record_kickoff().await;
        assert_eq!(panel.telemetry().await.kickoff_count, 2);
    }
}
