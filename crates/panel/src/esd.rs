//! ESD detection and recovery
//!
//! ```text
//! run_esd_monitor ─┐                       ┌─► run_recovery ──► recover()
//! run_esd_irq ─────┼─► request_recovery() ─┤     (disable → unprepare → prepare → enable)
//! trigger_esd_attack┘   esd_pending.swap    └─ already pending: dropped
//! ```
//!
//! Detection never fails: a transport error during the status query counts
//! as an unhealthy panel. The pending flag is a single slot; requests made
//! while one is outstanding are absorbed. Only a failing recovery surfaces
//! an error, and it leaves the flag set so detection does not retrigger
//! until the owner steps in.

use core::convert::Infallible;
use core::sync::atomic::Ordering;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Timer;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::digital::Wait;
use platform::{
    BacklightDevice, CommandChannel, GpioBank, GpioLine, LinkMode, PowerRails, TransportError,
};

use crate::config::{EsdCheckGroup, EsdConfig, EsdExpect, EsdMode, RegReadCheck};
use crate::error::{PanelError, ResetError};
use crate::lifecycle::Panel;

/// Outcome of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EsdVerdict {
    /// Panel answered as expected.
    Healthy,
    /// Panel did not answer, or answered wrong; recovery requested.
    Failed,
    /// Not checked: panel off, no ESD support, or recovery already pending.
    Skipped,
}

/// `true` if every group's masked bytes match its expectation.
pub fn groups_pass(groups: &[EsdCheckGroup], reply: &[u8]) -> bool {
    groups.iter().all(|g| {
        let Some(end) = g.offset.checked_add(g.mask.len()) else {
            return false;
        };
        let Some(slice) = reply.get(g.offset..end) else {
            return false;
        };
        let equal = slice
            .iter()
            .zip(&g.mask)
            .map(|(b, m)| b & m)
            .eq(g.expect.bytes().iter().zip(&g.mask).map(|(e, m)| e & m));
        match g.expect {
            EsdExpect::Valid(_) => equal,
            EsdExpect::Invalid(_) => !equal,
        }
    })
}

async fn read_status<CH: CommandChannel>(
    channel: &mut CH,
    check: &RegReadCheck,
) -> Result<bool, TransportError> {
    let reply = channel.send_and_read(&check.status_cmd, check.read_len).await?;
    if reply.len() < check.read_len {
        return Err(TransportError::ShortRead);
    }
    Ok(groups_pass(&check.groups, &reply))
}

/// Query the panel once.
///
/// With `use_cmd_channel` the link is moved to low power for the query and
/// put back afterwards.
pub async fn check_status<CH: CommandChannel>(channel: &mut CH, esd: &EsdConfig) -> EsdVerdict {
    let previous = if esd.use_cmd_channel {
        channel.select_link(LinkMode::LowPower).await.ok()
    } else {
        None
    };

    let healthy = match &esd.mode {
        EsdMode::RegisterRead(check) => read_status(channel, check).await,
        EsdMode::BusTurnaround => channel.bus_turnaround().await.map(|()| true),
        EsdMode::PanelTe { timeout_ms } => channel.wait_te(*timeout_ms).await.map(|()| true),
    };

    if let Some(link) = previous.filter(|l| *l != LinkMode::LowPower) {
        if channel.select_link(link).await.is_err() {
            warn!("link not restored after status check");
        }
    }

    match healthy {
        Ok(true) => EsdVerdict::Healthy,
        Ok(false) => {
            warn!("panel status mismatch");
            EsdVerdict::Failed
        }
        Err(_) => {
            warn!("panel status query failed");
            EsdVerdict::Failed
        }
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
    /// Run one health check and request recovery on failure.
    ///
    /// Only an enabled panel with ESD support is checked.
    pub async fn check_esd(&self) -> EsdVerdict {
        if self.esd_recovery_pending() {
            return EsdVerdict::Skipped;
        }
        let verdict = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let esd = inner.dsi.as_ref().and_then(|d| d.esd.as_ref());
            match esd {
                Some(esd) if inner.state.is_enabled() => {
                    check_status(&mut inner.hw.channel, esd).await
                }
                _ => EsdVerdict::Skipped,
            }
        };
        if verdict == EsdVerdict::Failed {
            self.request_recovery();
        }
        verdict
    }

    /// Set the pending flag. Returns `false` if a recovery was already
    /// pending; the request is absorbed.
    pub fn request_recovery(&self) -> bool {
        if self.esd_pending.swap(true, Ordering::AcqRel) {
            debug!("recovery already pending");
            return false;
        }
        warn!("ESD failure, recovery requested");
        self.recovery.signal(());
        true
    }

    /// A recovery is requested and not yet completed.
    pub fn esd_recovery_pending(&self) -> bool {
        self.esd_pending.load(Ordering::Acquire)
    }

    /// Power-cycle the panel if a recovery is pending.
    ///
    /// Returns `Ok(true)` after a completed cycle, `Ok(false)` when there was
    /// nothing to do or the panel is no longer on (the request is dropped).
    /// On failure the flag stays set and the error is returned.
    pub async fn recover(&self) -> Result<bool, PanelError> {
        let mut inner = self.inner.lock().await;
        if !self.esd_recovery_pending() {
            return Ok(false);
        }
        if !(inner.state.is_enabled() || inner.state.is_low_power()) {
            debug!("recovery dropped in {}", inner.state.name());
            self.esd_pending.store(false, Ordering::Release);
            return Ok(false);
        }
        self.dimming.cancel_pending();
        info!("recovering panel {}", inner.name.as_str());
        if let Err(e) = inner.power_cycle().await {
            error!("panel recovery failed in {}", inner.state.name());
            return Err(e);
        }
        self.esd_pending.store(false, Ordering::Release);
        info!("panel recovered");
        Ok(true)
    }

    /// Serve recovery requests. Never returns.
    pub async fn run_recovery(&self) {
        loop {
            self.recovery.wait().await;
            // A failed recovery is logged by `recover`; the flag stays set
            // until the owner intervenes.
            let _ = self.recover().await;
        }
    }

    /// Poll the panel every `check_interval_ms`.
    ///
    /// Returns at once for a panel without ESD support.
    pub async fn run_esd_monitor(&self) {
        let Some(interval) = self.esd_interval_ms else {
            return;
        };
        loop {
            Timer::after_millis(u64::from(interval)).await;
            let verdict = self.check_esd().await;
            trace!("esd check: {}", verdict == EsdVerdict::Healthy);
        }
    }

    /// Request recovery on every rising edge of the panel's error line while
    /// the panel is on.
    pub async fn run_esd_irq<P: Wait>(&self, pin: &mut P) -> Result<Infallible, P::Error> {
        loop {
            pin.wait_for_rising_edge().await?;
            let enabled = self.inner.lock().await.state.is_enabled();
            if enabled && self.esd_interval_ms.is_some() {
                self.request_recovery();
            } else {
                trace!("esd edge ignored");
            }
        }
    }

    /// Force the recovery path: pull reset low, then request recovery.
    ///
    /// Fails with [`PanelError::EsdUnavailable`] on a bridge or a panel
    /// without ESD support, without touching hardware.
    pub async fn trigger_esd_attack(&self) -> Result<(), PanelError> {
        {
            let mut inner = self.inner.lock().await;
            let supported = inner.dsi.as_ref().is_some_and(|d| d.esd.is_some());
            if !supported {
                return Err(PanelError::EsdUnavailable);
            }
            inner
                .hw
                .gpio
                .set_level(GpioLine::Reset, false)
                .map_err(ResetError::Line)?;
        }
        warn!("esd attack triggered");
        self.request_recovery();
        Ok(())
    }
}
