//! Deferred panel-on dimming
//!
//! `post_enable` schedules the `DimmingOn` command some milliseconds out;
//! `pre_disable` and `disable` cancel it. The wait runs in a task the
//! integrator spawns ([`Panel::run_deferred_dimming`](crate::Panel::run_deferred_dimming)),
//! never inside a lifecycle call.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;

/// One-shot, cancellable timer shared between the lifecycle and its task.
pub struct DeferredDimming<M: RawMutex> {
    schedule: Signal<M, u32>,
    cancel: Signal<M, ()>,
}

impl<M: RawMutex> DeferredDimming<M> {
    /// Nothing scheduled.
    pub const fn new() -> Self {
        Self {
            schedule: Signal::new(),
            cancel: Signal::new(),
        }
    }

    /// Fire after `delay_ms`, replacing any pending schedule.
    pub fn schedule(&self, delay_ms: u32) {
        self.cancel.reset();
        self.schedule.signal(delay_ms);
    }

    /// Drop the pending schedule, if any.
    pub fn cancel_pending(&self) {
        self.schedule.reset();
        self.cancel.signal(());
    }

    /// Resolve when a scheduled delay elapses without being cancelled.
    pub async fn next_due(&self) {
        loop {
            let delay_ms = self.schedule.wait().await;
            match select(
                Timer::after_millis(u64::from(delay_ms)),
                self.cancel.wait(),
            )
            .await
            {
                Either::First(()) => return,
                Either::Second(()) => {
                    debug!("deferred dimming cancelled");
                }
            }
        }
    }
}

impl<M: RawMutex> Default for DeferredDimming<M> {
    fn default() -> Self {
        Self::new()
    }
}
