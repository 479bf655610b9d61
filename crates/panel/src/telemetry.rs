//! Panel aging counters
//!
//! Durations are charged to the level that was on screen while they
//! elapsed, so every update first closes the previous interval. Nothing here
//! can fail; a clock that goes backwards simply charges nothing.

use embassy_time::Instant;

/// Levels at or above this count as high brightness.
pub const HIGH_LEVEL_THRESHOLD: u32 = 2048;
/// Non-zero levels below this count as low brightness.
pub const LOW_LEVEL_THRESHOLD: u32 = 1024;

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PanelCounters {
    /// Time spent enabled, ms.
    pub panel_active_ms: u64,
    /// Frames kicked off.
    pub kickoff_count: u64,
    /// Time with the backlight on, ms.
    pub bl_duration_ms: u64,
    /// Sum of level × ms.
    pub bl_level_integral: u64,
    /// Time at high brightness, ms.
    pub bl_highlevel_duration_ms: u64,
    /// Time at low brightness, ms.
    pub bl_lowlevel_duration_ms: u64,
    /// Time with the fingerprint overlay on, ms.
    pub hbm_duration_ms: u64,
    /// Times the fingerprint overlay was switched on.
    pub hbm_times: u32,
}

/// Counter accumulator.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    counters: PanelCounters,
    level: u32,
    level_since: Option<Instant>,
    active_since: Option<Instant>,
    hbm_since: Option<Instant>,
}

fn elapsed_ms(since: Option<Instant>, now: Instant) -> u64 {
    since
        .and_then(|t| now.checked_duration_since(t))
        .map_or(0, |d| d.as_millis())
}

impl Telemetry {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Level now on screen changes to `level`.
    pub fn record_level(&mut self, level: u32, now: Instant) {
        let ms = elapsed_ms(self.level_since, now);
        let prev = self.level;
        let c = &mut self.counters;
        if prev > 0 {
            c.bl_duration_ms = c.bl_duration_ms.saturating_add(ms);
            c.bl_level_integral = c
                .bl_level_integral
                .saturating_add(u64::from(prev).saturating_mul(ms));
            if prev >= HIGH_LEVEL_THRESHOLD {
                c.bl_highlevel_duration_ms = c.bl_highlevel_duration_ms.saturating_add(ms);
            } else if prev < LOW_LEVEL_THRESHOLD {
                c.bl_lowlevel_duration_ms = c.bl_lowlevel_duration_ms.saturating_add(ms);
            }
        }
        self.level = level;
        self.level_since = Some(now);
    }

    /// Panel switched on.
    pub fn mark_active(&mut self, now: Instant) {
        if self.active_since.is_none() {
            self.active_since = Some(now);
        }
    }

    /// Panel switched off.
    pub fn mark_inactive(&mut self, now: Instant) {
        let ms = elapsed_ms(self.active_since.take(), now);
        self.counters.panel_active_ms = self.counters.panel_active_ms.saturating_add(ms);
        self.record_level(0, now);
    }

    /// Fingerprint overlay switched on or off.
    pub fn record_hbm(&mut self, on: bool, now: Instant) {
        if on {
            if self.hbm_since.is_none() {
                self.hbm_since = Some(now);
                self.counters.hbm_times = self.counters.hbm_times.saturating_add(1);
            }
        } else {
            let ms = elapsed_ms(self.hbm_since.take(), now);
            self.counters.hbm_duration_ms = self.counters.hbm_duration_ms.saturating_add(ms);
        }
    }

    /// One frame kicked off.
    pub fn record_kickoff(&mut self) {
        self.counters.kickoff_count = self.counters.kickoff_count.saturating_add(1);
    }

    /// Counters, with open intervals charged up to `now`.
    pub fn snapshot(&self, now: Instant) -> PanelCounters {
        let mut snapshot = self.clone();
        snapshot.record_level(self.level, now);
        if snapshot.active_since.is_some() {
            let ms = elapsed_ms(snapshot.active_since, now);
            snapshot.counters.panel_active_ms = snapshot.counters.panel_active_ms.saturating_add(ms);
        }
        if snapshot.hbm_since.is_some() {
            snapshot.record_hbm(false, now);
        }
        snapshot.counters
    }
}
