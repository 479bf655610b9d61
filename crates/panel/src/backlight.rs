//! Backlight level computation
//!
//! ```text
//! brightness ──map──► raw level ──bl_scale──► ──bl_scale_ad──► ──delta──► clamp ──┬──► DC hold ──► hardware
//!                                                                                  │
//!                                                                    dimming table ┴──► overlay alpha
//! ```
//!
//! With DC dimming on, levels below `dc_threshold` are driven at the
//! threshold and the overlay alpha is still taken from the requested level,
//! so the compositor's dim layer covers the rest.
//!
//! Everything here is pure: the same request with the same scales always
//! yields the same level and alpha. Writing the level and gating it on the
//! lifecycle state is the panel's job.

use crate::config::{
    BacklightConfig, DeltaOrder, DimPair, MAX_AD_BL_SCALE_LEVEL, MAX_BL_SCALE_LEVEL,
};

/// Result of a brightness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BacklightOutput {
    /// Raw hardware level.
    pub level: u32,
    /// Dimming overlay alpha for the compositor.
    pub alpha: u32,
    /// The level was written to hardware (false while dozing or off).
    pub applied: bool,
}

/// Brightness to hardware level and overlay alpha.
#[derive(Debug, Clone)]
pub struct BacklightController {
    cfg: BacklightConfig,
    delta: i32,
    bl_scale: u32,
    bl_scale_ad: u32,
    fod_active: bool,
    dc_enable: bool,
    last_brightness: u32,
    last_level: u32,
}

impl BacklightController {
    /// Create a controller at unity scale, with nothing requested yet.
    pub fn new(cfg: BacklightConfig, delta: i32) -> Self {
        Self {
            cfg,
            delta,
            bl_scale: MAX_BL_SCALE_LEVEL,
            bl_scale_ad: MAX_AD_BL_SCALE_LEVEL,
            fod_active: false,
            dc_enable: false,
            last_brightness: 0,
            last_level: 0,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &BacklightConfig {
        &self.cfg
    }

    /// Set the normal and ambient scale factors, clamped to their denominators.
    pub fn set_scale(&mut self, bl_scale: u32, bl_scale_ad: u32) {
        self.bl_scale = bl_scale.min(MAX_BL_SCALE_LEVEL);
        self.bl_scale_ad = bl_scale_ad.min(MAX_AD_BL_SCALE_LEVEL);
    }

    /// Current `(bl_scale, bl_scale_ad)`.
    pub fn scale(&self) -> (u32, u32) {
        (self.bl_scale, self.bl_scale_ad)
    }

    /// Switch alpha lookup to the fingerprint table.
    pub fn set_fod_active(&mut self, active: bool) {
        self.fod_active = active;
    }

    /// Fingerprint table in use.
    pub fn fod_active(&self) -> bool {
        self.fod_active
    }

    /// Turn DC dimming on or off. Has no effect without a `dc_threshold`.
    pub fn set_dc_enable(&mut self, on: bool) {
        self.dc_enable = on;
    }

    /// DC dimming holds low levels at the threshold.
    pub fn dc_active(&self) -> bool {
        self.dc_enable && self.cfg.dc_threshold > 0
    }

    /// Last logical brightness requested.
    pub fn last_brightness(&self) -> u32 {
        self.last_brightness
    }

    /// Last hardware level computed.
    pub fn last_level(&self) -> u32 {
        self.last_level
    }

    /// Record a request and return its level and alpha.
    pub fn update(&mut self, brightness: u32) -> (u32, u32) {
        let target = self.target(brightness);
        let level = self.hold_dc(target);
        self.last_brightness = brightness;
        self.last_level = level;
        (level, self.alpha(target))
    }

    /// Hardware level for `brightness`. Zero is always off.
    pub fn compute(&self, brightness: u32) -> u32 {
        self.hold_dc(self.target(brightness))
    }

    /// Level the request asks for, before any DC hold.
    fn target(&self, brightness: u32) -> u32 {
        if brightness == 0 {
            return 0;
        }
        let level = self.clamp(i64::from(self.map(brightness)));
        let corrected = match self.cfg.delta_order {
            DeltaOrder::AfterScale => self.apply_delta(self.apply_scale(level)),
            DeltaOrder::BeforeScale => self.apply_scale(self.apply_delta(level)),
        };
        self.clamp(i64::from(corrected))
    }

    /// Overlay alpha for a hardware level, from the active table.
    pub fn alpha(&self, level: u32) -> u32 {
        if self.fod_active {
            lookup_alpha(&self.cfg.fod_dim_lut, level)
        } else {
            lookup_alpha(&self.cfg.dim_lut, level)
        }
    }

    /// Alpha from the fingerprint table regardless of overlay state.
    pub fn fod_alpha(&self, level: u32) -> u32 {
        lookup_alpha(&self.cfg.fod_dim_lut, level)
    }

    fn hold_dc(&self, level: u32) -> u32 {
        if level > 0 && self.dc_active() {
            level.max(self.cfg.dc_threshold)
        } else {
            level
        }
    }

    fn map(&self, brightness: u32) -> u32 {
        let b = brightness.min(self.cfg.brightness_max_level);
        let raw = u64::from(b)
            .saturating_mul(u64::from(self.cfg.bl_max_level))
            .checked_div(u64::from(self.cfg.brightness_max_level))
            .unwrap_or(0);
        u32::try_from(raw).unwrap_or(u32::MAX)
    }

    fn apply_scale(&self, level: u32) -> u32 {
        let scaled = u64::from(level)
            .saturating_mul(u64::from(self.bl_scale))
            .checked_div(u64::from(MAX_BL_SCALE_LEVEL))
            .unwrap_or(0)
            .saturating_mul(u64::from(self.bl_scale_ad))
            .checked_div(u64::from(MAX_AD_BL_SCALE_LEVEL))
            .unwrap_or(0);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    fn apply_delta(&self, level: u32) -> u32 {
        let shifted = i64::from(level).saturating_add(i64::from(self.delta));
        u32::try_from(shifted.max(0)).unwrap_or(u32::MAX)
    }

    fn clamp(&self, level: i64) -> u32 {
        let lo = i64::from(self.cfg.bl_min_level);
        let hi = i64::from(self.cfg.bl_max_level);
        u32::try_from(level.clamp(lo, hi)).unwrap_or(0)
    }
}

/// Alpha for `level` in a table sorted by brightness.
///
/// Below the first entry the first alpha is used, above the last the last
/// alpha; in between the two neighbours are interpolated linearly. An empty
/// table yields 0.
pub fn lookup_alpha(lut: &[DimPair], level: u32) -> u32 {
    let idx = lut.partition_point(|p| p.brightness < level);
    let (Some(first), Some(last)) = (lut.first(), lut.last()) else {
        return 0;
    };
    if idx == 0 {
        return first.alpha;
    }
    let (Some(lo), Some(hi)) = (lut.get(idx.saturating_sub(1)), lut.get(idx)) else {
        return last.alpha;
    };
    if hi.brightness == level {
        return hi.alpha;
    }
    let span = u64::from(hi.brightness.saturating_sub(lo.brightness));
    let rise = u64::from(hi.alpha.saturating_sub(lo.alpha));
    let offset = u64::from(level.saturating_sub(lo.brightness));
    let step = rise
        .saturating_mul(offset)
        .checked_div(span)
        .unwrap_or(rise);
    lo.alpha
        .saturating_add(u32::try_from(step).unwrap_or(u32::MAX))
        .min(hi.alpha)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::config::{BacklightTransport, DimLut};
    use proptest::prelude::*;

    fn lut(points: &[(u32, u32)]) -> DimLut {
        points.iter().map(|&(b, a)| DimPair::new(b, a)).collect()
    }

    fn cfg() -> BacklightConfig {
        BacklightConfig {
            transport: BacklightTransport::Dcs { byte_swap: false },
            bl_min_level: 10,
            bl_max_level: 4000,
            brightness_max_level: 255,
            bl_doze_lbm: 20,
            bl_doze_hbm: 200,
            delta_order: DeltaOrder::AfterScale,
            dim_lut: lut(&[(10, 0), (100, 40), (1000, 200), (4000, 255)]),
            fod_dim_lut: lut(&[(10, 100), (4000, 250)]),
            dc_threshold: 0,
        }
    }

    #[test]
    fn test_zero_is_off() {
        let bl = BacklightController::new(cfg(), 5);
        assert_eq!(bl.compute(0), 0);
    }

    #[test]
    fn test_full_brightness_maps_to_max() {
        let bl = BacklightController::new(cfg(), 0);
        assert_eq!(bl.compute(255), 4000);
        assert_eq!(bl.compute(10_000), 4000);
    }

    #[test]
    fn test_low_brightness_clamps_to_min() {
        let bl = BacklightController::new(cfg(), 0);
        assert_eq!(bl.compute(1), 15);
        let mut scaled = BacklightController::new(cfg(), 0);
        scaled.set_scale(0, MAX_AD_BL_SCALE_LEVEL);
        assert_eq!(scaled.compute(1), 10);
    }

    #[test]
    fn test_scale_halves_level() {
        let mut bl = BacklightController::new(cfg(), 0);
        bl.set_scale(MAX_BL_SCALE_LEVEL / 2, MAX_AD_BL_SCALE_LEVEL);
        assert_eq!(bl.compute(255), 2000);
    }

    #[test]
    fn test_scale_clamped_to_denominator() {
        let mut bl = BacklightController::new(cfg(), 0);
        bl.set_scale(5000, 100_000);
        assert_eq!(bl.scale(), (MAX_BL_SCALE_LEVEL, MAX_AD_BL_SCALE_LEVEL));
    }

    #[test]
    fn test_delta_order_policy() {
        let mut after = BacklightController::new(cfg(), 40);
        after.set_scale(MAX_BL_SCALE_LEVEL / 2, MAX_AD_BL_SCALE_LEVEL);
        let mut before_cfg = cfg();
        before_cfg.delta_order = DeltaOrder::BeforeScale;
        let mut before = BacklightController::new(before_cfg, 40);
        before.set_scale(MAX_BL_SCALE_LEVEL / 2, MAX_AD_BL_SCALE_LEVEL);

        // 128/255 of 4000 maps to 2007
        assert_eq!(after.compute(128), 1003 + 40);
        assert_eq!(before.compute(128), (2007 + 40) / 2);
    }

    #[test]
    fn test_negative_delta_never_below_min() {
        let bl = BacklightController::new(cfg(), -48);
        assert_eq!(bl.compute(1), 10);
    }

    #[test]
    fn test_alpha_table_edges_and_interpolation() {
        let table = lut(&[(10, 0), (100, 40), (1000, 200)]);
        assert_eq!(lookup_alpha(&table, 0), 0);
        assert_eq!(lookup_alpha(&table, 10), 0);
        assert_eq!(lookup_alpha(&table, 55), 20);
        assert_eq!(lookup_alpha(&table, 100), 40);
        assert_eq!(lookup_alpha(&table, 550), 120);
        assert_eq!(lookup_alpha(&table, 4000), 200);
        assert_eq!(lookup_alpha(&[], 500), 0);
    }

    #[test]
    fn test_duplicate_brightness_hits_first_entry() {
        let table = lut(&[(10, 0), (100, 40), (100, 60), (200, 80)]);
        assert_eq!(lookup_alpha(&table, 100), 40);
        assert_eq!(lookup_alpha(&table, 150), 70);
    }

    #[test]
    fn test_fod_table_used_when_active() {
        let mut bl = BacklightController::new(cfg(), 0);
        let normal = bl.alpha(10);
        bl.set_fod_active(true);
        assert_eq!(normal, 0);
        assert_eq!(bl.alpha(10), 100);
        assert_eq!(bl.fod_alpha(4000), 250);
    }

    #[test]
    fn test_dc_dimming_holds_low_levels() {
        let mut dc_cfg = cfg();
        dc_cfg.dc_threshold = 500;
        let mut bl = BacklightController::new(dc_cfg, 0);
        // 16/255 of 4000 maps to 250
        let (plain, plain_alpha) = bl.update(16);
        assert_eq!(plain, 250);

        bl.set_dc_enable(true);
        let (held, held_alpha) = bl.update(16);
        assert_eq!(held, 500);
        assert_eq!(held_alpha, plain_alpha);
        assert_eq!(bl.last_level(), 500);
        assert_eq!(bl.compute(0), 0);
        assert_eq!(bl.compute(255), 4000);
    }

    #[test]
    fn test_dc_dimming_needs_threshold() {
        let mut bl = BacklightController::new(cfg(), 0);
        bl.set_dc_enable(true);
        assert!(!bl.dc_active());
        assert_eq!(bl.compute(16), 250);
    }

    #[test]
    fn test_update_records_last() {
        let mut bl = BacklightController::new(cfg(), 0);
        let (level, _) = bl.update(255);
        assert_eq!(bl.last_brightness(), 255);
        assert_eq!(bl.last_level(), level);
    }

    fn monotone_lut() -> impl Strategy<Value = DimLut> {
        prop::collection::vec((1u32..200, 0u32..20), 1..16).prop_map(|steps| {
            let mut b = 0u32;
            let mut a = 0u32;
            steps
                .into_iter()
                .map(|(db, da)| {
                    b += db;
                    a += da;
                    DimPair::new(b, a)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_request_is_idempotent(b in 0u32..=300, delta in -48i32..=48) {
            let mut bl = BacklightController::new(cfg(), delta);
            let first = bl.update(b);
            let second = bl.update(b);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_level_within_bounds(b in 1u32..=300, delta in -48i32..=48, s in 0u32..=1024, ad in 0u32..=65535) {
            let mut bl = BacklightController::new(cfg(), delta);
            bl.set_scale(s, ad);
            let level = bl.compute(b);
            prop_assert!((10..=4000).contains(&level));
        }

        #[test]
        fn prop_level_monotonic(b1 in 0u32..=255, b2 in 0u32..=255, delta in -48i32..=48, dc in 0u32..=4000) {
            let mut dc_cfg = cfg();
            dc_cfg.dc_threshold = dc;
            let mut bl = BacklightController::new(dc_cfg, delta);
            bl.set_dc_enable(dc % 2 == 0);
            let (lo, hi) = if b1 <= b2 { (b1, b2) } else { (b2, b1) };
            prop_assert!(bl.compute(lo) <= bl.compute(hi));
        }

        #[test]
        fn prop_alpha_monotonic(table in monotone_lut(), l1 in 0u32..4000, l2 in 0u32..4000) {
            let (lo, hi) = if l1 <= l2 { (l1, l2) } else { (l2, l1) };
            prop_assert!(lookup_alpha(&table, lo) <= lookup_alpha(&table, hi));
        }
    }
}
