//! Power and reset sequencing
//!
//! ```text
//! power-on:  pre-power lines ↑ → pinctrl active → rails (in order) → display-enable ↑ → reset steps → mode-select
//! power-off: reset ↓ → display-enable ↓ → mode-select ↓ → pinctrl suspend → rails (reverse) → pre-power lines ↓
//! ```
//!
//! Power-on stops at the first failure and undoes what it enabled. Power-off
//! keeps going past failures so as much as possible ends up off, then
//! reports the first one.

use embedded_hal_async::delay::DelayNs;
use platform::{GpioBank, GpioLine, PinctrlState, PowerError, PowerRails};

use crate::config::{PowerConfig, PrePowerConfig, ResetConfig};
use crate::error::ResetError;

/// Keep the first error of a best-effort sequence.
fn keep_first<E>(first: &mut Option<E>, result: Result<(), E>) {
    if let Err(e) = result {
        if first.is_none() {
            *first = Some(e);
        }
    }
}

fn first_or_ok<E>(first: Option<E>) -> Result<(), E> {
    first.map_or(Ok(()), Err)
}

// ── Pre-power ────────────────────────────────────────────────────────────────

/// Drive every pre-power line high, in order.
pub fn pre_power_on<G: GpioBank>(gpio: &mut G, cfg: &PrePowerConfig) -> Result<(), ResetError> {
    for &line in &cfg.lines {
        gpio.set_level(GpioLine::PrePower(line), true)?;
    }
    Ok(())
}

/// Drive every pre-power line low, in reverse order.
pub fn pre_power_off<G: GpioBank>(gpio: &mut G, cfg: &PrePowerConfig) -> Result<(), ResetError> {
    let mut first = None;
    for &line in cfg.lines.iter().rev() {
        keep_first(&mut first, gpio.set_level(GpioLine::PrePower(line), false));
    }
    first_or_ok(first).map_err(ResetError::Line)
}

// ── Rails ────────────────────────────────────────────────────────────────────

/// Enable the rails in order, honouring each rail's delays.
///
/// On failure the rails already enabled are disabled again, in reverse.
pub async fn power_on_rails<P: PowerRails, D: DelayNs>(
    power: &mut P,
    delay: &mut D,
    cfg: &PowerConfig,
) -> Result<(), PowerError> {
    for (i, rail) in cfg.rails.iter().enumerate() {
        if rail.pre_on_ms > 0 {
            delay.delay_ms(rail.pre_on_ms).await;
        }
        if let Err(e) = power.enable(rail.id).await {
            error!("rail {} failed to enable", rail.id.index());
            for done in cfg.rails.iter().take(i).rev() {
                // The enable error is what the caller needs to see.
                let _ = power.disable(done.id).await;
            }
            return Err(e);
        }
        if rail.post_on_ms > 0 {
            delay.delay_ms(rail.post_on_ms).await;
        }
    }
    Ok(())
}

/// Disable the rails in reverse order, honouring each rail's delays.
pub async fn power_off_rails<P: PowerRails, D: DelayNs>(
    power: &mut P,
    delay: &mut D,
    cfg: &PowerConfig,
) -> Result<(), PowerError> {
    let mut first = None;
    for rail in cfg.rails.iter().rev() {
        if rail.pre_off_ms > 0 {
            delay.delay_ms(rail.pre_off_ms).await;
        }
        let result = power.disable(rail.id).await;
        if result.is_err() {
            warn!("rail {} failed to disable", rail.id.index());
        }
        keep_first(&mut first, result);
        if rail.post_off_ms > 0 {
            delay.delay_ms(rail.post_off_ms).await;
        }
    }
    first_or_ok(first)
}

// ── Reset and control lines ──────────────────────────────────────────────────

/// Raise display-enable, then replay the reset steps.
///
/// Every step waits its `sleep_ms` after the write, zero included. The
/// first failing step aborts the sequence and is reported by index.
pub async fn run_reset_sequence<G: GpioBank, D: DelayNs>(
    gpio: &mut G,
    delay: &mut D,
    cfg: &ResetConfig,
) -> Result<(), ResetError> {
    if cfg.display_enable {
        gpio.set_level(GpioLine::DisplayEnable, true)?;
    }
    if cfg.skip_reset {
        debug!("reset skipped");
        return Ok(());
    }
    for (i, step) in cfg.steps.iter().enumerate() {
        let index = u8::try_from(i).unwrap_or(u8::MAX);
        gpio.set_level(GpioLine::Reset, step.is_high())
            .map_err(|cause| ResetError::Step { step: index, cause })?;
        delay.delay_ms(step.sleep_ms).await;
    }
    Ok(())
}

/// Drive the mode-select line, if the panel has one.
pub fn set_mode_select<G: GpioBank>(gpio: &mut G, cfg: &ResetConfig) -> Result<(), ResetError> {
    if let Some(sel) = cfg.mode_select {
        gpio.set_level(GpioLine::ModeSelect, sel.is_high())?;
    }
    Ok(())
}

/// Pull every control line low and park the pins.
pub fn release_lines<G: GpioBank>(gpio: &mut G, cfg: &ResetConfig) -> Result<(), ResetError> {
    let mut first = None;
    keep_first(&mut first, gpio.set_level(GpioLine::Reset, false));
    if cfg.display_enable {
        keep_first(&mut first, gpio.set_level(GpioLine::DisplayEnable, false));
    }
    if cfg.mode_select.is_some() {
        keep_first(&mut first, gpio.set_level(GpioLine::ModeSelect, false));
    }
    keep_first(&mut first, gpio.select_pinctrl(PinctrlState::Suspend));
    first_or_ok(first).map_err(ResetError::Line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::{Rail, ResetStep};
    use heapless::Vec;
    use platform::mocks::{HwEvent, MockHardware};
    use platform::{GpioError, RailId};

    fn rails() -> PowerConfig {
        let rail = |id: u8, pre_on_ms: u32, post_on_ms: u32| Rail {
            id: RailId(id),
            name: "r".try_into().unwrap(),
            pre_on_ms,
            post_on_ms,
            pre_off_ms: 3,
            post_off_ms: 0,
        };
        PowerConfig {
            rails: [rail(0, 0, 2), rail(1, 1, 0), rail(2, 0, 0)]
                .into_iter()
                .collect(),
        }
    }

    fn reset() -> ResetConfig {
        ResetConfig {
            steps: Vec::from_slice(&[
                ResetStep::new(1, 10),
                ResetStep::new(0, 5),
                ResetStep::new(1, 0),
            ])
            .unwrap(),
            display_enable: false,
            mode_select: None,
            skip_reset: false,
        }
    }

    #[tokio::test]
    async fn test_rails_on_in_order_with_delays() {
        let hw = MockHardware::new();
        let (mut power, mut delay) = (hw.power.clone(), hw.delay.clone());
        power_on_rails(&mut power, &mut delay, &rails()).await.unwrap();
        assert_eq!(
            hw.log.events(),
            [
                HwEvent::RailOn(RailId(0)),
                HwEvent::Delay(2),
                HwEvent::Delay(1),
                HwEvent::RailOn(RailId(1)),
                HwEvent::RailOn(RailId(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_rail_failure_rolls_back() {
        let hw = MockHardware::new();
        hw.power.fail_enable(RailId(2));
        let (mut power, mut delay) = (hw.power.clone(), hw.delay.clone());
        let err = power_on_rails(&mut power, &mut delay, &rails())
            .await
            .unwrap_err();
        assert_eq!(err, PowerError::Regulator(RailId(2)));
        assert!(hw.power.enabled().is_empty());
        let log = hw.log.without_delays();
        assert_eq!(
            &log[2..],
            [HwEvent::RailOff(RailId(1)), HwEvent::RailOff(RailId(0))]
        );
    }

    #[tokio::test]
    async fn test_rails_off_continue_past_failure() {
        let hw = MockHardware::new();
        hw.power.fail_disable(RailId(1));
        let (mut power, mut delay) = (hw.power.clone(), hw.delay.clone());
        power_on_rails(&mut power, &mut delay, &rails()).await.unwrap();
        hw.log.clear();
        let err = power_off_rails(&mut power, &mut delay, &rails())
            .await
            .unwrap_err();
        assert_eq!(err, PowerError::Regulator(RailId(1)));
        assert_eq!(
            hw.log.without_delays(),
            [HwEvent::RailOff(RailId(2)), HwEvent::RailOff(RailId(0))]
        );
        assert_eq!(hw.log.count(HwEvent::Delay(3)), 3);
    }

    #[tokio::test]
    async fn test_reset_steps_with_every_delay() {
        let hw = MockHardware::new();
        let (mut gpio, mut delay) = (hw.gpio.clone(), hw.delay.clone());
        run_reset_sequence(&mut gpio, &mut delay, &reset()).await.unwrap();
        assert_eq!(
            hw.log.events(),
            [
                HwEvent::Gpio(GpioLine::Reset, true),
                HwEvent::Delay(10),
                HwEvent::Gpio(GpioLine::Reset, false),
                HwEvent::Delay(5),
                HwEvent::Gpio(GpioLine::Reset, true),
                HwEvent::Delay(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_failure_reports_step() {
        let hw = MockHardware::new();
        hw.gpio.fail_write(1);
        let (mut gpio, mut delay) = (hw.gpio.clone(), hw.delay.clone());
        let err = run_reset_sequence(&mut gpio, &mut delay, &reset())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResetError::Step {
                step: 1,
                cause: GpioError::Write(GpioLine::Reset)
            }
        );
        // the third step never ran
        assert_eq!(hw.log.count(HwEvent::Gpio(GpioLine::Reset, true)), 1);
    }

    #[tokio::test]
    async fn test_display_enable_precedes_reset() {
        let hw = MockHardware::new();
        let mut cfg = reset();
        cfg.display_enable = true;
        cfg.skip_reset = true;
        let (mut gpio, mut delay) = (hw.gpio.clone(), hw.delay.clone());
        run_reset_sequence(&mut gpio, &mut delay, &cfg).await.unwrap();
        assert_eq!(
            hw.log.events(),
            [HwEvent::Gpio(GpioLine::DisplayEnable, true)]
        );
    }

    #[test]
    fn test_release_lines_order() {
        let hw = MockHardware::new();
        let mut cfg = reset();
        cfg.display_enable = true;
        cfg.mode_select = Some(crate::config::ModeSelect::High);
        let mut gpio = hw.gpio.clone();
        release_lines(&mut gpio, &cfg).unwrap();
        assert_eq!(
            hw.log.events(),
            [
                HwEvent::Gpio(GpioLine::Reset, false),
                HwEvent::Gpio(GpioLine::DisplayEnable, false),
                HwEvent::Gpio(GpioLine::ModeSelect, false),
                HwEvent::Pinctrl(PinctrlState::Suspend),
            ]
        );
    }

    #[test]
    fn test_pre_power_off_reverse_and_best_effort() {
        let hw = MockHardware::new();
        let cfg = PrePowerConfig {
            lines: Vec::from_slice(&[0, 1, 2]).unwrap(),
        };
        let mut gpio = hw.gpio.clone();
        pre_power_on(&mut gpio, &cfg).unwrap();
        hw.log.clear();
        hw.gpio.fail_write(0);
        let err = pre_power_off(&mut gpio, &cfg).unwrap_err();
        assert_eq!(err, ResetError::Line(GpioError::Write(GpioLine::PrePower(2))));
        assert_eq!(
            hw.log.events(),
            [
                HwEvent::Gpio(GpioLine::PrePower(1), false),
                HwEvent::Gpio(GpioLine::PrePower(0), false),
            ]
        );
    }
}
