//! Backlight output device
//!
//! PWM and WLED backlights are driven through [`BacklightDevice`]. DCS
//! backlights are written over the command channel by the panel core and
//! never reach this trait.

use embedded_hal::pwm::SetDutyCycle;

/// Backlight device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BacklightError {
    /// The device rejected the level.
    #[error("backlight device rejected level")]
    Device,
    /// No device is attached.
    #[error("no backlight device attached")]
    Unsupported,
}

/// Brightness output.
pub trait BacklightDevice {
    /// Output `level` on a scale of `0..=max`. Zero switches the output off.
    async fn set_level(&mut self, level: u32, max: u32) -> Result<(), BacklightError>;
}

/// Placeholder for panels whose backlight is not driven by a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBacklightDevice;

impl BacklightDevice for NoBacklightDevice {
    async fn set_level(&mut self, _level: u32, _max: u32) -> Result<(), BacklightError> {
        Err(BacklightError::Unsupported)
    }
}

/// [`BacklightDevice`] over an `embedded-hal` PWM channel.
pub struct PwmBacklight<P> {
    pwm: P,
}

impl<P: SetDutyCycle> PwmBacklight<P> {
    /// Wrap a PWM channel.
    pub const fn new(pwm: P) -> Self {
        Self { pwm }
    }

    /// Release the PWM channel.
    pub fn release(self) -> P {
        self.pwm
    }

    /// Duty cycle for `level` out of `max`, scaled to the channel's range.
    fn duty_for(&self, level: u32, max: u32) -> u16 {
        if max == 0 {
            return 0;
        }
        let full = u32::from(self.pwm.max_duty_cycle());
        let duty = u64::from(level.min(max))
            .saturating_mul(u64::from(full))
            .checked_div(u64::from(max))
            .unwrap_or(0);
        u16::try_from(duty).unwrap_or(u16::MAX)
    }
}

impl<P: SetDutyCycle> BacklightDevice for PwmBacklight<P> {
    async fn set_level(&mut self, level: u32, max: u32) -> Result<(), BacklightError> {
        let duty = self.duty_for(level, max);
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|_| BacklightError::Device)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct RecordingPwm {
        max: u16,
        duty: u16,
    }

    impl embedded_hal::pwm::ErrorType for RecordingPwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for RecordingPwm {
        fn max_duty_cycle(&self) -> u16 {
            self.max
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
            self.duty = duty;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pwm_scales_level_to_duty() {
        let mut bl = PwmBacklight::new(RecordingPwm { max: 1000, duty: 0 });
        bl.set_level(2048, 4096).await.unwrap();
        assert_eq!(bl.release().duty, 500);
    }

    #[tokio::test]
    async fn test_pwm_zero_and_overrange() {
        let mut bl = PwmBacklight::new(RecordingPwm { max: 255, duty: 7 });
        bl.set_level(0, 4096).await.unwrap();
        assert_eq!(bl.pwm.duty, 0);
        bl.set_level(9999, 4096).await.unwrap();
        assert_eq!(bl.pwm.duty, 255);
        bl.set_level(10, 0).await.unwrap();
        assert_eq!(bl.pwm.duty, 0);
    }

    #[tokio::test]
    async fn test_no_device_is_unsupported() {
        let mut bl = NoBacklightDevice;
        assert_eq!(
            bl.set_level(1, 1).await,
            Err(BacklightError::Unsupported)
        );
    }
}
