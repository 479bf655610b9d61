//! Panel error taxonomy
//!
//! Collaborator errors ([`TransportError`], [`PowerError`], [`GpioError`])
//! come from `platform`; the rest are raised by the core. Everything is
//! `Copy + Eq` so callers can match and tests can compare.

use platform::{BacklightError, GpioError, PowerError, TransportError};

use crate::state::PanelState;

/// Reset / control line sequencing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetError {
    /// A reset step failed; later steps were not attempted.
    #[error("reset step {step} failed")]
    Step {
        /// Zero-based index of the failing step.
        step: u8,
        /// Line error.
        #[source]
        cause: GpioError,
    },
    /// Display-enable, mode-select, pre-power line or pin-control failure.
    #[error("panel control line failed")]
    Line(#[from] GpioError),
}

/// Transition requested from a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("{op} not allowed in state {}", .state.name())]
pub struct SequenceError {
    /// Operation that was refused.
    pub op: &'static str,
    /// State the panel was in.
    pub state: PanelState,
}

/// Requested mode, refresh rate or clock not in the declared capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnsupportedModeError {
    /// Mode index outside the declared list.
    #[error("mode index {0} not declared")]
    Index(usize),
    /// Refresh rate outside the DFPS list, or DFPS unsupported.
    #[error("refresh rate {0} Hz not declared")]
    RefreshRate(u32),
    /// Bit clock outside the dynamic clock list, or dynamic clock unsupported.
    #[error("bit clock {0} Hz not declared")]
    BitClock(u64),
    /// Resolution change without dynamic mode switch support.
    #[error("resolution switch not supported")]
    ResolutionSwitch,
    /// Refresh rate change that needs a full modeset.
    #[error("refresh rate change needs a full modeset")]
    NeedsModeset,
    /// DC dimming requested on a panel without a DC threshold.
    #[error("DC dimming not supported")]
    DcDimming,
}

/// Panel description rejected before a panel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No modes, or more than the panel can hold.
    #[error("panel must declare between 1 and {max} modes, found {found}")]
    ModeCount {
        /// Modes declared.
        found: usize,
        /// Upper bound.
        max: usize,
    },
    /// Default mode index outside the mode list.
    #[error("default mode {0} not declared")]
    DefaultMode(usize),
    /// Backlight bounds inconsistent.
    #[error("backlight range invalid")]
    BacklightRange,
    /// A dimming table is not sorted by brightness, or its alpha decreases.
    #[error("dimming table not monotonic")]
    DimmingLut,
    /// Backlight delta magnitude too large.
    #[error("backlight delta {0} out of range")]
    BacklightDelta(i32),
    /// DFPS list empty, or a rate outside `[min, max]`.
    #[error("refresh rate caps invalid")]
    DfpsCaps,
    /// Dynamic clock list empty while supported.
    #[error("dynamic clock caps invalid")]
    DynClkCaps,
    /// ESD check group outside the read length, or mask/value length mismatch.
    #[error("ESD check group {0} invalid")]
    EsdGroup(usize),
    /// Mode timing with zero active area or refresh rate.
    #[error("mode {0} timing invalid")]
    Timing(usize),
    /// DSC slice parameters inconsistent.
    #[error("mode {0} DSC parameters invalid")]
    Dsc(usize),
    /// A control line index out of range.
    #[error("pre-power line {0} invalid")]
    PrePowerLine(u8),
}

/// Any failure surfaced by a panel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelError {
    /// Rail enable / disable failed.
    #[error("power rail failure")]
    Power(#[from] PowerError),
    /// Reset or control line failure.
    #[error("reset sequence failure")]
    Reset(#[from] ResetError),
    /// Command send / read failure.
    #[error("command transport failure")]
    Transport(#[from] TransportError),
    /// Invalid transition.
    #[error("invalid transition")]
    Sequence(#[from] SequenceError),
    /// Mode / rate / clock not declared.
    #[error("unsupported mode")]
    UnsupportedMode(#[from] UnsupportedModeError),
    /// Backlight device failure.
    #[error("backlight device failure")]
    Backlight(#[from] BacklightError),
    /// Invalid panel description.
    #[error("invalid panel configuration")]
    Config(#[from] ConfigError),
    /// ESD checking is not available on this panel.
    #[error("ESD check not available")]
    EsdUnavailable,
}

impl From<GpioError> for PanelError {
    fn from(e: GpioError) -> Self {
        Self::Reset(ResetError::Line(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::GpioLine;
    use std::string::ToString;

    #[test]
    fn test_sequence_error_names_op_and_state() {
        let e = SequenceError {
            op: "enable",
            state: PanelState::Off,
        };
        assert_eq!(e.to_string(), "enable not allowed in state off");
    }

    #[test]
    fn test_gpio_error_lands_in_reset() {
        let e: PanelError = GpioError::Write(GpioLine::Reset).into();
        assert_eq!(
            e,
            PanelError::Reset(ResetError::Line(GpioError::Write(GpioLine::Reset)))
        );
    }

    #[test]
    fn test_reset_step_message() {
        let e = ResetError::Step {
            step: 2,
            cause: GpioError::Write(GpioLine::Reset),
        };
        assert_eq!(e.to_string(), "reset step 2 failed");
    }
}
