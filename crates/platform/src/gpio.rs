//! Panel control lines
//!
//! Reset, display-enable, mode-select and the optional pre-power (exd)
//! lines. Each line is optional per panel; writing a line that is not wired
//! is an error the sequencer never triggers because it consults the config
//! first.

use embedded_hal::digital::OutputPin;
use heapless::Vec;

/// Logical control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GpioLine {
    /// Panel reset.
    Reset,
    /// Display enable.
    DisplayEnable,
    /// Mode select (single / dual port panels).
    ModeSelect,
    /// External pre-power line, by index.
    PrePower(u8),
}

/// Pin-control state of the panel's pad group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinctrlState {
    /// Pads configured for normal operation.
    Active,
    /// Pads parked for power-off.
    Suspend,
}

/// GPIO errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioError {
    /// The line has no pin assigned.
    #[error("control line has no pin assigned")]
    Unassigned(GpioLine),
    /// Writing the pin failed.
    #[error("failed to drive control line")]
    Write(GpioLine),
    /// Pin-control state could not be selected.
    #[error("failed to select pin-control state")]
    Pinctrl,
}

/// Panel control lines.
pub trait GpioBank {
    /// Drive `line` high (`true`) or low (`false`).
    fn set_level(&mut self, line: GpioLine, high: bool) -> Result<(), GpioError>;

    /// Select the pad pin-control state. Boards without pin-control keep the default.
    fn select_pinctrl(&mut self, state: PinctrlState) -> Result<(), GpioError> {
        let _ = state;
        Ok(())
    }
}

/// [`GpioBank`] over plain `embedded-hal` output pins.
///
/// `N` is the number of wired lines.
pub struct PinBank<P, const N: usize> {
    pins: Vec<(GpioLine, P), N>,
}

impl<P: OutputPin, const N: usize> PinBank<P, N> {
    /// Create an empty bank.
    pub const fn new() -> Self {
        Self { pins: Vec::new() }
    }

    /// Wire `pin` to `line`.
    ///
    /// Returns the pin back if the bank is full.
    pub fn with_pin(mut self, line: GpioLine, pin: P) -> Result<Self, P> {
        self.pins.push((line, pin)).map_err(|(_, p)| p)?;
        Ok(self)
    }

    /// Returns `true` if `line` has a pin.
    pub fn has_line(&self, line: GpioLine) -> bool {
        self.pins.iter().any(|(l, _)| *l == line)
    }
}

impl<P: OutputPin, const N: usize> Default for PinBank<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: OutputPin, const N: usize> GpioBank for PinBank<P, N> {
    fn set_level(&mut self, line: GpioLine, high: bool) -> Result<(), GpioError> {
        let (_, pin) = self
            .pins
            .iter_mut()
            .find(|(l, _)| *l == line)
            .ok_or(GpioError::Unassigned(line))?;
        if high {
            pin.set_high()
        } else {
            pin.set_low()
        }
        .map_err(|_| GpioError::Write(line))
    }
}
