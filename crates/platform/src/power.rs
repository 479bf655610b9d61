//! Regulator rail abstraction
//!
//! Rails are addressed by their position in the panel's power configuration.
//! Ordering, delays and rollback live in the panel sequencer; this trait only
//! switches one rail at a time.

/// Index of a rail in the panel's power configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RailId(pub u8);

impl RailId {
    /// Position in the configured rail list.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for RailId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Regulator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// Regulator refused to switch (over-current, fault).
    #[error("regulator for rail {0} failed to switch")]
    Regulator(RailId),
    /// Voltage or load setting rejected.
    #[error("rail {0} rejected voltage or load setting")]
    InvalidSetting(RailId),
    /// Rail not known to the power driver.
    #[error("rail {0} is not known to the power driver")]
    UnknownRail(RailId),
}

impl PowerError {
    /// Rail that caused the error.
    pub const fn rail(self) -> RailId {
        match self {
            Self::Regulator(r) | Self::InvalidSetting(r) | Self::UnknownRail(r) => r,
        }
    }
}

/// Panel power rails.
///
/// `enable` is expected to apply the rail's voltage and load settings
/// before switching it on.
pub trait PowerRails {
    /// Switch a rail on.
    async fn enable(&mut self, rail: RailId) -> Result<(), PowerError>;

    /// Switch a rail off.
    async fn disable(&mut self, rail: RailId) -> Result<(), PowerError>;
}
