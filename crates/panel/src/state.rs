//! Panel lifecycle states and the transitions between them.
//!
//! ```text
//! Off → PrePrepared → Prepared → Enabled → PostEnabled → PreDisabled → Disabled → Unprepared → Off
//!                         ↕           ↕
//!                   LowPower1 ↔ LowPower2
//! ```
//!
//! [`Transition::check`] is the single source of truth for which state a
//! transition may start from and where it lands. The lifecycle consults it
//! before touching hardware, so a refused transition has no side effect.

use crate::error::SequenceError;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PanelState {
    /// Unpowered.
    #[default]
    Off,
    /// Pre-power lines up, rails still off.
    PrePrepared,
    /// Rails on, reset done, display off.
    Prepared,
    /// Doze (always-on display).
    LowPower1,
    /// Doze-suspend.
    LowPower2,
    /// Display on.
    Enabled,
    /// Display on, post-on tuning sent.
    PostEnabled,
    /// About to switch the display off.
    PreDisabled,
    /// Display off, rails still on.
    Disabled,
    /// Rails off.
    Unprepared,
}

impl PanelState {
    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::PrePrepared => "pre-prepared",
            Self::Prepared => "prepared",
            Self::LowPower1 => "lp1",
            Self::LowPower2 => "lp2",
            Self::Enabled => "enabled",
            Self::PostEnabled => "post-enabled",
            Self::PreDisabled => "pre-disabled",
            Self::Disabled => "disabled",
            Self::Unprepared => "unprepared",
        }
    }

    /// Display is on (doze excluded).
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::PostEnabled)
    }

    /// Doze sub-state.
    pub const fn is_low_power(self) -> bool {
        matches!(self, Self::LowPower1 | Self::LowPower2)
    }

    /// Rails are on.
    pub const fn is_powered(self) -> bool {
        !matches!(self, Self::Off | Self::PrePrepared | Self::Unprepared)
    }

    /// The backlight may be written to hardware.
    pub const fn drives_backlight(self) -> bool {
        matches!(self, Self::Prepared | Self::Enabled | Self::PostEnabled)
    }
}

/// Exposed lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// Pre-power enables.
    PrePrepare,
    /// Rails, reset, LP11 init, mode select.
    Prepare,
    /// Display on.
    Enable,
    /// Post-on tuning.
    PostEnable,
    /// Enter doze.
    SetLp1,
    /// Enter doze-suspend.
    SetLp2,
    /// Leave doze.
    SetNolp,
    /// Before display off.
    PreDisable,
    /// Display off.
    Disable,
    /// Rails off.
    Unprepare,
    /// Pre-power lines off.
    PostUnprepare,
    /// Mode switch.
    Switch,
    /// After mode switch.
    PostSwitch,
}

/// Result of a transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the transition, landing in the given state.
    Run(PanelState),
    /// Already there; succeed without hardware access.
    Noop,
}

impl Transition {
    /// Operation name for logs and errors.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PrePrepare => "pre_prepare",
            Self::Prepare => "prepare",
            Self::Enable => "enable",
            Self::PostEnable => "post_enable",
            Self::SetLp1 => "set_lp1",
            Self::SetLp2 => "set_lp2",
            Self::SetNolp => "set_nolp",
            Self::PreDisable => "pre_disable",
            Self::Disable => "disable",
            Self::Unprepare => "unprepare",
            Self::PostUnprepare => "post_unprepare",
            Self::Switch => "switch",
            Self::PostSwitch => "post_switch",
        }
    }

    /// Decide whether this transition may start from `from`.
    ///
    /// `SetNolp` and the mode switch transitions do not change state; their
    /// target is `from` itself (for `SetNolp`, the caller substitutes the
    /// state the panel was in before dozing).
    pub fn check(self, from: PanelState) -> Result<Step, SequenceError> {
        use PanelState as S;

        let to = match (self, from) {
            (Self::PrePrepare, S::Off) => S::PrePrepared,
            (Self::Prepare, S::PrePrepared) => S::Prepared,
            (Self::Enable, S::Enabled | S::PostEnabled) => return Ok(Step::Noop),
            (Self::Enable, S::Prepared | S::LowPower1 | S::LowPower2) => S::Enabled,
            (Self::PostEnable, S::Enabled) => S::PostEnabled,
            (Self::SetLp1, S::Prepared | S::Enabled | S::PostEnabled | S::LowPower2) => {
                S::LowPower1
            }
            (Self::SetLp2, S::Prepared | S::Enabled | S::PostEnabled | S::LowPower1) => {
                S::LowPower2
            }
            (Self::SetNolp, S::LowPower1 | S::LowPower2) => from,
            (Self::PreDisable, S::Enabled | S::PostEnabled | S::LowPower1 | S::LowPower2) => {
                S::PreDisabled
            }
            (
                Self::Disable,
                S::PreDisabled | S::Enabled | S::PostEnabled | S::LowPower1 | S::LowPower2,
            ) => S::Disabled,
            (Self::Unprepare, S::Disabled | S::Prepared) => S::Unprepared,
            (Self::PostUnprepare, S::Unprepared) => S::Off,
            (Self::Switch | Self::PostSwitch, s) if s.is_powered() => s,
            _ => {
                return Err(SequenceError {
                    op: self.name(),
                    state: from,
                })
            }
        };
        Ok(Step::Run(to))
    }
}
