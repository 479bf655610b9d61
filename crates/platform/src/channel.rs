//! DSI command channel abstraction
//!
//! A command set is an ordered, named list of opaque command packets. The
//! channel owns the wire encoding; this layer only cares about which set is
//! sent, in which order, and whether the transfer succeeded.

use heapless::Vec;

/// Largest single command payload in bytes.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Largest number of commands in one set.
pub const MAX_COMMANDS_PER_SET: usize = 8;

/// Largest read-back response in bytes.
pub const MAX_READ_LEN: usize = 32;

/// Read-back response buffer.
pub type ReadBuf = Vec<u8, MAX_READ_LEN>;

/// Every command set the panel core can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandSetKind {
    /// LP11 initialisation, sent during `prepare` on panels that need it.
    Lp11Init,
    /// Display on.
    On,
    /// Tuning sent after the panel is on.
    PostOn,
    /// Sent before the panel is switched off.
    PreOff,
    /// Display off.
    Off,
    /// Enter doze (low power 1).
    Lp1,
    /// Enter doze-suspend (low power 2).
    Lp2,
    /// Leave doze.
    Nolp,
    /// Doze with high brightness.
    DozeHbm,
    /// Doze with low brightness.
    DozeLbm,
    /// Timing switch to the destination mode.
    TimingSwitch,
    /// Sent after a timing switch completed.
    PostTimingSwitch,
    /// Fingerprint high-brightness overlay on.
    HbmFodOn,
    /// Fingerprint high-brightness overlay off.
    HbmFodOff,
    /// Panel-on dimming, sent by the deferred ramp.
    DimmingOn,
    /// CRC / P3 gamut calibration.
    CrcP3Gamut,
    /// Read of the ELVSS dimming register.
    ElvssDimmingRead,
    /// ELVSS dimming offset write.
    ElvssDimmingOffset,
    /// ESD status query.
    EsdStatus,
    /// Backlight level write (DCS backlights, built at runtime).
    Brightness,
}

impl CommandSetKind {
    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lp11Init => "lp11-init",
            Self::On => "on",
            Self::PostOn => "post-on",
            Self::PreOff => "pre-off",
            Self::Off => "off",
            Self::Lp1 => "lp1",
            Self::Lp2 => "lp2",
            Self::Nolp => "nolp",
            Self::DozeHbm => "doze-hbm",
            Self::DozeLbm => "doze-lbm",
            Self::TimingSwitch => "timing-switch",
            Self::PostTimingSwitch => "post-timing-switch",
            Self::HbmFodOn => "hbm-fod-on",
            Self::HbmFodOff => "hbm-fod-off",
            Self::DimmingOn => "dimming-on",
            Self::CrcP3Gamut => "crc-p3-gamut",
            Self::ElvssDimmingRead => "elvss-dimming-read",
            Self::ElvssDimmingOffset => "elvss-dimming-offset",
            Self::EsdStatus => "esd-status",
            Self::Brightness => "brightness",
        }
    }
}

/// Link state a command set is transmitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkMode {
    /// Low-power escape mode.
    #[default]
    LowPower,
    /// High-speed mode.
    HighSpeed,
}

/// One opaque command packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DsiCommand {
    /// Encoded packet bytes (opaque to the core).
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Wait after this packet, in milliseconds.
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_wait_ms: u32,
}

impl DsiCommand {
    /// Build a command from a byte slice.
    ///
    /// Returns `None` if `bytes` exceeds [`MAX_PAYLOAD_LEN`].
    pub fn from_bytes(bytes: &[u8], post_wait_ms: u32) -> Option<Self> {
        Vec::from_slice(bytes).ok().map(|payload| Self {
            payload,
            post_wait_ms,
        })
    }
}

/// A named, ordered set of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandSet {
    /// Which set this is.
    pub kind: CommandSetKind,
    /// Link state for the whole set.
    #[cfg_attr(feature = "serde", serde(default))]
    pub link: LinkMode,
    /// Commands, sent in order.
    pub commands: Vec<DsiCommand, MAX_COMMANDS_PER_SET>,
}

impl CommandSet {
    /// Create an empty set of the given kind.
    pub fn new(kind: CommandSetKind) -> Self {
        Self {
            kind,
            link: LinkMode::LowPower,
            commands: Vec::new(),
        }
    }

    /// Builder helper: append a command.
    ///
    /// Returns `None` if the payload or the set is full.
    pub fn with_command(mut self, bytes: &[u8], post_wait_ms: u32) -> Option<Self> {
        let cmd = DsiCommand::from_bytes(bytes, post_wait_ms)?;
        self.commands.push(cmd).ok()?;
        Some(self)
    }

    /// Returns `true` if the set carries no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Command transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Host controller rejected or failed the transfer.
    #[error("DSI transfer failed")]
    Communication,
    /// No acknowledge / response within the transfer timeout.
    #[error("DSI transfer timed out")]
    Timeout,
    /// Response shorter than requested.
    #[error("DSI read returned fewer bytes than requested")]
    ShortRead,
    /// The transport cannot perform this operation.
    #[error("operation not supported by the DSI transport")]
    Unsupported,
}

/// DSI command channel.
///
/// Implemented by the DSI host driver. All methods are awaited while the
/// panel lock is held, so an implementation must not call back into the panel.
pub trait CommandChannel {
    /// Send every command of `set`, in order.
    async fn send(&mut self, set: &CommandSet) -> Result<(), TransportError>;

    /// Send `set` and read back `len` response bytes.
    async fn send_and_read(&mut self, set: &CommandSet, len: usize)
        -> Result<ReadBuf, TransportError>;

    /// Run a software bus-turn-around and report whether the panel answered.
    async fn bus_turnaround(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Wait for the panel's tearing-effect (vsync) signal.
    async fn wait_te(&mut self, timeout_ms: u32) -> Result<(), TransportError> {
        let _ = timeout_ms;
        Err(TransportError::Unsupported)
    }

    /// Select the link used for subsequent commands, returning the previous one.
    ///
    /// Used by the ESD query to move onto the command link for a single check.
    async fn select_link(&mut self, link: LinkMode) -> Result<LinkMode, TransportError> {
        Ok(link)
    }
}
