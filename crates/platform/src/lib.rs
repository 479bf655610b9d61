//! Hardware collaborator layer for DSI panel control
//!
//! The panel core never touches registers, regulators or pins directly. It
//! talks to four narrow collaborators, each defined here as a trait so the
//! core can be driven by real hardware or by the recording mocks in host
//! tests.
//!
//! # Architecture Layers
//!
//! ```text
//! Display framework (prepare / enable / disable / unprepare calls)
//!         ↓
//! Panel core (panel crate - lifecycle, backlight, ESD, modes)
//!         ↓
//! Collaborators (this crate - trait abstractions)
//!         ↓
//! DSI host, regulator, GPIO and PWM drivers
//! ```
//!
//! # Collaborators
//!
//! - [`CommandChannel`] - send a named command set, read back a response
//! - [`PowerRails`] - enable / disable regulator rails
//! - [`GpioBank`] - drive reset, enable and mode-select lines, pin-control
//! - [`BacklightDevice`] - PWM / WLED brightness output
//!
//! # Features
//!
//! - `std`: recording mocks ([`mocks`]) and `std::error::Error` impls
//! - `serde`: derive `Serialize` / `Deserialize` on command sets
//! - `defmt`: derive `defmt::Format` on enums

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)] // register and signal names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod backlight;
pub mod channel;
pub mod gpio;
pub mod mocks;
pub mod power;

pub use backlight::{BacklightDevice, BacklightError, NoBacklightDevice, PwmBacklight};
pub use channel::{
    CommandChannel, CommandSet, CommandSetKind, DsiCommand, LinkMode, ReadBuf, TransportError,
};
pub use gpio::{GpioBank, GpioError, GpioLine, PinBank, PinctrlState};
pub use power::{PowerError, PowerRails, RailId};
