//! DSI panel runtime control
//!
//! Brings a DSI panel from unpowered to displaying and back, keeps its
//! brightness in step with requests, watches it for ESD failures and switches
//! its timing modes, all against the collaborator traits of the `platform`
//! crate.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────── Panel (one lock) ─────────────────┐
//! display framework ──►│ lifecycle ─► sequencer ─► PowerRails / GpioBank   │
//!                      │     │                                             │
//! brightness requests ►│ backlight ─► CommandChannel / BacklightDevice     │
//!                      │ mode manager, telemetry                           │
//!                      └───────▲──────────────────────────▲────────────────┘
//!                              │                          │
//!                  run_recovery / run_esd_*       run_deferred_dimming
//! ```
//!
//! # Modules
//!
//! - [`config`] - panel description and validation
//! - [`state`] - lifecycle states and allowed transitions
//! - [`lifecycle`] - the [`Panel`] itself
//! - [`sequencer`] - rails, reset steps and control lines
//! - [`backlight`] - brightness to level and overlay alpha
//! - [`esd`] - health checks and recovery
//! - [`mode`] - mode list, refresh rate and bit clock changes, DSC parameters
//! - [`telemetry`] - aging counters
//! - [`deferred`] - cancellable panel-on dimming
//!
//! # Features
//!
//! - `defmt`: log through `defmt`, derive `defmt::Format`
//! - `tracing`: log through `tracing` (host tools)
//! - `serde`: read a [`PanelConfig`] from JSON
//! - `std`: `std::error::Error` impls and the platform mocks

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
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

#[macro_use]
mod fmt;

pub mod backlight;
pub mod config;
pub mod deferred;
pub mod error;
pub mod esd;
pub mod lifecycle;
pub mod mode;
pub mod sequencer;
pub mod state;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use backlight::{lookup_alpha, BacklightController, BacklightOutput};
pub use config::PanelConfig;
pub use error::{
    ConfigError, PanelError, ResetError, SequenceError, UnsupportedModeError,
};
pub use esd::EsdVerdict;
pub use lifecycle::{Panel, PanelHardware};
pub use mode::{dsc_pclk_params, DscPclkParams, HostConfig, RefreshPlan};
pub use state::{PanelState, Transition};
pub use telemetry::PanelCounters;
