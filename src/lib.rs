//! NetKey firmware library.
//!
//! Exposes the control core (connectivity, confirmation gate, session
//! loop, provisioning, coordinator) and its adapters for integration
//! testing.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod apdu;
pub mod app;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod diagnostics;
pub mod gate;
pub mod indicator;
pub mod pins;
pub mod provisioning;
pub mod restart;
pub mod session;
pub mod signals;

mod error;
pub use error::{Error, Result};

pub mod adapters;
pub mod drivers;
