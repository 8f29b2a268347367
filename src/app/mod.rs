//! Application boundary: port traits and domain events.
//!
//! The control core (connectivity, gate, session, provisioning) never
//! touches hardware directly.  All interaction happens through **port
//! traits** defined in [`ports`], keeping the core fully testable without
//! real peripherals, and everything observable leaves through
//! [`events::AppEvent`].

pub mod events;
pub mod ports;
