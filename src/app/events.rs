//! Outbound application events.
//!
//! The domain modules emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, count them, record
//! them for tests.

use crate::provisioning::LifecycleState;
use crate::restart::RestartReason;

/// Structured events emitted by the control core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// An association attempt was started on candidate `index`.
    LinkAttempt { index: usize },

    /// The station acquired an address on candidate `index`.
    LinkUp { index: usize },

    /// The link was lost; `reason` is the driver's disconnect code.
    LinkDown { reason: u16 },

    /// The provisioning lifecycle moved between states.
    Lifecycle { from: LifecycleState, to: LifecycleState },

    /// The peer could not be reached; retrying after `backoff_ms`.
    PeerUnreachable { backoff_ms: u32 },

    /// The peer sent nothing to process.
    ExchangeEmpty,

    /// A sensitive command is waiting for physical confirmation.
    ConfirmationPending { ins: u8 },

    /// The operator confirmed after `waited_ms`.
    Confirmed { ins: u8, waited_ms: u64 },

    /// No confirmation before the deadline; lockout response sent.
    LockedOut { ins: u8, consecutive: u32 },

    /// A command was processed and its response written.
    Served { ins: u8, sw: u16, len: usize, elapsed_ms: u64 },

    /// The response could not be written; session aborted.
    WriteFailed { ins: u8 },

    /// The hard-reset button was observed.
    HardResetRequested,

    /// A controlled restart was requested.
    RestartRequested(RestartReason),
}
