//! Controlled restart: the universal recovery path for fatal conditions.
//!
//! ```text
//!   any task ──request(reason)──▶ RestartRequest ──▶ coordinator
//!                                                     │ countdown (fatal only)
//!                                                     │ unmount volume
//!                                                     ▼
//!                                               SystemPort::restart()
//! ```
//!
//! The restart is a fresh process start: nothing volatile survives it, so
//! connectivity state and any pending confirmation are rebuilt from scratch
//! on the next boot.

use core::fmt;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ClockPort, SystemPort, VolumePort};

/// Why the device is restarting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartReason {
    /// The durable file volume could not be mounted at boot.
    VolumeMount,
    /// The key-value store could not be initialised or read.
    StorageInit,
    /// GPIO or the button ISR service could not be set up.
    PeripheralInit,
    /// The provisioning lifecycle reached `Failed`.
    ProvisioningFailed,
    /// No local socket could be allocated.
    SocketAllocation,
    /// The WiFi station driver rejected a request.
    StationDriver,
    /// A task panicked.
    TaskPanic,
    /// The operator pressed the hard-reset button.
    HardReset,
}

impl RestartReason {
    /// Fatal restarts get the visible countdown; an operator-requested hard
    /// reset restarts immediately.
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::HardReset)
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VolumeMount => write!(f, "volume mount failed"),
            Self::StorageInit => write!(f, "storage init failed"),
            Self::PeripheralInit => write!(f, "peripheral init failed"),
            Self::ProvisioningFailed => write!(f, "provisioning failed"),
            Self::SocketAllocation => write!(f, "socket allocation failed"),
            Self::StationDriver => write!(f, "station driver error"),
            Self::TaskPanic => write!(f, "task panic"),
            Self::HardReset => write!(f, "hard reset"),
        }
    }
}

/// Everything up to the restart itself: countdown, then release the volume.
///
/// Separated from [`perform`] so the sequence can be observed on the host.
pub fn prepare<V, C>(reason: RestartReason, countdown_secs: u32, volume: &mut V, clock: &C)
where
    V: VolumePort,
    C: ClockPort,
{
    if reason.is_fatal() {
        error!("RESTART | {}", reason);
        for remaining in (1..=countdown_secs).rev() {
            info!("RESTART | restarting in {} seconds", remaining);
            clock.delay_ms(1_000);
        }
    } else {
        info!("RESTART | {}", reason);
    }

    if volume.is_mounted() {
        if let Err(e) = volume.unmount() {
            warn!("RESTART | {}", e);
        }
    }
}

/// Run the full controlled-restart sequence.  Never returns.
pub fn perform<V, C, S>(
    reason: RestartReason,
    countdown_secs: u32,
    volume: &mut V,
    clock: &C,
    system: &S,
) -> !
where
    V: VolumePort,
    C: ClockPort,
    S: SystemPort,
{
    prepare(reason, countdown_secs, volume, clock);
    info!("RESTART | restarting now");
    system.restart()
}
