//! Unified error types for the NetKey firmware.
//!
//! A single `Error` enum that every port error converts into, keeping
//! bring-up and the coordinator's error handling uniform.  All variants are
//! `Copy` so they can be handed across tasks and into the restart path
//! without allocation.

use core::fmt;

use crate::app::ports::{
    ConfigError, DialError, ProvisionError, StationError, StorageError, TransportError,
    VolumeError,
};
use crate::drivers::hw_init::HwInitError;
use crate::restart::RestartReason;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Key-value store (NVS) failure.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// The durable file volume could not be mounted or released.
    Volume(VolumeError),
    /// First-run initialize or restore failed.
    Provision(ProvisionError),
    /// WiFi station driver failure.
    Station(StationError),
    /// Outbound connection could not be opened.
    Dial(DialError),
    /// Established connection failed.
    Transport(TransportError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl Error {
    /// The controlled-restart reason recorded when this error is fatal.
    ///
    /// Returns `None` for session-level errors that are recovered in place.
    pub fn restart_reason(&self) -> Option<RestartReason> {
        match self {
            Self::Volume(_) => Some(RestartReason::VolumeMount),
            Self::Storage(_) | Self::Config(_) => Some(RestartReason::StorageInit),
            Self::Init(_) => Some(RestartReason::PeripheralInit),
            Self::Provision(_) => Some(RestartReason::ProvisioningFailed),
            Self::Station(_) => Some(RestartReason::StationDriver),
            Self::Dial(DialError::Allocate) => Some(RestartReason::SocketAllocation),
            Self::Dial(DialError::Connect) | Self::Transport(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Volume(e) => write!(f, "volume: {e}"),
            Self::Provision(e) => write!(f, "provisioning: {e}"),
            Self::Station(e) => write!(f, "station: {e}"),
            Self::Dial(e) => write!(f, "dial: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Port error conversions
// ---------------------------------------------------------------------------

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<VolumeError> for Error {
    fn from(e: VolumeError) -> Self {
        Self::Volume(e)
    }
}

impl From<ProvisionError> for Error {
    fn from(e: ProvisionError) -> Self {
        Self::Provision(e)
    }
}

impl From<StationError> for Error {
    fn from(e: StationError) -> Self {
        Self::Station(e)
    }
}

impl From<DialError> for Error {
    fn from(e: DialError) -> Self {
        Self::Dial(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<HwInitError> for Error {
    fn from(e: HwInitError) -> Self {
        match e {
            HwInitError::GpioConfigFailed(_) => Self::Init("GPIO config failed"),
            HwInitError::IsrInstallFailed(_) => Self::Init("GPIO ISR service install failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
