//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Session · Gate · Lifecycle · Connectivity
//! ```
//!
//! Driven adapters (storage, radio, sockets, LEDs, the security engine)
//! implement these traits.  The domain modules consume them via generics,
//! so the core never touches hardware directly and every flow can be driven
//! from host tests with mock adapters.

use core::fmt;
use std::net::SocketAddrV4;

use crate::apdu::{Command, Response};
use crate::config::{CandidateNetwork, DeviceConfig};

// ───────────────────────────────────────────────────────────────
// Storage port (provisioning store, restart log, token secrets)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (NVS on the device).
///
/// # Security
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic; no partial writes on power loss.
/// - A missing key MUST be reported as [`StorageError::NotFound`] and never
///   folded into [`StorageError::IoError`]; the provisioning lifecycle
///   treats the two very differently.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Durable file volume (FAT on SPI flash) used by the security engine.
pub trait VolumePort {
    fn mount(&mut self) -> Result<(), VolumeError>;

    /// Flush and release the volume.  Called before every restart.
    fn unmount(&mut self) -> Result<(), VolumeError>;

    fn is_mounted(&self) -> bool;
}

/// Loads and persists device configuration.
///
/// Implementations MUST validate before persisting.
pub trait ConfigPort {
    /// Returns [`DeviceConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Security engine ports (external command processing)
// ───────────────────────────────────────────────────────────────

/// Turns received bytes into a structured [`Command`].
///
/// Parsing never fails: anything that is not a usable command comes back
/// with the `INS == 0x00` sentinel, which ends the exchange.
pub trait CommandParser {
    fn parse(&self, raw: &[u8]) -> Command {
        crate::apdu::parser::parse(raw)
    }
}

/// Performs the security operation a command asks for.
pub trait CommandProcessor {
    /// Fill `response` (data followed by the status word).
    fn process(&mut self, command: &Command, response: &mut Response);

    /// Drop any verified-PIN state and session-bound secrets.
    fn invalidate(&mut self);
}

/// First-run provisioning and subsequent-boot restore of engine state.
pub trait Provisioner {
    fn initialize(&mut self) -> Result<(), ProvisionError>;
    fn restore(&mut self) -> Result<(), ProvisionError>;
}

// ───────────────────────────────────────────────────────────────
// Network ports
// ───────────────────────────────────────────────────────────────

/// WiFi station control.  Completion is reported asynchronously as
/// [`LinkEvent`](crate::connectivity::LinkEvent)s, never as return values.
pub trait StationPort {
    /// Load the credentials of `network` into the station driver.
    fn apply(&mut self, network: &CandidateNetwork) -> Result<(), StationError>;

    /// Start an association attempt with the applied credentials.
    fn connect(&mut self) -> Result<(), StationError>;
}

/// Opens outbound connections to the peer.
pub trait Dialer {
    type Conn: Connection;

    /// `DialError::Allocate` means no local socket could be created;
    /// `DialError::Connect` means the peer could not be reached.
    fn dial(&mut self, peer: SocketAddrV4) -> Result<Self::Conn, DialError>;
}

/// A single established byte stream to the peer.
pub trait Connection {
    /// One read into `buf`.  Returns the number of bytes received (0 on EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn close(self);
}

// ───────────────────────────────────────────────────────────────
// Board ports (LEDs, time, reset)
// ───────────────────────────────────────────────────────────────

/// The two indicator LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    /// Busy / provisioning / confirmation prompt.
    Activity,
    /// Network search (blinking) / connected (steady) / confirmation prompt.
    Link,
}

/// Indicator outputs.  Shared between tasks, so `&self`.
pub trait IndicatorPort {
    fn set(&self, led: Led, on: bool);
}

/// Monotonic time and task-yielding delays.
pub trait ClockPort {
    /// Suspend the calling task for `ms` milliseconds.
    fn delay_ms(&self, ms: u32);

    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;
}

/// Whole-device restart.
pub trait SystemPort {
    fn restart(&self) -> !;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`VolumePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeError {
    MountFailed(i32),
    UnmountFailed(i32),
    NotMounted,
}

/// Errors from [`Provisioner`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionError {
    /// Backing storage failed.
    Storage(StorageError),
    /// Restore found no state to load.
    MissingState,
    /// Stored state is unreadable.
    Corrupted,
}

/// Errors from [`StationPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationError {
    /// The driver rejected the credentials.
    InvalidConfig(i32),
    /// The driver refused to start an association attempt.
    ConnectFailed(i32),
}

/// Errors from [`Dialer::dial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialError {
    /// No local socket could be allocated.
    Allocate,
    /// The peer refused or could not be reached.
    Connect,
}

/// Errors on an established [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Io,
    Closed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for VolumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MountFailed(rc) => write!(f, "volume mount failed (rc={})", rc),
            Self::UnmountFailed(rc) => write!(f, "volume unmount failed (rc={})", rc),
            Self::NotMounted => write!(f, "volume not mounted"),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {}", e),
            Self::MissingState => write!(f, "no stored state"),
            Self::Corrupted => write!(f, "stored state corrupted"),
        }
    }
}

impl From<StorageError> for ProvisionError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(rc) => write!(f, "station rejected config (rc={})", rc),
            Self::ConnectFailed(rc) => write!(f, "station connect failed (rc={})", rc),
        }
    }
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocate => write!(f, "failed to allocate socket"),
            Self::Connect => write!(f, "peer unreachable"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "socket I/O error"),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}
