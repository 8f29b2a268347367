//! System configuration parameters
//!
//! All tunable parameters for the NetKey device: the prioritised candidate
//! network list, the peer port, and the timing policy of every periodic or
//! bounded wait.  Values come from NVS (postcard blob) on the device, or
//! from a JSON file on the development host.

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Upper bound on the candidate network list.
pub const MAX_NETWORKS: usize = 8;

/// Well-known TCP port of the peer.
pub const DEFAULT_PEER_PORT: u16 = 5511;

// ---------------------------------------------------------------------------
// Candidate networks
// ---------------------------------------------------------------------------

/// One entry of the failover list.  List order is failover priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNetwork {
    /// Network name (SSID).
    pub ssid: heapless::String<32>,
    /// WPA2 passphrase, empty for an open network.
    pub password: heapless::String<64>,
    /// IPv4 address of the peer reachable through this network.
    pub peer: [u8; 4],
}

impl CandidateNetwork {
    pub fn new(ssid: &str, password: &str, peer: [u8; 4]) -> Result<Self, ConfigError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut net = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            peer,
        };
        net.ssid
            .push_str(ssid)
            .map_err(|_| ConfigError::ValidationFailed("ssid longer than 32 bytes"))?;
        net.password
            .push_str(password)
            .map_err(|_| ConfigError::ValidationFailed("password longer than 64 bytes"))?;
        Ok(net)
    }

    pub fn peer_addr(&self, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.peer), port)
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Confirmation policy
// ---------------------------------------------------------------------------

/// Bounded wait of the confirmation gate: `iterations` prompt pulses of
/// `2 × half_period_ms` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPolicy {
    pub iterations: u32,
    pub half_period_ms: u32,
}

impl ConfirmPolicy {
    /// Total wait before lockout.
    pub const fn deadline_ms(&self) -> u64 {
        self.iterations as u64 * 2 * self.half_period_ms as u64
    }
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            iterations: 30,
            half_period_ms: 250, // 30 × 500 ms = 15 s
        }
    }
}

// ---------------------------------------------------------------------------
// Device configuration
// ---------------------------------------------------------------------------

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // --- Network ---
    /// Candidate networks in failover order.
    pub networks: heapless::Vec<CandidateNetwork, MAX_NETWORKS>,
    /// TCP port the peer listens on.
    pub peer_port: u16,

    // --- Confirmation ---
    pub confirm: ConfirmPolicy,
    /// Consecutive lockouts after which a warning is logged.
    pub lockout_warn_threshold: u32,

    // --- Timing ---
    /// Wait after a failed peer connect before retrying the same peer.
    pub connect_backoff_ms: u32,
    /// Hard-reset monitor poll period.
    pub reset_poll_ms: u32,
    /// Link LED toggle period while disconnected.
    pub link_blink_ms: u32,
    /// Cosmetic countdown before a fatal restart.
    pub restart_countdown_secs: u32,

    // --- Provisioning ---
    /// Erase the provisioned key when restore fails, so the next boot
    /// re-initializes instead of failing the same restore forever.
    pub reinit_on_restore_failure: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut networks = heapless::Vec::new();
        if let Ok(net) = CandidateNetwork::new("netkey", "", [192, 168, 4, 2]) {
            let _ = networks.push(net);
        }
        Self {
            networks,
            peer_port: DEFAULT_PEER_PORT,

            confirm: ConfirmPolicy::default(),
            lockout_warn_threshold: 3,

            connect_backoff_ms: 5_000,
            reset_poll_ms: 4_000,
            link_blink_ms: 500,
            restart_countdown_secs: 3,

            reinit_on_restore_failure: true,
        }
    }
}

impl DeviceConfig {
    /// Range-check every field.  Called before persisting and before boot
    /// continues with a loaded configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.networks.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one candidate network is required",
            ));
        }
        for net in &self.networks {
            validate_ssid(&net.ssid)?;
            validate_password(&net.password)?;
        }
        if self.peer_port == 0 {
            return Err(ConfigError::ValidationFailed("peer_port must be non-zero"));
        }
        if self.confirm.iterations == 0 || self.confirm.half_period_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "confirm iterations and half_period_ms must be non-zero",
            ));
        }
        if self.connect_backoff_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "connect_backoff_ms must be non-zero",
            ));
        }
        if self.reset_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed("reset_poll_ms must be non-zero"));
        }
        if self.link_blink_ms == 0 {
            return Err(ConfigError::ValidationFailed("link_blink_ms must be non-zero"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConfigError::ValidationFailed(
            "ssid must be 1-32 printable ASCII bytes",
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConfigError::ValidationFailed(
            "password must be 8-64 bytes for WPA2, or empty for open",
        ));
    }
    Ok(())
}
