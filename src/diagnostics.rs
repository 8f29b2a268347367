//! Restart logging and runtime diagnostics.
//!
//! Stores up to 4 restart records in an NVS ring buffer under the
//! "restart" namespace, so the reason for the previous restart is visible
//! on the next boot.  A custom panic hook turns a panic in any task into a
//! controlled restart.
//!
//! Session statistics and GET CHALLENGE timing are kept in memory and
//! reported through the log.

use core::fmt;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::restart::RestartReason;
use crate::signals::SharedSignals;

const RESTART_RING_SLOTS: usize = 4;
const RESTART_NAMESPACE: &str = "restart";
const RESTART_INDEX_KEY: &str = "restart_idx";

// ───────────────────────────────────────────────────────────────
// Restart log
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRecord {
    pub uptime_ms: u64,
    pub reason: RestartReason,
}

impl fmt::Display for RestartRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} ms", self.reason, self.uptime_ms)
    }
}

/// NVS-backed ring buffer for restart records.
#[derive(Default)]
pub struct RestartLog {
    write_index: usize,
}

impl RestartLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from NVS, or default to 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(RESTART_NAMESPACE, RESTART_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % RESTART_RING_SLOTS;
        }
    }

    /// Write a record to the next ring slot and advance the index.
    pub fn record(&mut self, nvs: &mut dyn StoragePort, record: &RestartRecord) {
        let slot_key = Self::slot_key(self.write_index);
        match postcard::to_allocvec(record) {
            Ok(bytes) => {
                if let Err(e) = nvs.write(RESTART_NAMESPACE, &slot_key, &bytes) {
                    warn!("DIAG: restart record not persisted: {}", e);
                }
            }
            Err(_) => warn!("DIAG: restart record not encodable"),
        }

        self.write_index = (self.write_index + 1) % RESTART_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = nvs.write(RESTART_NAMESPACE, RESTART_INDEX_KEY, &idx_bytes);
    }

    /// All stored records, oldest first.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> heapless::Vec<RestartRecord, RESTART_RING_SLOTS> {
        let mut records = heapless::Vec::new();
        for offset in 0..RESTART_RING_SLOTS {
            let slot = (self.write_index + offset) % RESTART_RING_SLOTS;
            if let Some(record) = Self::read_slot(nvs, slot) {
                let _ = records.push(record);
            }
        }
        records
    }

    /// The most recent record, i.e. why the device last restarted.
    pub fn latest(&self, nvs: &dyn StoragePort) -> Option<RestartRecord> {
        let slot = (self.write_index + RESTART_RING_SLOTS - 1) % RESTART_RING_SLOTS;
        Self::read_slot(nvs, slot)
    }

    pub fn clear(&mut self, nvs: &mut dyn StoragePort) {
        for i in 0..RESTART_RING_SLOTS {
            let _ = nvs.delete(RESTART_NAMESPACE, &Self::slot_key(i));
        }
        let _ = nvs.delete(RESTART_NAMESPACE, RESTART_INDEX_KEY);
        self.write_index = 0;
    }

    fn read_slot(nvs: &dyn StoragePort, slot: usize) -> Option<RestartRecord> {
        let mut buf = [0u8; 32];
        let len = nvs.read(RESTART_NAMESPACE, &Self::slot_key(slot), &mut buf).ok()?;
        postcard::from_bytes::<RestartRecord>(&buf[..len]).ok()
    }

    fn slot_key(index: usize) -> heapless::String<16> {
        let mut s = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut s, format_args!("r{}", index));
        s
    }
}

// ───────────────────────────────────────────────────────────────
// Session statistics
// ───────────────────────────────────────────────────────────────

/// Counters kept by the session loop for the life of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub served: u32,
    pub lockouts: u32,
    pub consecutive_lockouts: u32,
    pub connect_failures: u32,
    pub write_failures: u32,
    pub empty_exchanges: u32,
}

impl SessionStats {
    pub fn record_served(&mut self) {
        self.served = self.served.wrapping_add(1);
    }

    pub fn record_confirmed(&mut self) {
        self.consecutive_lockouts = 0;
    }

    /// Returns the running count of back-to-back lockouts.
    pub fn record_lockout(&mut self) -> u32 {
        self.lockouts = self.lockouts.wrapping_add(1);
        self.consecutive_lockouts = self.consecutive_lockouts.saturating_add(1);
        self.consecutive_lockouts
    }
}

/// Running average of GET CHALLENGE processing time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeTiming {
    pub count: u32,
    pub total_ms: u64,
}

impl ChallengeTiming {
    pub fn record(&mut self, elapsed_ms: u64) {
        self.count = self.count.saturating_add(1);
        self.total_ms = self.total_ms.saturating_add(elapsed_ms);
        debug!(
            "TIMING: GET CHALLENGE {} ms (avg {} ms over {})",
            elapsed_ms,
            self.average_ms(),
            self.count
        );
    }

    pub fn average_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ms / u64::from(self.count)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook: a panicking task requests a controlled restart
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that hands a [`RestartReason::TaskPanic`] to the
/// coordinator.
///
/// Must be called once during init, before tasks are spawned.
pub fn install_panic_hook(signals: &'static SharedSignals) {
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        let thread = std::thread::current();
        error!(
            "PANIC in '{}': {}",
            thread.name().unwrap_or("?"),
            reason
        );
        signals.restart.request(RestartReason::TaskPanic);
    }));
}
