//! Provisioning lifecycle and the hard-reset path.
//!
//! ```text
//!            read "initialized"
//!   Start ──────────────────────┬── absent ──────▶ Initializing ──ok──▶ Ready
//!                               ├── present (1) ─▶ Restoring ─────ok──▶ Ready
//!                               └── read error ─▶ Failed
//!   Initializing / Restoring ──err──▶ Failed ──▶ controlled restart
//! ```
//!
//! The hard-reset monitor runs beside everything else.  When the reset
//! button has been pressed it erases the provisioned key and requests a
//! restart, so the next boot goes back through Initializing.  It never
//! touches in-memory state; the restart does that.

use core::fmt;

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{
    ClockPort, EventSink, IndicatorPort, Led, ProvisionError, Provisioner, StorageError,
    StoragePort,
};
use crate::restart::RestartReason;
use crate::signals::SharedSignals;

/// NVS namespace of the provisioning store.
pub const PROVISION_NAMESPACE: &str = "storage";
/// Key whose presence marks a provisioned device.
pub const PROVISIONED_KEY: &str = "initialized";

const PROVISIONED: u8 = 1;

// ── Persisted state ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Unprovisioned,
    Provisioned,
}

/// Read the persisted provisioning state.  Only the key's presence
/// counts, whatever it holds; a missing key is `Unprovisioned` and any
/// other storage failure is an error.
pub fn read_state<S: StoragePort + ?Sized>(store: &S) -> Result<ProvisioningState, StorageError> {
    let mut buf = [0u8; 8];
    match store.read(PROVISION_NAMESPACE, PROVISIONED_KEY, &mut buf) {
        Ok(_) => Ok(ProvisioningState::Provisioned),
        Err(StorageError::NotFound) => Ok(ProvisioningState::Unprovisioned),
        Err(e) => Err(e),
    }
}

pub fn mark_provisioned<S: StoragePort + ?Sized>(store: &mut S) -> Result<(), StorageError> {
    store.write(PROVISION_NAMESPACE, PROVISIONED_KEY, &[PROVISIONED])
}

/// Erase the provisioned key.  The next boot re-initializes.
pub fn erase_provisioning<S: StoragePort + ?Sized>(store: &mut S) -> Result<(), StorageError> {
    store.delete(PROVISION_NAMESPACE, PROVISIONED_KEY)
}

// ── Lifecycle ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Start,
    Initializing,
    Restoring,
    Ready,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "Start",
            Self::Initializing => "Initializing",
            Self::Restoring => "Restoring",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

pub struct ProvisioningLifecycle {
    state: LifecycleState,
    trail: heapless::Vec<LifecycleState, 4>,
    reinit_on_restore_failure: bool,
}

impl ProvisioningLifecycle {
    pub fn new(reinit_on_restore_failure: bool) -> Self {
        let mut trail = heapless::Vec::new();
        let _ = trail.push(LifecycleState::Start);
        Self {
            state: LifecycleState::Start,
            trail,
            reinit_on_restore_failure,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state visited this boot, in order.
    pub fn trail(&self) -> &[LifecycleState] {
        &self.trail
    }

    /// Drive the lifecycle from `Start` to `Ready` or `Failed`.
    ///
    /// `Err` always means `Failed`; the caller must restart.
    pub fn run<S, P, I, E>(
        &mut self,
        store: &mut S,
        provisioner: &mut P,
        indicators: &I,
        sink: &mut E,
    ) -> Result<(), ProvisionError>
    where
        S: StoragePort,
        P: Provisioner,
        I: IndicatorPort,
        E: EventSink,
    {
        indicators.set(Led::Activity, true);
        let result = self.decide_and_run(store, provisioner, sink);
        indicators.set(Led::Activity, false);

        match result {
            Ok(()) => self.enter(LifecycleState::Ready, sink),
            Err(e) => {
                error!("PROVISION: {}", e);
                self.enter(LifecycleState::Failed, sink);
            }
        }
        result
    }

    fn decide_and_run<S, P, E>(
        &mut self,
        store: &mut S,
        provisioner: &mut P,
        sink: &mut E,
    ) -> Result<(), ProvisionError>
    where
        S: StoragePort,
        P: Provisioner,
        E: EventSink,
    {
        match read_state(&*store)? {
            ProvisioningState::Unprovisioned => {
                self.enter(LifecycleState::Initializing, sink);
                provisioner.initialize()?;
                mark_provisioned(store)?;
                Ok(())
            }
            ProvisioningState::Provisioned => {
                self.enter(LifecycleState::Restoring, sink);
                let restored = provisioner.restore();
                if restored.is_err() && self.reinit_on_restore_failure {
                    warn!("PROVISION: restore failed, erasing key so the next boot re-initializes");
                    if let Err(e) = erase_provisioning(store) {
                        warn!("PROVISION: erase failed: {}", e);
                    }
                }
                restored
            }
        }
    }

    fn enter<E: EventSink>(&mut self, to: LifecycleState, sink: &mut E) {
        let from = self.state;
        info!("PROVISION: {} -> {}", from, to);
        self.state = to;
        let _ = self.trail.push(to);
        sink.emit(&AppEvent::Lifecycle { from, to });
    }
}

// ── Hard-reset monitor ──────────────────────────────────────────

pub struct ResetMonitor {
    poll_ms: u32,
}

impl ResetMonitor {
    pub fn new(poll_ms: u32) -> Self {
        Self { poll_ms }
    }

    /// One poll.  Returns `true` once a restart has been requested.
    ///
    /// If the erase fails the flag stays set and the next poll retries.
    pub fn poll<S, E>(&self, store: &mut S, signals: &SharedSignals, sink: &mut E) -> bool
    where
        S: StoragePort,
        E: EventSink,
    {
        if !signals.reset.is_requested() {
            return false;
        }
        sink.emit(&AppEvent::HardResetRequested);
        match erase_provisioning(store) {
            Ok(()) => {
                info!("RESET: provisioning erased");
                signals.restart.request(RestartReason::HardReset);
                true
            }
            Err(e) => {
                warn!("RESET: erase failed ({}), retrying", e);
                false
            }
        }
    }

    /// Poll every `poll_ms` until a restart is pending.
    pub fn run<S, C, E>(&self, store: &mut S, clock: &C, signals: &SharedSignals, sink: &mut E)
    where
        S: StoragePort,
        C: ClockPort,
        E: EventSink,
    {
        loop {
            if self.poll(store, signals, sink) || signals.restart.is_halting() {
                return;
            }
            clock.delay_ms(self.poll_ms);
        }
    }
}
