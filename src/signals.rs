//! Process-wide shared signals.
//!
//! The only state shared between independently scheduled tasks.  Each
//! handle is a single machine word (plus, where a task must sleep on it, an
//! `embassy_sync` signal used purely as a wake-up), and each has exactly one
//! writer:
//!
//! | Handle              | Writer                   | Reader(s)                     |
//! |---------------------|--------------------------|-------------------------------|
//! | `LinkFlag`          | connectivity manager     | session loop, link indicator  |
//! | `ConfirmFlag`       | confirm-button ISR       | confirmation gate (clears)    |
//! | `ResetFlag`         | hard-reset-button ISR    | reset monitor                 |
//! | `InvalidationEpoch` | connectivity manager     | session loop                  |
//! | `RestartRequest`    | any task (fatal paths)   | coordinator                   |
//!
//! ISR-side writes are plain atomic stores, safe from interrupt context.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::restart::RestartReason;

// ── Link ────────────────────────────────────────────────────────

/// Connectivity flag: 0 = down, `i + 1` = up on candidate `i`.
pub struct LinkFlag {
    word: AtomicU32,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl LinkFlag {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            wake: Signal::new(),
        }
    }

    /// Writer: connectivity manager.
    pub fn set_up(&self, index: usize) {
        self.word.store(index as u32 + 1, Ordering::Release);
        self.wake.signal(());
    }

    /// Writer: connectivity manager.
    pub fn set_down(&self) {
        self.word.store(0, Ordering::Release);
    }

    /// Index of the candidate the link is up on, if any.
    pub fn current(&self) -> Option<usize> {
        match self.word.load(Ordering::Acquire) {
            0 => None,
            w => Some((w - 1) as usize),
        }
    }

    pub fn is_up(&self) -> bool {
        self.current().is_some()
    }

    /// Suspend until the link is up.  Returns the candidate index.
    pub async fn wait_up(&self) -> usize {
        loop {
            if let Some(index) = self.current() {
                return index;
            }
            // A stale wake from an earlier up edge just loops once more.
            self.wake.wait().await;
        }
    }

    /// Blocking form of [`wait_up`](Self::wait_up) for thread-based tasks.
    pub fn block_until_up(&self) -> usize {
        futures_lite::future::block_on(self.wait_up())
    }
}

impl Default for LinkFlag {
    fn default() -> Self {
        Self::new()
    }
}

// ── Confirmation ────────────────────────────────────────────────

/// Physical confirmation: raised by the confirm-button ISR, cleared and
/// consumed by the confirmation gate.
pub struct ConfirmFlag {
    raised: AtomicBool,
}

impl ConfirmFlag {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// ISR-safe.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }

    /// Consume the flag.  Returns `true` at most once per raise.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl Default for ConfirmFlag {
    fn default() -> Self {
        Self::new()
    }
}

// ── Hard reset ──────────────────────────────────────────────────

/// Set once by the hard-reset-button ISR.  Only a restart clears it.
pub struct ResetFlag {
    requested: AtomicBool,
}

impl ResetFlag {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// ISR-safe.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl Default for ResetFlag {
    fn default() -> Self {
        Self::new()
    }
}

// ── Invalidation ────────────────────────────────────────────────

/// Monotonic counter bumped on every link transition.  A reader that sees
/// a new value must drop pending confirmation and session secrets before
/// its next gate evaluation.
pub struct InvalidationEpoch {
    epoch: AtomicU32,
}

impl InvalidationEpoch {
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
        }
    }

    /// Writer: connectivity manager.
    pub fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }
}

impl Default for InvalidationEpoch {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader-side position in an [`InvalidationEpoch`].
#[derive(Debug, Default)]
pub struct EpochCursor {
    seen: u32,
}

impl EpochCursor {
    pub const fn new() -> Self {
        Self { seen: 0 }
    }

    /// `true` if the epoch moved since the last call.
    pub fn advance(&mut self, epoch: &InvalidationEpoch) -> bool {
        let now = epoch.current();
        if now == self.seen {
            return false;
        }
        self.seen = now;
        true
    }
}

// ── Restart ─────────────────────────────────────────────────────

/// A controlled restart requested by any task, performed by the coordinator.
pub struct RestartRequest {
    halting: AtomicBool,
    reason: Signal<CriticalSectionRawMutex, RestartReason>,
}

impl RestartRequest {
    pub const fn new() -> Self {
        Self {
            halting: AtomicBool::new(false),
            reason: Signal::new(),
        }
    }

    /// Stop accepting new work and hand `reason` to the coordinator.
    /// The first request wins; later ones are logged by the caller only.
    pub fn request(&self, reason: RestartReason) {
        if !self.halting.swap(true, Ordering::AcqRel) {
            self.reason.signal(reason);
        }
    }

    /// Set once any restart has been requested.  Tasks check this before
    /// starting new work.
    pub fn is_halting(&self) -> bool {
        self.halting.load(Ordering::Acquire)
    }

    pub async fn wait(&self) -> RestartReason {
        self.reason.wait().await
    }

    /// Blocking form of [`wait`](Self::wait).
    pub fn block_until_requested(&self) -> RestartReason {
        futures_lite::future::block_on(self.wait())
    }
}

impl Default for RestartRequest {
    fn default() -> Self {
        Self::new()
    }
}

// ── Bundle ──────────────────────────────────────────────────────

/// All shared signals, `const`-constructible for a `static`.
pub struct SharedSignals {
    pub link: LinkFlag,
    pub confirm: ConfirmFlag,
    pub reset: ResetFlag,
    pub invalidation: InvalidationEpoch,
    pub restart: RestartRequest,
}

impl SharedSignals {
    pub const fn new() -> Self {
        Self {
            link: LinkFlag::new(),
            confirm: ConfirmFlag::new(),
            reset: ResetFlag::new(),
            invalidation: InvalidationEpoch::new(),
            restart: RestartRequest::new(),
        }
    }
}

impl Default for SharedSignals {
    fn default() -> Self {
        Self::new()
    }
}
