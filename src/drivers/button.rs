//! Button ISR handlers.
//!
//! ## Hardware
//!
//! Two momentary switches to 3V3 with internal pull-downs.  The GPIO
//! fires on the rising edge; the ISR performs a single atomic store and
//! nothing else.
//!
//! | Button     | GPIO | Flag raised              | Consumer           |
//! |------------|------|--------------------------|--------------------|
//! | Confirm    | 12   | `SharedSignals::confirm` | confirmation gate  |
//! | Hard reset | 17   | `SharedSignals::reset`   | reset monitor      |
//!
//! Bounce needs no filtering: a burst of edges raises the same flag
//! repeatedly, and each consumer takes it at most once.
//!
//! On the host, the same flags are raised from stdin by [`spawn_console`].

use crate::signals::{ConfirmFlag, ResetFlag};

#[cfg(not(target_os = "espidf"))]
use crate::signals::SharedSignals;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

/// Set once the stdin console owns `stdin`.
#[cfg(not(target_os = "espidf"))]
static CONSOLE_STARTED: AtomicBool = AtomicBool::new(false);

/// Confirm-button ISR.  `arg` is the `&'static ConfirmFlag` registered in
/// [`init_isr_service`](super::hw_init::init_isr_service).
///
/// # Safety
///
/// `arg` must point to a `ConfirmFlag` that outlives the handler
/// registration.
#[allow(unused)]
pub unsafe extern "C" fn confirm_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: upheld by the registration contract above.
    let flag = unsafe { &*(arg as *const ConfirmFlag) };
    flag.raise();
}

/// Hard-reset-button ISR.  `arg` is the `&'static ResetFlag`.
///
/// # Safety
///
/// `arg` must point to a `ResetFlag` that outlives the handler
/// registration.
#[allow(unused)]
pub unsafe extern "C" fn reset_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: upheld by the registration contract above.
    let flag = unsafe { &*(arg as *const ResetFlag) };
    flag.request();
}

/// Simulated button on the development host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimButton {
    Confirm,
    HardReset,
}

impl SimButton {
    /// Map one console line to a button press.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim() {
            "c" | "confirm" => Some(Self::Confirm),
            "r" | "reset" => Some(Self::HardReset),
            _ => None,
        }
    }
}

/// Read button presses from stdin on a background thread.
///
/// Only the first call starts a reader; later calls return `false`.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_console(signals: &'static SharedSignals) -> bool {
    use std::io::BufRead;

    if CONSOLE_STARTED.swap(true, Ordering::AcqRel) {
        log::debug!("BUTTON(sim): console already running");
        return false;
    }

    let spawned = std::thread::Builder::new()
        .name("buttons".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                match SimButton::from_line(&line) {
                    Some(SimButton::Confirm) => {
                        log::info!("BUTTON(sim): confirm");
                        signals.confirm.raise();
                    }
                    Some(SimButton::HardReset) => {
                        log::info!("BUTTON(sim): hard reset");
                        signals.reset.request();
                    }
                    None => log::warn!("BUTTON(sim): unknown input '{}'", line.trim()),
                }
            }
        });
    match spawned {
        Ok(_) => true,
        Err(e) => {
            log::warn!("BUTTON(sim): console unavailable: {}", e);
            CONSOLE_STARTED.store(false, Ordering::Release);
            false
        }
    }
}
