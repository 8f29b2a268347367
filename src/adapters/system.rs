//! Process restart.
//!
//! Implements [`SystemPort`].  On the device this is `esp_restart()`.  On
//! the host the current binary is re-executed in place, so the next run
//! starts from a fresh process exactly like a reboot: nothing volatile is
//! carried over, only what the file-backed NVS holds.

use crate::app::ports::SystemPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemReset;

#[cfg(target_os = "espidf")]
impl SystemPort for SystemReset {
    fn restart(&self) -> ! {
        // SAFETY: esp_restart never returns.
        unsafe { esp_idf_svc::sys::esp_restart() };
        #[allow(unreachable_code)]
        loop {}
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPort for SystemReset {
    fn restart(&self) -> ! {
        log::logger().flush();
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            if let Ok(exe) = std::env::current_exe() {
                // `exec` only returns on failure.
                let err = std::process::Command::new(exe)
                    .args(std::env::args_os().skip(1))
                    .exec();
                log::error!("RESTART | re-exec failed: {}", err);
            }
        }
        log::error!("RESTART | exiting instead");
        std::process::exit(1)
    }
}
