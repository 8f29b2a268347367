//! One-shot GPIO initialization.
//!
//! Configures the two indicator outputs and the two button inputs using
//! raw ESP-IDF sys calls, then installs the per-pin ISR service.  Called
//! once from `main()` before any task is spawned.
//!
//! On the host, output levels are kept in an atomic bitmask so the
//! simulation (and tests) can observe what the firmware drives.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU64, Ordering};

use crate::pins;
use crate::signals::SharedSignals;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before any task is spawned.
    unsafe {
        init_gpio_outputs()?;
        init_gpio_inputs()?;
    }
    info!("hw_init: GPIO configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    SIM_LEVELS.store(0, Ordering::Release);
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    for &pin in &[pins::ACTIVITY_LED_GPIO, pins::LINK_LED_GPIO] {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        unsafe { gpio_set_level(pin, 0) };
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an output pin configured in
    // init_gpio_outputs(); the level register write is atomic.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

/// Simulated output levels, one bit per GPIO.
#[cfg(not(target_os = "espidf"))]
static SIM_LEVELS: AtomicU64 = AtomicU64::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(pin: i32, high: bool) {
    let bit = 1u64 << pin;
    if high {
        SIM_LEVELS.fetch_or(bit, Ordering::AcqRel);
    } else {
        SIM_LEVELS.fetch_and(!bit, Ordering::AcqRel);
    }
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(pin: i32) -> bool {
    SIM_LEVELS.load(Ordering::Acquire) & (1u64 << pin) != 0
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Both buttons pull the line high when pressed.
    for &pin in &[pins::CONFIRM_BUTTON_GPIO, pins::RESET_BUTTON_GPIO] {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }
    Ok(())
}

// ── GPIO ISR Service ──────────────────────────────────────────

/// Install the per-pin GPIO ISR service and register the button handlers.
///
/// Each handler receives a pointer to the flag it raises, so the ISRs
/// touch nothing but a single atomic.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(signals: &'static SharedSignals) -> Result<(), HwInitError> {
    use crate::drivers::button::{confirm_gpio_isr, reset_gpio_isr};

    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handler arguments point into a
    // `'static` SharedSignals and stay valid for the process lifetime.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        let confirm_arg = &signals.confirm as *const _ as *mut core::ffi::c_void;
        let ret = gpio_isr_handler_add(
            pins::CONFIRM_BUTTON_GPIO,
            Some(confirm_gpio_isr),
            confirm_arg,
        );
        if ret != ESP_OK {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        let reset_arg = &signals.reset as *const _ as *mut core::ffi::c_void;
        let ret = gpio_isr_handler_add(pins::RESET_BUTTON_GPIO, Some(reset_gpio_isr), reset_arg);
        if ret != ESP_OK {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
    }
    info!("hw_init: ISR service installed (confirm, hard reset)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service(signals: &'static SharedSignals) -> Result<(), HwInitError> {
    if crate::drivers::button::spawn_console(signals) {
        log::info!("hw_init(sim): buttons on stdin ('c' = confirm, 'r' = hard reset)");
    }
    Ok(())
}
