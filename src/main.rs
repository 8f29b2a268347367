//! NetKey Firmware: Main Entry Point
//!
//! Hexagonal architecture with four core-pinned tasks and a coordinator.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter    TcpDialer     NvsAdapter    FatVolume          │
//! │  (Station)      (Dialer)      (Storage+Cfg) (Volume)           │
//! │  GpioIndicators SystemClock   SimToken      LogEventSink       │
//! │  (Indicator)    (Clock)       (Processor)   (EventSink)        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  link task      → ConnectivityManager                  │    │
//! │  │  session task   → ProvisioningLifecycle · SessionLoop  │    │
//! │  │                   · ConfirmationGate                   │    │
//! │  │  reset task     → ResetMonitor                         │    │
//! │  │  indicator task → LinkIndicator                        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  main thread: bring-up, then await_restart (coordinator)       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use netkey::Error;
use netkey::adapters::gpio::GpioIndicators;
use netkey::adapters::log_sink::LogEventSink;
use netkey::adapters::nvs::NvsAdapter;
use netkey::adapters::sim_token::SimToken;
use netkey::adapters::system::SystemReset;
use netkey::adapters::tcp::TcpDialer;
use netkey::adapters::time::SystemClock;
use netkey::adapters::volume::FatVolume;
use netkey::adapters::wifi::WifiAdapter;
use netkey::app::ports::{ConfigPort, VolumePort};
use netkey::config::DeviceConfig;
use netkey::coordinator::{self, Board, LINK_EVENTS, SIGNALS, TaskParts};
use netkey::diagnostics::{self, RestartLog};
use netkey::drivers::hw_init;
use netkey::restart::{self, RestartReason};

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Bootstrap ──────────────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    init_host_logger();

    info!("╔══════════════════════════════════════╗");
    info!("║  NetKey v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let signals = &SIGNALS;
    diagnostics::install_panic_hook(signals);

    let clock = SystemClock::new();
    let system = SystemReset;
    let mut volume = FatVolume::default();

    // ── 2. NVS + config ───────────────────────────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => fatal(e.into(), &mut volume, &clock, &system),
    };
    let config = load_config(&nvs)?;
    info!(
        "Config: {} candidate network(s), peer port {}",
        config.networks.len(),
        config.peer_port
    );

    let mut restart_log = RestartLog::new();
    restart_log.init(&nvs);
    if let Some(prev) = restart_log.latest(&nvs) {
        info!("Previous restart: {}", prev);
    }

    // ── 3. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        fatal(e.into(), &mut volume, &clock, &system);
    }
    if let Err(e) = hw_init::init_isr_service(signals) {
        fatal(e.into(), &mut volume, &clock, &system);
    }

    // ── 4. Durable volume ─────────────────────────────────────
    if let Err(e) = volume.mount() {
        fatal(e.into(), &mut volume, &clock, &system);
    }

    // ── 5. Station driver ─────────────────────────────────────
    let mut station = match create_station() {
        Ok(s) => s,
        Err(e) => fatal(e, &mut volume, &clock, &system),
    };
    // Events queue in LINK_EVENTS until the link task drains them.
    if let Err(e) = station.start() {
        fatal(e.into(), &mut volume, &clock, &system);
    }

    // ── 6. Tasks ──────────────────────────────────────────────
    let parts = TaskParts {
        store: nvs.clone(),
        dialer: TcpDialer::default(),
        token: SimToken::new(nvs.clone()),
        station,
        board: Arc::new(Board::new(GpioIndicators, SystemClock::new())),
        sink: LogEventSink::new(),
    };
    let _handles = match coordinator::spawn_all(&config, parts, signals, &LINK_EVENTS) {
        Ok(h) => h,
        Err(e) => fatal(e.into(), &mut volume, &clock, &system),
    };
    info!("Tasks running");

    // ── 7. Coordinator ────────────────────────────────────────
    coordinator::await_restart(
        signals,
        config.restart_countdown_secs,
        &mut nvs,
        &mut volume,
        &clock,
        &system,
    )
}

// ── Helpers ───────────────────────────────────────────────────

/// A bring-up failure: controlled restart without waiting for the tasks.
fn fatal(err: Error, volume: &mut FatVolume, clock: &SystemClock, system: &SystemReset) -> ! {
    log::error!("Bring-up failed: {}", err);
    let reason = err.restart_reason().unwrap_or(RestartReason::StorageInit);
    restart::perform(
        reason,
        DeviceConfig::default().restart_countdown_secs,
        volume,
        clock,
        system,
    )
}

/// Config file from the first CLI argument (host), else NVS, else defaults.
fn load_config(nvs: &NvsAdapter) -> Result<DeviceConfig> {
    #[cfg(not(target_os = "espidf"))]
    {
        use anyhow::Context;

        if let Some(path) = std::env::args().nth(1) {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            let cfg = DeviceConfig::from_json(&text)
                .map_err(|e| anyhow::anyhow!("config file {}: {}", path, e))?;
            info!("Config loaded from {}", path);
            return Ok(cfg);
        }
    }

    match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            Ok(cfg)
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            Ok(DeviceConfig::default())
        }
    }
}

#[cfg(target_os = "espidf")]
fn create_station() -> core::result::Result<WifiAdapter, Error> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use netkey::app::ports::StationError;

    let peripherals =
        Peripherals::take().map_err(|e| Error::Station(StationError::InvalidConfig(e.code())))?;
    let sysloop = EspSystemEventLoop::take()
        .map_err(|e| Error::Station(StationError::InvalidConfig(e.code())))?;
    Ok(WifiAdapter::new(peripherals.modem, sysloop, &LINK_EVENTS)?)
}

#[cfg(not(target_os = "espidf"))]
fn create_station() -> core::result::Result<WifiAdapter, Error> {
    Ok(WifiAdapter::new(&LINK_EVENTS))
}

#[cfg(not(target_os = "espidf"))]
fn init_host_logger() {
    let level = if cfg!(debug_assertions) { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .init();
}
