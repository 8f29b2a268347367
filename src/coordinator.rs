//! Task coordinator.
//!
//! ```text
//!                ┌────────────── SharedSignals (static) ───────────────┐
//!                │ link · confirm · reset · invalidation · restart     │
//!                └──▲──────────▲───────────▲─────────────▲─────────────┘
//!   WiFi driver     │          │           │             │
//!   ──LinkEvent──▶ link    session       reset       indicator
//!   (channel)     (Pro,6)  (App,5)      (App,3)      (App,2)
//!                                                         │
//!   main thread ◀──────── RestartRequest ─────────────────┘
//!   record reason · countdown · unmount · restart
//! ```
//!
//! The tasks never call each other; everything they share is in
//! [`SharedSignals`].  The main thread spawns them and then blocks until
//! some task requests a restart.

use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::channel::Channel;
use log::{error, info, warn};

use crate::app::ports::{
    ClockPort, CommandParser, CommandProcessor, ConfigError, Dialer, EventSink, IndicatorPort,
    Led, Provisioner, StationPort, StoragePort, SystemPort, VolumePort,
};
use crate::config::DeviceConfig;
use crate::connectivity::{ConnectivityManager, LinkEventChannel};
use crate::diagnostics::{RestartLog, RestartRecord};
use crate::drivers::task_pin::{Core, TaskSpec, spawn_task};
use crate::indicator::LinkIndicator;
use crate::provisioning::{ProvisioningLifecycle, ResetMonitor};
use crate::restart::{self, RestartReason};
use crate::session::SessionLoop;
use crate::signals::SharedSignals;

/// Process-wide shared signals.  ISRs hold pointers into this.
pub static SIGNALS: SharedSignals = SharedSignals::new();

/// Station driver → link task.
pub static LINK_EVENTS: LinkEventChannel = Channel::new();

// ── Task table ────────────────────────────────────────────────

pub const LINK_TASK: TaskSpec = TaskSpec {
    name: "link\0",
    core: Core::Pro,
    priority: 6,
    stack_kb: 6,
};

pub const SESSION_TASK: TaskSpec = TaskSpec {
    name: "session\0",
    core: Core::App,
    priority: 5,
    stack_kb: 16,
};

pub const RESET_TASK: TaskSpec = TaskSpec {
    name: "reset\0",
    core: Core::App,
    priority: 3,
    stack_kb: 4,
};

pub const INDICATOR_TASK: TaskSpec = TaskSpec {
    name: "indicator\0",
    core: Core::App,
    priority: 2,
    stack_kb: 3,
};

// ── Board ─────────────────────────────────────────────────────

/// LEDs and clock, shared by every task.
pub struct Board<I, C> {
    pub leds: I,
    pub clock: C,
}

impl<I, C> Board<I, C> {
    pub fn new(leds: I, clock: C) -> Self {
        Self { leds, clock }
    }
}

impl<I: IndicatorPort, C> IndicatorPort for Board<I, C> {
    fn set(&self, led: Led, on: bool) {
        self.leds.set(led, on);
    }
}

impl<I, C: ClockPort> ClockPort for Board<I, C> {
    fn delay_ms(&self, ms: u32) {
        self.clock.delay_ms(ms);
    }

    fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }
}

// ── Task bodies ───────────────────────────────────────────────

/// Provision, then serve peers until a restart is needed.
pub fn session_task<S, D, T, B, E>(
    config: &DeviceConfig,
    store: &mut S,
    dialer: &mut D,
    token: &mut T,
    board: &B,
    signals: &SharedSignals,
    sink: &mut E,
) where
    S: StoragePort,
    D: Dialer,
    T: CommandParser + CommandProcessor + Provisioner,
    B: IndicatorPort + ClockPort,
    E: EventSink,
{
    let mut lifecycle = ProvisioningLifecycle::new(config.reinit_on_restore_failure);
    if lifecycle.run(store, token, board, sink).is_err() {
        request(signals, RestartReason::ProvisioningFailed, sink);
        return;
    }

    let mut session = SessionLoop::new(config);
    if let Some(reason) = session.run(dialer, token, board, signals, sink) {
        request(signals, reason, sink);
    }
    let stats = session.stats();
    info!(
        "SESSION: stopped (served={}, lockouts={}, connect_failures={})",
        stats.served, stats.lockouts, stats.connect_failures
    );
}

/// Feed station events to the connectivity manager.
pub fn link_task<W, E>(
    manager: &mut ConnectivityManager,
    station: &mut W,
    events: &LinkEventChannel,
    signals: &SharedSignals,
    sink: &mut E,
) where
    W: StationPort,
    E: EventSink,
{
    loop {
        let event = futures_lite::future::block_on(events.receive());
        if signals.restart.is_halting() {
            return;
        }
        if let Err(e) = manager.handle(event, station, signals, sink) {
            error!("LINK: {}", e);
            request(signals, RestartReason::StationDriver, sink);
            return;
        }
    }
}

fn request<E: EventSink>(signals: &SharedSignals, reason: RestartReason, sink: &mut E) {
    if signals.restart.is_halting() {
        warn!("RESTART | already pending, dropping '{}'", reason);
        return;
    }
    sink.emit(&crate::app::events::AppEvent::RestartRequested(reason));
    signals.restart.request(reason);
}

// ── Spawning ──────────────────────────────────────────────────

/// Everything the tasks own.  `store` and `sink` are cloned per task.
pub struct TaskParts<S, D, T, W, B, E> {
    pub store: S,
    pub dialer: D,
    pub token: T,
    pub station: W,
    pub board: Arc<B>,
    pub sink: E,
}

/// Spawn the link, session, reset and indicator tasks.
///
/// Fails only if the configuration has no candidate networks.
pub fn spawn_all<S, D, T, W, B, E>(
    config: &DeviceConfig,
    parts: TaskParts<S, D, T, W, B, E>,
    signals: &'static SharedSignals,
    events: &'static LinkEventChannel,
) -> Result<Vec<JoinHandle<()>>, ConfigError>
where
    S: StoragePort + Clone + Send + 'static,
    D: Dialer + Send + 'static,
    T: CommandParser + CommandProcessor + Provisioner + Send + 'static,
    W: StationPort + Send + 'static,
    B: IndicatorPort + ClockPort + Send + Sync + 'static,
    E: EventSink + Clone + Send + 'static,
{
    let mut manager = ConnectivityManager::new(&config.networks)?;
    let TaskParts {
        store,
        mut dialer,
        mut token,
        mut station,
        board,
        sink,
    } = parts;

    let mut handles = Vec::with_capacity(4);

    let mut link_sink = sink.clone();
    handles.push(spawn_task(LINK_TASK, move || {
        link_task(&mut manager, &mut station, events, signals, &mut link_sink);
    }));

    let session_cfg = config.clone();
    let mut session_store = store.clone();
    let session_board = Arc::clone(&board);
    let mut session_sink = sink.clone();
    handles.push(spawn_task(SESSION_TASK, move || {
        session_task(
            &session_cfg,
            &mut session_store,
            &mut dialer,
            &mut token,
            &*session_board,
            signals,
            &mut session_sink,
        );
    }));

    let monitor = ResetMonitor::new(config.reset_poll_ms);
    let mut reset_store = store;
    let reset_board = Arc::clone(&board);
    let mut reset_sink = sink;
    handles.push(spawn_task(RESET_TASK, move || {
        monitor.run(&mut reset_store, &*reset_board, signals, &mut reset_sink);
    }));

    let mut indicator = LinkIndicator::new(config.link_blink_ms);
    handles.push(spawn_task(INDICATOR_TASK, move || {
        indicator.run(&*board, signals);
    }));

    Ok(handles)
}

// ── Restart ───────────────────────────────────────────────────

/// Record the reason, count down, release the volume.
pub fn finish<S, V, C>(
    reason: RestartReason,
    countdown_secs: u32,
    store: &mut S,
    volume: &mut V,
    clock: &C,
) -> RestartRecord
where
    S: StoragePort,
    V: VolumePort,
    C: ClockPort,
{
    let record = RestartRecord {
        uptime_ms: clock.uptime_ms(),
        reason,
    };
    let mut log = RestartLog::new();
    log.init(&*store);
    log.record(store, &record);

    restart::prepare(reason, countdown_secs, volume, clock);
    record
}

/// Block until a task requests a restart, then perform it.
pub fn await_restart<S, V, C, Y>(
    signals: &SharedSignals,
    countdown_secs: u32,
    store: &mut S,
    volume: &mut V,
    clock: &C,
    system: &Y,
) -> !
where
    S: StoragePort,
    V: VolumePort,
    C: ClockPort,
    Y: SystemPort,
{
    let reason = signals.restart.block_until_requested();
    finish(reason, countdown_secs, store, volume, clock);
    info!("RESTART | restarting now");
    system.restart()
}
