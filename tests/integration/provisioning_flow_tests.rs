//! Integration tests for the provisioning lifecycle across boots.
//!
//! A "boot" is a fresh `ProvisioningLifecycle` (and token) over the same
//! persisted store; a hard reset goes through the reset monitor and the
//! coordinator's restart path exactly as on the device.

use netkey::adapters::nvs::NvsAdapter;
use netkey::adapters::sim_token::SimToken;
use netkey::apdu::Response;
use netkey::apdu::parser::parse;
use netkey::app::events::AppEvent;
use netkey::app::ports::{CommandProcessor, Led, ProvisionError, StoragePort};
use netkey::coordinator;
use netkey::diagnostics::RestartLog;
use netkey::provisioning::{
    LifecycleState, PROVISION_NAMESPACE, PROVISIONED_KEY, ProvisioningLifecycle, ResetMonitor,
};
use netkey::restart::RestartReason;
use netkey::signals::SharedSignals;

use crate::mock_hw::{MemStore, MockToken, MockVolume, RecordingSink, VirtualBoard};

use LifecycleState::{Failed, Initializing, Ready, Restoring, Start};

fn boot(store: &MemStore, token: &mut MockToken) -> (Vec<LifecycleState>, Result<(), ProvisionError>) {
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();
    let mut store = store.clone();
    let mut lifecycle = ProvisioningLifecycle::new(true);
    let result = lifecycle.run(&mut store, token, &board, &mut sink);
    (lifecycle.trail().to_vec(), result)
}

#[test]
fn first_boot_initializes_then_later_boots_restore() {
    let store = MemStore::new();

    let mut token = MockToken::default();
    let (trail, result) = boot(&store, &mut token);
    assert_eq!(result, Ok(()));
    assert_eq!(trail, vec![Start, Initializing, Ready]);
    assert_eq!(token.initializes, 1);
    assert_eq!(store.get(PROVISION_NAMESPACE, PROVISIONED_KEY), Some(vec![1]));

    for _ in 0..2 {
        let mut token = MockToken::default();
        let (trail, result) = boot(&store, &mut token);
        assert_eq!(result, Ok(()));
        assert_eq!(trail, vec![Start, Restoring, Ready]);
        assert_eq!((token.initializes, token.restores), (0, 1));
    }
}

#[test]
fn activity_led_is_lit_only_while_provisioning() {
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();
    let mut store = MemStore::new();
    let mut token = MockToken::default();

    ProvisioningLifecycle::new(true)
        .run(&mut store, &mut token, &board, &mut sink)
        .unwrap();

    assert_eq!(board.writes(Led::Activity), vec![true, false]);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::Lifecycle { .. })),
        2
    );
}

#[test]
fn failed_initialize_leaves_the_device_unprovisioned() {
    let store = MemStore::new();
    let mut token = MockToken {
        fail_initialize: true,
        ..MockToken::default()
    };

    let (trail, result) = boot(&store, &mut token);

    assert!(result.is_err());
    assert_eq!(trail, vec![Start, Initializing, Failed]);
    assert!(!store.exists(PROVISION_NAMESPACE, PROVISIONED_KEY));
}

#[test]
fn failed_restore_reinitializes_on_the_next_boot() {
    let store = MemStore::new();
    boot(&store, &mut MockToken::default()).1.unwrap();

    let mut broken = MockToken {
        fail_restore: true,
        ..MockToken::default()
    };
    let (trail, result) = boot(&store, &mut broken);
    assert_eq!(result, Err(ProvisionError::Corrupted));
    assert_eq!(trail, vec![Start, Restoring, Failed]);

    let mut token = MockToken::default();
    let (trail, _) = boot(&store, &mut token);
    assert_eq!(trail, vec![Start, Initializing, Ready]);
    assert_eq!(token.initializes, 1);
}

#[test]
fn unreadable_store_fails_without_touching_the_token() {
    let store = MemStore::new();
    store.set_fail_reads(true);
    let mut token = MockToken::default();

    let (trail, result) = boot(&store, &mut token);

    assert!(matches!(result, Err(ProvisionError::Storage(_))));
    assert_eq!(trail, vec![Start, Failed]);
    assert_eq!((token.initializes, token.restores), (0, 0));
}

// ── Hard reset ────────────────────────────────────────────────

#[test]
fn hard_reset_erases_and_restarts_without_countdown() {
    let store = MemStore::new();
    boot(&store, &mut MockToken::default()).1.unwrap();

    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();
    let mut reset_store = store.clone();
    let monitor = ResetMonitor::new(4_000);

    signals.reset.request();
    monitor.run(&mut reset_store, &board, &signals, &mut sink);

    assert!(signals.restart.is_halting());
    assert!(!store.exists(PROVISION_NAMESPACE, PROVISIONED_KEY));
    assert!(sink.events.contains(&AppEvent::HardResetRequested));

    // Coordinator side.
    let reason = signals.restart.block_until_requested();
    assert_eq!(reason, RestartReason::HardReset);
    let mut volume = MockVolume::mounted();
    let mut log_store = store.clone();
    let record = coordinator::finish(reason, 3, &mut log_store, &mut volume, &board);
    assert_eq!(board.now(), 0);
    assert_eq!(volume.unmounts, 1);
    let mut restart_log = RestartLog::new();
    restart_log.init(&store);
    assert_eq!(restart_log.latest(&store), Some(record));

    // Next boot goes back through Initializing.
    let mut token = MockToken::default();
    let (trail, _) = boot(&store, &mut token);
    assert_eq!(trail, vec![Start, Initializing, Ready]);
}

#[test]
fn reset_monitor_polls_until_pressed() {
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();
    let mut store = MemStore::new();
    let monitor = ResetMonitor::new(4_000);

    assert!(!monitor.poll(&mut store, &signals, &mut sink));
    signals.reset.request();
    store.set_fail_deletes(true);
    // Erase fails: flag stays, no restart yet.
    assert!(!monitor.poll(&mut store, &signals, &mut sink));
    assert!(!signals.restart.is_halting());
    store.set_fail_deletes(false);
    assert!(monitor.poll(&mut store, &signals, &mut sink));
    assert!(board.delays.borrow().is_empty());
}

#[test]
fn fatal_restart_counts_down_and_unmounts() {
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut store = MemStore::new();
    let mut volume = MockVolume::mounted();

    coordinator::finish(
        RestartReason::ProvisioningFailed,
        3,
        &mut store,
        &mut volume,
        &board,
    );

    assert_eq!(*board.delays.borrow(), vec![1_000, 1_000, 1_000]);
    assert!(!volume.mounted);
}

// ── Real adapters: secret survives a restart ──────────────────

fn internal_auth(token: &mut SimToken<NvsAdapter>) -> Response {
    let mut response = Response::new();
    token.process(
        &parse(&[0x00, 0x88, 0x00, 0x00, 0x03, 0xA1, 0xB2, 0xC3, 0x00]),
        &mut response,
    );
    response
}

#[test]
fn device_secret_persists_across_boots() {
    let dir = tempfile::tempdir().unwrap();
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();

    let first = {
        let mut nvs = NvsAdapter::at(dir.path()).unwrap();
        let mut token = SimToken::new(nvs.clone());
        let mut lifecycle = ProvisioningLifecycle::new(true);
        lifecycle.run(&mut nvs, &mut token, &board, &mut sink).unwrap();
        assert_eq!(lifecycle.trail(), &[Start, Initializing, Ready]);
        internal_auth(&mut token)
    };
    assert_eq!(first.len(), 34);

    let mut nvs = NvsAdapter::at(dir.path()).unwrap();
    let mut token = SimToken::new(nvs.clone());
    let mut lifecycle = ProvisioningLifecycle::new(true);
    lifecycle.run(&mut nvs, &mut token, &board, &mut sink).unwrap();
    assert_eq!(lifecycle.trail(), &[Start, Restoring, Ready]);
    assert_eq!(internal_auth(&mut token), first);
}

#[test]
fn missing_secret_after_provisioning_fails_restore() {
    let dir = tempfile::tempdir().unwrap();
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut sink = RecordingSink::default();

    let mut nvs = NvsAdapter::at(dir.path()).unwrap();
    nvs.write(PROVISION_NAMESPACE, PROVISIONED_KEY, &[1]).unwrap();
    let mut token = SimToken::new(nvs.clone());

    let result = ProvisioningLifecycle::new(true).run(&mut nvs, &mut token, &board, &mut sink);

    assert_eq!(result, Err(ProvisionError::MissingState));
    assert!(!nvs.exists(PROVISION_NAMESPACE, PROVISIONED_KEY));
}
