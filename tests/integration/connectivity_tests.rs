//! Integration tests for round-robin failover and the link task.

use embassy_sync::channel::Channel;

use netkey::adapters::wifi::WifiAdapter;
use netkey::app::events::AppEvent;
use netkey::app::ports::Led;
use netkey::connectivity::{ConnectivityManager, LinkEvent, LinkEventChannel, LinkStatus};
use netkey::coordinator;
use netkey::indicator::LinkIndicator;
use netkey::restart::RestartReason;
use netkey::signals::{EpochCursor, SharedSignals};

use crate::mock_hw::{MockStation, RecordingSink, VirtualBoard, networks};

const DROP: LinkEvent = LinkEvent::Disconnected { reason: 201 };

#[test]
fn failover_walks_the_list_in_order_and_wraps() {
    let nets = networks(3);
    let mut manager = ConnectivityManager::new(&nets).unwrap();
    let mut station = MockStation::default();
    let signals = SharedSignals::new();
    let mut sink = RecordingSink::default();

    manager
        .handle(LinkEvent::StationStarted, &mut station, &signals, &mut sink)
        .unwrap();
    for _ in 0..4 {
        manager.handle(DROP, &mut station, &signals, &mut sink).unwrap();
    }

    assert_eq!(station.applied, vec!["net0", "net1", "net2", "net0", "net1"]);
    assert_eq!(station.connects, 5);
    assert_eq!(manager.state().attempt_index, 2);
    assert_eq!(manager.state().status, LinkStatus::Connecting);
}

#[test]
fn link_up_records_the_candidate_it_came_up_on() {
    let nets = networks(2);
    let mut manager = ConnectivityManager::new(&nets).unwrap();
    let mut station = MockStation::default();
    let signals = SharedSignals::new();
    let mut sink = RecordingSink::default();

    manager
        .handle(LinkEvent::StationStarted, &mut station, &signals, &mut sink)
        .unwrap();
    manager.handle(DROP, &mut station, &signals, &mut sink).unwrap();
    manager
        .handle(LinkEvent::GotAddress, &mut station, &signals, &mut sink)
        .unwrap();

    let state = manager.state();
    assert_eq!(state.status, LinkStatus::Up);
    assert_eq!(state.current_index, Some(1));
    assert_eq!(state.attempt_index, 0);
    assert_eq!(signals.link.current(), Some(1));
    assert!(sink.events.contains(&AppEvent::LinkUp { index: 1 }));

    manager.handle(DROP, &mut station, &signals, &mut sink).unwrap();
    assert_eq!(signals.link.current(), None);
    assert_eq!(manager.state().current_index, None);
    // Failover is immediate.
    assert_eq!(station.applied.last().map(String::as_str), Some("net0"));
}

#[test]
fn single_network_is_retried_forever() {
    let nets = networks(1);
    let mut manager = ConnectivityManager::new(&nets).unwrap();
    let mut station = MockStation::default();
    let signals = SharedSignals::new();
    let mut sink = RecordingSink::default();

    manager
        .handle(LinkEvent::StationStarted, &mut station, &signals, &mut sink)
        .unwrap();
    for _ in 0..10 {
        manager.handle(DROP, &mut station, &signals, &mut sink).unwrap();
    }

    assert_eq!(station.applied.len(), 11);
    assert!(station.applied.iter().all(|s| s == "net0"));
}

#[test]
fn every_transition_bumps_the_invalidation_epoch() {
    let nets = networks(2);
    let mut manager = ConnectivityManager::new(&nets).unwrap();
    let mut station = MockStation::default();
    let signals = SharedSignals::new();
    let mut sink = RecordingSink::default();
    let mut cursor = EpochCursor::new();

    manager
        .handle(LinkEvent::StationStarted, &mut station, &signals, &mut sink)
        .unwrap();
    assert!(!cursor.advance(&signals.invalidation));

    manager
        .handle(LinkEvent::GotAddress, &mut station, &signals, &mut sink)
        .unwrap();
    assert!(cursor.advance(&signals.invalidation));
    assert!(!cursor.advance(&signals.invalidation));

    manager.handle(DROP, &mut station, &signals, &mut sink).unwrap();
    assert!(cursor.advance(&signals.invalidation));
}

#[test]
fn empty_network_list_is_rejected() {
    assert!(ConnectivityManager::new(&[]).is_err());
}

// ── Link task over the simulated station ──────────────────────

#[test]
fn link_task_brings_the_sim_station_up_and_stops_on_restart() {
    let events: &'static LinkEventChannel = Box::leak(Box::new(Channel::new()));
    let signals: &'static SharedSignals = Box::leak(Box::new(SharedSignals::new()));
    let nets = networks(2);

    let mut station = WifiAdapter::new(events);
    station.start().unwrap();

    let handle = std::thread::spawn(move || {
        let mut manager = ConnectivityManager::new(&nets).unwrap();
        let mut sink = RecordingSink::default();
        coordinator::link_task(&mut manager, &mut station, events, signals, &mut sink);
        (manager.state(), station.attempts())
    });

    assert_eq!(signals.link.block_until_up(), 0);

    signals.restart.request(RestartReason::HardReset);
    // Wake the task so it observes the pending restart.
    events.try_send(DROP).unwrap();
    let (state, attempts) = handle.join().unwrap();

    assert_eq!(state.current_index, Some(0));
    assert_eq!(attempts, 1);
}

#[test]
fn station_failure_ends_the_link_task_with_a_restart() {
    let events: LinkEventChannel = Channel::new();
    let signals = SharedSignals::new();
    let nets = networks(1);
    let mut manager = ConnectivityManager::new(&nets).unwrap();
    let mut station = MockStation {
        fail_connect: true,
        ..MockStation::default()
    };
    let mut sink = RecordingSink::default();

    events.try_send(LinkEvent::StationStarted).unwrap();
    coordinator::link_task(&mut manager, &mut station, &events, &signals, &mut sink);

    assert!(signals.restart.is_halting());
    assert_eq!(
        signals.restart.block_until_requested(),
        RestartReason::StationDriver
    );
}

// ── Link indicator ────────────────────────────────────────────

#[test]
fn link_led_blinks_while_down_and_holds_while_up() {
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut indicator = LinkIndicator::new(500);

    for _ in 0..4 {
        indicator.tick(false, &board);
    }
    assert_eq!(board.writes(Led::Link), vec![true, false, true, false]);

    indicator.tick(true, &board);
    indicator.tick(true, &board);
    indicator.tick(true, &board);
    assert_eq!(board.writes(Led::Link).len(), 5);
    assert_eq!(board.last(Led::Link), Some(true));
}
