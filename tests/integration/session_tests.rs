//! Integration tests for the session loop and confirmation gate.
//!
//! Every test drives `SessionLoop::serve_once` against the scripted dialer
//! and the virtual board; the link flag is raised up front so the loop
//! never blocks.

use std::net::{Ipv4Addr, SocketAddrV4};

use netkey::app::events::AppEvent;
use netkey::app::ports::{DialError, Led};
use netkey::restart::RestartReason;
use netkey::session::{CycleOutcome, SessionLoop};
use netkey::signals::SharedSignals;

use crate::mock_hw::{Dial, MockDialer, MockToken, RecordingSink, TOKEN_REPLY, VirtualBoard, config_with};

const GET_CHALLENGE: [u8; 5] = [0x00, 0x84, 0x00, 0x00, 0x08];
const INTERNAL_AUTH: [u8; 8] = [0x00, 0x88, 0x00, 0x00, 0x02, 0x01, 0x02, 0x00];
const PSO_CHAINED: [u8; 7] = [0x10, 0x2A, 0x9E, 0x9A, 0x02, 0x01, 0x02];

/// Full confirmation window with the default policy: 30 × 2 × 250 ms.
const DEADLINE_MS: u64 = 15_000;

struct Rig {
    signals: SharedSignals,
    token: MockToken,
    sink: RecordingSink,
    session: SessionLoop,
}

impl Rig {
    fn new(networks: usize) -> Self {
        let signals = SharedSignals::new();
        signals.link.set_up(0);
        Self {
            signals,
            token: MockToken::default(),
            sink: RecordingSink::default(),
            session: SessionLoop::new(&config_with(networks)),
        }
    }

    fn serve(&mut self, dialer: &mut MockDialer, board: &VirtualBoard<'_>) -> Result<CycleOutcome, RestartReason> {
        self.session
            .serve_once(dialer, &mut self.token, board, &self.signals, &mut self.sink)
    }
}

// ── Scenario A: non-sensitive command ─────────────────────────

#[test]
fn plain_command_is_served_without_waiting() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::sends(&GET_CHALLENGE)]);

    let outcome = rig.serve(&mut dialer, &board).unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    assert_eq!(rig.token.processed, vec![0x84]);
    assert_eq!(dialer.written(), vec![TOKEN_REPLY.to_vec()]);
    assert_eq!(dialer.closes(), 1);
    assert_eq!(
        dialer.dialed(),
        vec![SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 5511)]
    );
    // Steady activity LED around processing, nothing else.
    assert_eq!(board.writes(Led::Activity), vec![true, false]);
    assert!(board.writes(Led::Link).is_empty());
    assert_eq!(board.now(), 0);
    assert_eq!(rig.session.challenge_timing().count, 1);
}

#[test]
fn peer_address_follows_the_active_candidate() {
    let mut rig = Rig::new(3);
    rig.signals.link.set_up(2);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([Dial::sends(&GET_CHALLENGE)]);

    rig.session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(
        dialer.dialed(),
        vec![SocketAddrV4::new(Ipv4Addr::new(10, 0, 2, 2), 5511)]
    );
}

#[test]
fn chained_security_operation_bypasses_the_gate() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::sends(&PSO_CHAINED)]);

    let outcome = rig.serve(&mut dialer, &board).unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    assert_eq!(rig.token.processed, vec![0x2A]);
    assert!(board.delays.borrow().is_empty());
}

// ── Scenario B: sensitive command, confirmed ──────────────────

#[test]
fn sensitive_command_waits_for_the_button() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    board.press_at(500);
    let mut dialer = MockDialer::new([Dial::sends(&INTERNAL_AUTH)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    assert_eq!(rig.token.processed, vec![0x88]);
    assert_eq!(dialer.written(), vec![TOKEN_REPLY.to_vec()]);
    // Pressed as the first pulse ends: seen by the second check.
    assert_eq!(board.now(), 500);
    assert!(rig.sink.events.contains(&AppEvent::Confirmed {
        ins: 0x88,
        waited_ms: 500
    }));
    // Prompt over: link LED back to steady.
    assert_eq!(board.last(Led::Link), Some(true));
    assert!(!rig.signals.confirm.is_raised());
}

#[test]
fn mid_pulse_press_is_seen_at_the_next_pulse_boundary() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    board.press_at(700);
    let mut dialer = MockDialer::new([Dial::sends(&INTERNAL_AUTH)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    // The flag is polled once per 500 ms pulse, so 700 rounds up to 1000.
    assert_eq!(board.now(), 1_000);
    assert!(rig.sink.events.contains(&AppEvent::Confirmed {
        ins: 0x88,
        waited_ms: 1_000
    }));
}

#[test]
fn press_during_final_pulse_still_confirms() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    board.press_at(DEADLINE_MS);
    let mut dialer = MockDialer::new([Dial::sends(&INTERNAL_AUTH)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    assert_eq!(board.now(), DEADLINE_MS);
}

// ── Scenario C: sensitive command, timeout ────────────────────

#[test]
fn unconfirmed_command_is_locked_out_at_the_deadline() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([Dial::sends(&INTERNAL_AUTH)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::LockedOut);
    assert!(rig.token.processed.is_empty());
    assert_eq!(dialer.written(), vec![vec![0x69, 0x83]]);
    assert_eq!(dialer.closes(), 1);
    assert_eq!(board.now(), DEADLINE_MS);
    assert_eq!(board.delays.borrow().len(), 60);
    // 30 pulses of both LEDs.
    assert_eq!(board.writes(Led::Activity).iter().filter(|on| **on).count(), 30);
    assert_eq!(rig.session.stats().lockouts, 1);
}

#[test]
fn press_before_the_gate_does_not_count() {
    let mut rig = Rig::new(1);
    rig.signals.confirm.raise();
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([Dial::sends(&INTERNAL_AUTH)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::LockedOut);
}

#[test]
fn consecutive_lockouts_are_counted_and_reset_by_a_confirmation() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new((0..4).map(|_| Dial::sends(&INTERNAL_AUTH)));

    for _ in 0..3 {
        let outcome = rig
            .session
            .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
            .unwrap();
        assert_eq!(outcome, CycleOutcome::LockedOut);
    }
    assert!(rig.sink.events.contains(&AppEvent::LockedOut {
        ins: 0x88,
        consecutive: 3
    }));

    board.press_at(board.now() + 250);
    rig.session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();
    let stats = rig.session.stats();
    assert_eq!(stats.lockouts, 3);
    assert_eq!(stats.consecutive_lockouts, 0);
    assert_eq!(stats.served, 1);
}

// ── Scenario D: nothing to process ────────────────────────────

#[test]
fn empty_exchange_closes_without_a_response() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::sends(&[]), Dial::sends(&[0x00, 0xA4])]);

    assert_eq!(rig.serve(&mut dialer, &board).unwrap(), CycleOutcome::Empty);
    // Truncated header parses to the same sentinel.
    assert_eq!(rig.serve(&mut dialer, &board).unwrap(), CycleOutcome::Empty);

    assert!(dialer.written().is_empty());
    assert_eq!(dialer.closes(), 2);
    assert!(rig.token.processed.is_empty());
    assert_eq!(rig.token.invalidations, 2);
    assert_eq!(rig.session.stats().empty_exchanges, 2);
}

#[test]
fn failed_read_drops_session_state_and_closes() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::resets()]);

    assert_eq!(rig.serve(&mut dialer, &board).unwrap(), CycleOutcome::ReadFailed);

    assert!(dialer.written().is_empty());
    assert_eq!(dialer.closes(), 1);
    assert!(rig.token.processed.is_empty());
    assert_eq!(rig.token.invalidations, 1);
}

// ── Invalidation ──────────────────────────────────────────────

#[test]
fn link_transitions_invalidate_once_before_processing() {
    let mut rig = Rig::new(1);
    rig.signals.invalidation.bump();
    rig.signals.invalidation.bump();
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::sends(&GET_CHALLENGE), Dial::sends(&GET_CHALLENGE)]);

    rig.serve(&mut dialer, &board).unwrap();
    assert_eq!(rig.token.invalidations, 1);

    // No transition since: nothing more to drop.
    rig.serve(&mut dialer, &board).unwrap();
    assert_eq!(rig.token.invalidations, 1);
}

// ── Connect failures ──────────────────────────────────────────

#[test]
fn unreachable_peer_is_retried_after_backoff() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([
        Dial::Fail(DialError::Connect),
        Dial::sends(&GET_CHALLENGE),
    ]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Served { sw: 0x9000 });
    assert_eq!(*board.delays.borrow(), vec![5_000]);
    let dialed = dialer.dialed();
    assert_eq!(dialed.len(), 2);
    assert_eq!(dialed[0], dialed[1]);
    assert_eq!(rig.token.invalidations, 1);
    assert!(rig
        .sink
        .events
        .contains(&AppEvent::PeerUnreachable { backoff_ms: 5_000 }));
    assert_eq!(rig.session.stats().connect_failures, 1);
}

#[test]
fn link_loss_during_backoff_ends_the_cycle() {
    let mut rig = Rig::new(2);
    let board = VirtualBoard::new(&rig.signals);
    board.drop_link_at(1);
    let mut dialer = MockDialer::new([Dial::Fail(DialError::Connect)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::LinkLost);
    assert_eq!(dialer.dialed().len(), 1);
}

#[test]
fn socket_allocation_failure_is_fatal() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::Fail(DialError::Allocate)]);

    assert_eq!(
        rig.serve(&mut dialer, &board),
        Err(RestartReason::SocketAllocation)
    );
}

// ── Write failure ─────────────────────────────────────────────

#[test]
fn failed_write_aborts_the_session() {
    let mut rig = Rig::new(1);
    let signals = SharedSignals::new();
    let board = VirtualBoard::new(&signals);
    let mut dialer = MockDialer::new([Dial::drops_response(&GET_CHALLENGE)]);

    let outcome = rig.serve(&mut dialer, &board).unwrap();

    assert_eq!(outcome, CycleOutcome::WriteFailed);
    assert_eq!(rig.token.processed, vec![0x84]);
    assert_eq!(dialer.closes(), 1);
    assert_eq!(rig.session.stats().write_failures, 1);
    assert_eq!(rig.session.stats().served, 0);
    assert!(rig.sink.events.contains(&AppEvent::WriteFailed { ins: 0x84 }));
}

// ── Loop exit ─────────────────────────────────────────────────

#[test]
fn pending_restart_stops_new_work() {
    let mut rig = Rig::new(1);
    rig.signals.restart.request(RestartReason::HardReset);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([Dial::sends(&GET_CHALLENGE)]);

    let outcome = rig
        .session
        .serve_once(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Halted);
    assert!(dialer.dialed().is_empty());
}

#[test]
fn run_serves_until_a_fatal_error() {
    let mut rig = Rig::new(1);
    let board = VirtualBoard::new(&rig.signals);
    let mut dialer = MockDialer::new([
        Dial::sends(&GET_CHALLENGE),
        Dial::sends(&[]),
        Dial::Fail(DialError::Allocate),
    ]);

    let reason = rig
        .session
        .run(&mut dialer, &mut rig.token, &board, &rig.signals, &mut rig.sink);

    assert_eq!(reason, Some(RestartReason::SocketAllocation));
    assert_eq!(rig.session.stats().served, 1);
    assert_eq!(rig.session.stats().empty_exchanges, 1);
}
