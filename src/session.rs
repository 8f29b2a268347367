//! Session loop: one outbound connection, one command, one response.
//!
//! ```text
//!   wait link up ──▶ dial peer:port ──┬─ Allocate ──▶ fatal (restart)
//!        ▲                            ├─ Connect  ──▶ invalidate, backoff, redial
//!        │                            ▼
//!        │                       read once ──▶ parse
//!        │                            │  INS 00 ──▶ invalidate, close ─────┐
//!        │                            ▼                                    │
//!        │                     confirmation gate                           │
//!        │                   locked out │   │ passed / bypassed            │
//!        │                    69 83 ◀───┘   ▼                              │
//!        │                         │    process (activity LED on)          │
//!        │                         ▼        │                              │
//!        │                      write response ── fails ──▶ close ─────────┤
//!        │                              │                                  │
//!        └────────────────────────── close ◀───────────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::apdu::{Command, Hex, RECV_BUFFER_SIZE, Response};
use crate::app::events::AppEvent;
use crate::app::ports::{
    ClockPort, CommandParser, CommandProcessor, Connection, DialError, Dialer, EventSink,
    IndicatorPort, Led,
};
use crate::config::{CandidateNetwork, DeviceConfig, MAX_NETWORKS};
use crate::diagnostics::{ChallengeTiming, SessionStats};
use crate::gate::{self, ConfirmationGate, GateOutcome};
use crate::restart::RestartReason;
use crate::signals::{EpochCursor, SharedSignals};

/// How one cycle of the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A processed response was written; carries its status word.
    Served { sw: u16 },
    /// The gate timed out; the lockout response was written.
    LockedOut,
    /// The peer sent nothing to process; closed without a response.
    Empty,
    /// Reading the command failed; closed without a response.
    ReadFailed,
    /// Writing the response failed; session aborted.
    WriteFailed,
    /// The link dropped while the peer was unreachable.
    LinkLost,
    /// A restart is pending; no new work was started.
    Halted,
}

pub struct SessionLoop {
    gate: ConfirmationGate,
    networks: heapless::Vec<CandidateNetwork, MAX_NETWORKS>,
    peer_port: u16,
    connect_backoff_ms: u32,
    lockout_warn_threshold: u32,
    cursor: EpochCursor,
    stats: SessionStats,
    timing: ChallengeTiming,
    recv: [u8; RECV_BUFFER_SIZE],
}

impl SessionLoop {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            gate: ConfirmationGate::new(config.confirm),
            networks: config.networks.clone(),
            peer_port: config.peer_port,
            connect_backoff_ms: config.connect_backoff_ms,
            lockout_warn_threshold: config.lockout_warn_threshold,
            cursor: EpochCursor::new(),
            stats: SessionStats::default(),
            timing: ChallengeTiming::default(),
            recv: [0; RECV_BUFFER_SIZE],
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn challenge_timing(&self) -> ChallengeTiming {
        self.timing
    }

    /// Serve cycles until a fatal condition or a pending restart.
    ///
    /// Returns the fatal reason, or `None` if another task already
    /// requested the restart.
    pub fn run<D, T, B, E>(
        &mut self,
        dialer: &mut D,
        token: &mut T,
        board: &B,
        signals: &SharedSignals,
        sink: &mut E,
    ) -> Option<RestartReason>
    where
        D: Dialer,
        T: CommandParser + CommandProcessor,
        B: IndicatorPort + ClockPort,
        E: EventSink,
    {
        info!("SESSION: serving peers on port {}", self.peer_port);
        loop {
            match self.serve_once(dialer, token, board, signals, sink) {
                Ok(CycleOutcome::Halted) => return None,
                Ok(outcome) => debug!("SESSION: cycle ended {:?}", outcome),
                Err(reason) => return Some(reason),
            }
        }
    }

    /// One full cycle: wait for the link, then one exchange with the peer.
    pub fn serve_once<D, T, B, E>(
        &mut self,
        dialer: &mut D,
        token: &mut T,
        board: &B,
        signals: &SharedSignals,
        sink: &mut E,
    ) -> Result<CycleOutcome, RestartReason>
    where
        D: Dialer,
        T: CommandParser + CommandProcessor,
        B: IndicatorPort + ClockPort,
        E: EventSink,
    {
        if signals.restart.is_halting() {
            return Ok(CycleOutcome::Halted);
        }
        let index = signals.link.block_until_up();

        let Some(network) = self.networks.get(index) else {
            error!("SESSION: link up on unknown candidate {}", index);
            return Err(RestartReason::StationDriver);
        };
        let peer = network.peer_addr(self.peer_port);

        // ── Connect ─────────────────────────────────────────────
        let mut conn = loop {
            if signals.restart.is_halting() {
                return Ok(CycleOutcome::Halted);
            }
            match dialer.dial(peer) {
                Ok(conn) => break conn,
                Err(DialError::Allocate) => {
                    error!("SESSION: {}", DialError::Allocate);
                    return Err(RestartReason::SocketAllocation);
                }
                Err(DialError::Connect) => {
                    self.stats.connect_failures = self.stats.connect_failures.wrapping_add(1);
                    token.invalidate();
                    sink.emit(&AppEvent::PeerUnreachable {
                        backoff_ms: self.connect_backoff_ms,
                    });
                    board.delay_ms(self.connect_backoff_ms);
                    if signals.link.current() != Some(index) {
                        return Ok(CycleOutcome::LinkLost);
                    }
                }
            }
        };
        debug!("SESSION: connected to {}", peer);

        // ── Receive ─────────────────────────────────────────────
        let received = match conn.read(&mut self.recv) {
            Ok(n) => n,
            Err(e) => {
                warn!("SESSION: read failed: {}", e);
                token.invalidate();
                conn.close();
                return Ok(CycleOutcome::ReadFailed);
            }
        };
        let raw = &self.recv[..received];
        debug!("APDU <- {}", Hex(raw));
        let command = token.parse(raw);

        // Link transitions since the last cycle drop session state first.
        if self.cursor.advance(&signals.invalidation) {
            debug!("SESSION: link changed, invalidating session state");
            token.invalidate();
        }

        if command.is_none() {
            token.invalidate();
            conn.close();
            self.stats.empty_exchanges = self.stats.empty_exchanges.wrapping_add(1);
            sink.emit(&AppEvent::ExchangeEmpty);
            return Ok(CycleOutcome::Empty);
        }

        // ── Gate + process ──────────────────────────────────────
        if command.requires_confirmation() {
            sink.emit(&AppEvent::ConfirmationPending { ins: command.ins });
        }
        let started = board.uptime_ms();
        let (response, locked) = match self.gate.evaluate(&command, &signals.confirm, board) {
            GateOutcome::LockedOut => {
                let consecutive = self.stats.record_lockout();
                if consecutive >= self.lockout_warn_threshold {
                    warn!(
                        "SESSION: {} consecutive confirmation lockouts",
                        consecutive
                    );
                }
                sink.emit(&AppEvent::LockedOut {
                    ins: command.ins,
                    consecutive,
                });
                (gate::lockout_response(), true)
            }
            outcome => {
                if let GateOutcome::Confirmed { waited_ms } = outcome {
                    self.stats.record_confirmed();
                    sink.emit(&AppEvent::Confirmed {
                        ins: command.ins,
                        waited_ms,
                    });
                }
                (self.process(&command, token, board), false)
            }
        };
        debug!("APDU -> {}", Hex(response.as_bytes()));

        // ── Respond ─────────────────────────────────────────────
        if let Err(e) = conn.write_all(response.as_bytes()) {
            warn!("SESSION: write failed: {}", e);
            self.stats.write_failures = self.stats.write_failures.wrapping_add(1);
            sink.emit(&AppEvent::WriteFailed { ins: command.ins });
            conn.close();
            return Ok(CycleOutcome::WriteFailed);
        }
        conn.close();

        if locked {
            return Ok(CycleOutcome::LockedOut);
        }
        let sw = response.status().map_or(0, |sw| sw.0);
        self.stats.record_served();
        sink.emit(&AppEvent::Served {
            ins: command.ins,
            sw,
            len: response.len(),
            elapsed_ms: board.uptime_ms().saturating_sub(started),
        });
        Ok(CycleOutcome::Served { sw })
    }

    /// Hand the command to the processor with the activity LED lit.
    fn process<T, B>(&mut self, command: &Command, token: &mut T, board: &B) -> Response
    where
        T: CommandProcessor,
        B: IndicatorPort + ClockPort,
    {
        let mut response = Response::new();
        board.set(Led::Activity, true);
        let started = board.uptime_ms();
        token.process(command, &mut response);
        let elapsed = board.uptime_ms().saturating_sub(started);
        board.set(Led::Activity, false);

        if command.is_get_challenge() {
            self.timing.record(elapsed);
        }
        response
    }
}
