//! Confirmation gate: physical approval of security-sensitive commands.
//!
//! ```text
//!   sensitive?  ──no──▶ Bypassed
//!      │yes
//!      ▼
//!   clear confirm flag
//!   repeat `iterations` times:            ┌─ both LEDs on  (half period)
//!      confirmed? ──yes──▶ Confirmed      └─ both LEDs off (half period)
//!   confirmed at deadline? ──yes──▶ Confirmed
//!   otherwise ──▶ LockedOut  (session answers 69 83)
//! ```
//!
//! The confirm flag is raised by the button ISR and consumed here exactly
//! once.  A flag raised before the gate starts never counts: the gate
//! clears it first.

use log::{debug, info};

use crate::apdu::{Command, Response};
use crate::app::ports::{ClockPort, IndicatorPort, Led};
use crate::config::ConfirmPolicy;
use crate::signals::ConfirmFlag;

/// How a gate evaluation resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The command is not sensitive; no wait happened.
    Bypassed,
    /// The operator confirmed after `waited_ms`.
    Confirmed { waited_ms: u64 },
    /// The deadline elapsed without confirmation.
    LockedOut,
}

impl GateOutcome {
    /// `true` if the command may be handed to the processor.
    pub fn permits(self) -> bool {
        !matches!(self, Self::LockedOut)
    }
}

pub struct ConfirmationGate {
    policy: ConfirmPolicy,
}

impl ConfirmationGate {
    pub fn new(policy: ConfirmPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConfirmPolicy {
        self.policy
    }

    /// Classify `command` and, if sensitive, run the bounded wait.
    pub fn evaluate<B>(&self, command: &Command, confirm: &ConfirmFlag, board: &B) -> GateOutcome
    where
        B: IndicatorPort + ClockPort,
    {
        if !command.requires_confirmation() {
            return GateOutcome::Bypassed;
        }
        info!(
            "GATE: INS {:02X} needs confirmation ({} ms)",
            command.ins,
            self.policy.deadline_ms()
        );
        self.await_confirmation(confirm, board)
    }

    /// The bounded wait itself, with the pulsing prompt.
    pub fn await_confirmation<B>(&self, confirm: &ConfirmFlag, board: &B) -> GateOutcome
    where
        B: IndicatorPort + ClockPort,
    {
        confirm.clear();
        let started = board.uptime_ms();
        let half = self.policy.half_period_ms;

        let mut confirmed = false;
        for _ in 0..self.policy.iterations {
            if confirm.take() {
                confirmed = true;
                break;
            }
            board.set(Led::Activity, true);
            board.set(Led::Link, true);
            board.delay_ms(half);
            board.set(Led::Activity, false);
            board.set(Led::Link, false);
            board.delay_ms(half);
        }
        // A press during the final pulse still lands before the deadline.
        if !confirmed {
            confirmed = confirm.take();
        }

        // Prompt over: the link is still up, so its LED goes back to steady.
        board.set(Led::Link, true);

        let waited_ms = board.uptime_ms().saturating_sub(started);
        if confirmed {
            debug!("GATE: confirmed after {} ms", waited_ms);
            GateOutcome::Confirmed { waited_ms }
        } else {
            info!("GATE: no confirmation after {} ms, locked out", waited_ms);
            GateOutcome::LockedOut
        }
    }
}

/// Response sent in place of processing when the gate locks out.
pub fn lockout_response() -> Response {
    Response::locked_out()
}
