//! Link-status indicator task.
//!
//! | Link  | Link LED                                   |
//! |-------|--------------------------------------------|
//! | Down  | toggles every `link_blink_ms`              |
//! | Up    | lit once on the up edge, then left alone   |
//!
//! While the link is up the LED belongs to whoever else drives it (the
//! confirmation prompt pulses it), so this task writes it only on the edge.

use crate::app::ports::{ClockPort, IndicatorPort, Led};
use crate::signals::SharedSignals;

pub struct LinkIndicator {
    blink_ms: u32,
    lit: bool,
    was_up: bool,
}

impl LinkIndicator {
    pub fn new(blink_ms: u32) -> Self {
        Self {
            blink_ms,
            lit: false,
            was_up: false,
        }
    }

    /// Advance one period.
    pub fn tick<I: IndicatorPort>(&mut self, link_up: bool, leds: &I) {
        if link_up {
            if !self.was_up {
                self.lit = true;
                leds.set(Led::Link, true);
            }
        } else {
            self.lit = !self.lit;
            leds.set(Led::Link, self.lit);
        }
        self.was_up = link_up;
    }

    /// Tick every `blink_ms` until a restart is pending.
    pub fn run<B>(&mut self, board: &B, signals: &SharedSignals)
    where
        B: IndicatorPort + ClockPort,
    {
        while !signals.restart.is_halting() {
            self.tick(signals.link.is_up(), board);
            board.delay_ms(self.blink_ms);
        }
    }
}
