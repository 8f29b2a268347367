//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the logger
//! (UART / USB-CDC on the device, stderr on the host).  Stateless, so
//! every task gets its own copy.

use log::{info, warn};

use crate::apdu::StatusWord;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::LinkAttempt { index } => {
                info!("LINK | connecting candidate={}", index);
            }
            AppEvent::LinkUp { index } => {
                info!("LINK | up candidate={}", index);
            }
            AppEvent::LinkDown { reason } => {
                warn!("LINK | down reason={}", reason);
            }
            AppEvent::Lifecycle { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::PeerUnreachable { backoff_ms } => {
                warn!("PEER | unreachable, retry in {}ms", backoff_ms);
            }
            AppEvent::ExchangeEmpty => {
                info!("APDU | empty exchange");
            }
            AppEvent::ConfirmationPending { ins } => {
                info!("GATE | INS {:02X} waiting for button", ins);
            }
            AppEvent::Confirmed { ins, waited_ms } => {
                info!("GATE | INS {:02X} confirmed after {}ms", ins, waited_ms);
            }
            AppEvent::LockedOut { ins, consecutive } => {
                warn!("GATE | INS {:02X} locked out (consecutive={})", ins, consecutive);
            }
            AppEvent::Served {
                ins,
                sw,
                len,
                elapsed_ms,
            } => {
                info!(
                    "APDU | served INS {:02X} | SW={} | {}B | {}ms",
                    ins,
                    StatusWord(*sw),
                    len,
                    elapsed_ms
                );
            }
            AppEvent::WriteFailed { ins } => {
                warn!("APDU | response to INS {:02X} not written", ins);
            }
            AppEvent::HardResetRequested => {
                warn!("RESET | hard reset requested");
            }
            AppEvent::RestartRequested(reason) => {
                warn!("RESTART | requested: {}", reason);
            }
        }
    }
}
