//! Connectivity manager: round-robin failover across candidate networks.
//!
//! ```text
//!               StationStarted
//!   ┌──────┐ ───────────────▶ ┌────────────┐  GotAddress  ┌────┐
//!   │ Down │                  │ Connecting │ ───────────▶ │ Up │
//!   └──────┘ ◀─────────────── └────────────┘              └────┘
//!      ▲        Disconnected       ▲   │ Disconnected        │
//!      │        (re-attempt)       └───┘ (next candidate)    │
//!      └─────────────────────── Disconnected ────────────────┘
//! ```
//!
//! Every attempt applies `networks[attempt_index]` and advances the index
//! modulo N, success or failure.  Failover is driven only by link-layer
//! events; application-level connect failures never advance it.
//!
//! Every link transition bumps the invalidation epoch *before* the link
//! flag changes, so the session loop always drops stale confirmation and
//! session state before its next gate evaluation.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{ConfigError, EventSink, StationError, StationPort};
use crate::config::{CandidateNetwork, MAX_NETWORKS};
use crate::signals::SharedSignals;

/// Link-layer notifications from the station driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station interface started; the first attempt may begin.
    StationStarted,
    /// DHCP assigned an address.
    GotAddress,
    /// Association failed or the link dropped.
    Disconnected { reason: u16 },
}

/// Depth of the driver → manager event queue.
pub const LINK_EVENT_DEPTH: usize = 8;

/// Station driver → connectivity task.
pub type LinkEventChannel = Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    Connecting,
    Up,
}

/// Snapshot of the manager's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    /// Candidate the next attempt will use.
    pub attempt_index: usize,
    /// Candidate the link is up on.  `Some` only while `Up`.
    pub current_index: Option<usize>,
    pub status: LinkStatus,
}

pub struct ConnectivityManager {
    networks: heapless::Vec<CandidateNetwork, MAX_NETWORKS>,
    state: ConnectivityState,
    /// Candidate of the in-progress or just-established attempt.
    in_flight: usize,
}

impl ConnectivityManager {
    pub fn new(networks: &[CandidateNetwork]) -> Result<Self, ConfigError> {
        if networks.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one candidate network is required",
            ));
        }
        let networks = heapless::Vec::from_slice(networks)
            .map_err(|_| ConfigError::ValidationFailed("too many candidate networks"))?;
        Ok(Self {
            networks,
            state: ConnectivityState {
                attempt_index: 0,
                current_index: None,
                status: LinkStatus::Down,
            },
            in_flight: 0,
        })
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn networks(&self) -> &[CandidateNetwork] {
        &self.networks
    }

    /// React to one link-layer event.
    ///
    /// A station error is returned to the caller; the coordinator treats it
    /// as fatal.
    pub fn handle<S, E>(
        &mut self,
        event: LinkEvent,
        station: &mut S,
        signals: &SharedSignals,
        sink: &mut E,
    ) -> Result<(), StationError>
    where
        S: StationPort,
        E: EventSink,
    {
        debug!("LINK: {:?} in {:?}", event, self.state.status);
        match event {
            LinkEvent::StationStarted => self.attempt(station, sink),

            LinkEvent::GotAddress => {
                let index = self.in_flight;
                self.state.status = LinkStatus::Up;
                self.state.current_index = Some(index);
                signals.invalidation.bump();
                signals.link.set_up(index);
                sink.emit(&AppEvent::LinkUp { index });
                Ok(())
            }

            LinkEvent::Disconnected { reason } => {
                if self.state.status == LinkStatus::Up {
                    warn!(
                        "LINK: lost '{}' (reason {})",
                        self.networks[self.in_flight].ssid, reason
                    );
                }
                self.state.status = LinkStatus::Down;
                self.state.current_index = None;
                signals.invalidation.bump();
                signals.link.set_down();
                sink.emit(&AppEvent::LinkDown { reason });
                self.attempt(station, sink)
            }
        }
    }

    /// Select, apply, advance, connect.
    fn attempt<S, E>(&mut self, station: &mut S, sink: &mut E) -> Result<(), StationError>
    where
        S: StationPort,
        E: EventSink,
    {
        let index = self.state.attempt_index;
        self.in_flight = index;
        self.state.attempt_index = (index + 1) % self.networks.len();
        self.state.status = LinkStatus::Connecting;

        let network = &self.networks[index];
        info!(
            "LINK: trying '{}' ({}/{})",
            network.ssid,
            index + 1,
            self.networks.len()
        );
        station.apply(network)?;
        sink.emit(&AppEvent::LinkAttempt { index });
        station.connect()
    }
}
