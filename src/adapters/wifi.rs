//! WiFi station-mode adapter.
//!
//! Implements [`StationPort`]: the connectivity manager applies one
//! candidate network at a time and asks for a connection.  Outcomes come
//! back asynchronously as [`LinkEvent`]s pushed into the link channel
//! from the system event loop.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` for configuration; raw
//!   `esp_event` handlers forward `STA_START`, `STA_DISCONNECTED` and
//!   `STA_GOT_IP` into the channel.
//! - **all other targets**: a simulated station that reports an address
//!   for every connect.
//!
//! No reconnect policy lives here.  Every disconnect goes straight to the
//! connectivity manager, which moves on to the next candidate.

use log::{info, warn};

use crate::app::ports::{StationError, StationPort};
use crate::config::CandidateNetwork;
use crate::connectivity::{LinkEvent, LinkEventChannel};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    sys::*,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

/// Queue `event` for the link task.
///
/// When the queue is full the backlog collapses to a pending
/// `StationStarted` (if any) followed by `event`, so the newest link state
/// is never the one lost.
fn forward(events: &LinkEventChannel, event: LinkEvent) {
    if events.try_send(event).is_ok() {
        return;
    }
    let mut started = false;
    let mut dropped = 0usize;
    while let Ok(queued) = events.try_receive() {
        started |= queued == LinkEvent::StationStarted;
        dropped += 1;
    }
    warn!(
        "WiFi: link event queue full, collapsed {} queued event(s) behind {:?}",
        dropped, event
    );
    if started && event != LinkEvent::StationStarted {
        let _ = events.try_send(LinkEvent::StationStarted);
    }
    let _ = events.try_send(event);
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF station
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: EspWifi<'static>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Create the station driver and hook its events into `events`.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        events: &'static LinkEventChannel,
    ) -> Result<Self, StationError> {
        let wifi =
            EspWifi::new(modem, sysloop, None).map_err(|e| StationError::InvalidConfig(e.code()))?;

        let arg = events as *const LinkEventChannel as *mut core::ffi::c_void;
        // SAFETY: `events` is 'static, so the handler argument never dangles.
        unsafe {
            let ret = esp_event_handler_register(
                WIFI_EVENT,
                ESP_EVENT_ANY_ID,
                Some(on_wifi_event),
                arg,
            );
            if ret != ESP_OK as i32 {
                return Err(StationError::InvalidConfig(ret));
            }
            let ret = esp_event_handler_register(
                IP_EVENT,
                ip_event_t_IP_EVENT_STA_GOT_IP as i32,
                Some(on_ip_event),
                arg,
            );
            if ret != ESP_OK as i32 {
                return Err(StationError::InvalidConfig(ret));
            }
        }
        info!("WiFi(espidf): station driver created");
        Ok(Self { wifi })
    }

    /// Start the driver.  `STA_START` follows and kicks off the first attempt.
    pub fn start(&mut self) -> Result<(), StationError> {
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .map_err(|e| StationError::InvalidConfig(e.code()))?;
        self.wifi
            .start()
            .map_err(|e| StationError::ConnectFailed(e.code()))
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_wifi_event(
    arg: *mut core::ffi::c_void,
    _base: esp_event_base_t,
    id: i32,
    data: *mut core::ffi::c_void,
) {
    // SAFETY: `arg` is the 'static channel registered in `new`.
    let events = unsafe { &*(arg as *const LinkEventChannel) };
    if id == wifi_event_t_WIFI_EVENT_STA_START as i32 {
        forward(events, LinkEvent::StationStarted);
    } else if id == wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32 {
        // SAFETY: the event loop passes a `wifi_event_sta_disconnected_t`
        // for this id.
        let reason = unsafe { (*(data as *const wifi_event_sta_disconnected_t)).reason };
        forward(
            events,
            LinkEvent::Disconnected {
                reason: u16::from(reason),
            },
        );
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_ip_event(
    arg: *mut core::ffi::c_void,
    _base: esp_event_base_t,
    _id: i32,
    _data: *mut core::ffi::c_void,
) {
    // SAFETY: `arg` is the 'static channel registered in `new`.
    let events = unsafe { &*(arg as *const LinkEventChannel) };
    forward(events, LinkEvent::GotAddress);
}

#[cfg(target_os = "espidf")]
impl StationPort for WifiAdapter {
    fn apply(&mut self, network: &CandidateNetwork) -> Result<(), StationError> {
        let auth_method = if network.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: network
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidConfig(ESP_ERR_INVALID_ARG as i32))?,
            password: network
                .password
                .as_str()
                .try_into()
                .map_err(|_| StationError::InvalidConfig(ESP_ERR_INVALID_ARG as i32))?,
            auth_method,
            ..Default::default()
        };
        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|e| StationError::InvalidConfig(e.code()))
    }

    fn connect(&mut self) -> Result<(), StationError> {
        self.wifi
            .connect()
            .map_err(|e| StationError::ConnectFailed(e.code()))
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Simulated station: every connect succeeds and yields an address.
#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    events: &'static LinkEventChannel,
    ssid: heapless::String<32>,
    attempts: u32,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new(events: &'static LinkEventChannel) -> Self {
        Self {
            events,
            ssid: heapless::String::new(),
            attempts: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), StationError> {
        info!("WiFi(sim): station started");
        forward(self.events, LinkEvent::StationStarted);
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(not(target_os = "espidf"))]
impl StationPort for WifiAdapter {
    fn apply(&mut self, network: &CandidateNetwork) -> Result<(), StationError> {
        self.ssid.clone_from(&network.ssid);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), StationError> {
        if self.ssid.is_empty() {
            return Err(StationError::InvalidConfig(-1));
        }
        self.attempts = self.attempts.wrapping_add(1);
        info!(
            "WiFi(sim): associated with '{}' (attempt {})",
            self.ssid, self.attempts
        );
        forward(self.events, LinkEvent::GotAddress);
        Ok(())
    }
}
