//! Mock adapters for integration tests.
//!
//! Everything records what the core asked of it, so tests can assert on
//! the full interaction history without sockets, radios or GPIO.  Time is
//! virtual: it only advances through `delay_ms`.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex};

use netkey::apdu::{Command, Response, StatusWord};
use netkey::app::events::AppEvent;
use netkey::app::ports::{
    ClockPort, CommandParser, CommandProcessor, Connection, DialError, Dialer, EventSink,
    IndicatorPort, Led, ProvisionError, Provisioner, StationError, StationPort, StorageError,
    StoragePort, TransportError, VolumeError, VolumePort,
};
use netkey::config::{CandidateNetwork, DeviceConfig};
use netkey::signals::SharedSignals;

// ── Config helpers ────────────────────────────────────────────

pub fn networks(n: usize) -> Vec<CandidateNetwork> {
    (0..n)
        .map(|i| CandidateNetwork::new(&format!("net{i}"), "", [10, 0, i as u8, 2]).unwrap())
        .collect()
}

pub fn config_with(n: usize) -> DeviceConfig {
    let mut cfg = DeviceConfig::default();
    cfg.networks = heapless::Vec::from_slice(&networks(n)).unwrap();
    cfg
}

// ── MemStore ──────────────────────────────────────────────────

/// Shared in-memory NVS.  Clones see the same data, like two handles on
/// one partition; a new boot is a new `MemStore` from the same `Arc`.
#[derive(Clone, Default)]
pub struct MemStore {
    data: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    pub fail_reads: Arc<Mutex<bool>>,
    pub fail_deletes: Arc<Mutex<bool>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        self.data
            .lock()
            .unwrap()
            .get(&(ns.to_string(), key.to_string()))
            .cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock().unwrap() = fail;
    }
}

impl StoragePort for MemStore {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StorageError::IoError);
        }
        let data = self.data.lock().unwrap();
        let v = data
            .get(&(ns.to_string(), key.to_string()))
            .ok_or(StorageError::NotFound)?;
        if v.len() > buf.len() {
            return Err(StorageError::IoError);
        }
        buf[..v.len()].copy_from_slice(v);
        Ok(v.len())
    }

    fn write(&mut self, ns: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.data
            .lock()
            .unwrap()
            .insert((ns.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(StorageError::IoError);
        }
        self.data
            .lock()
            .unwrap()
            .remove(&(ns.to_string(), key.to_string()));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.data
            .lock()
            .unwrap()
            .contains_key(&(ns.to_string(), key.to_string()))
    }
}

// ── VirtualBoard ──────────────────────────────────────────────

/// LEDs + clock.  `press_at` raises the confirm flag once virtual time
/// reaches it; `drop_link_at` takes the link down the same way.
pub struct VirtualBoard<'a> {
    pub signals: &'a SharedSignals,
    now: Cell<u64>,
    press_at: Cell<Option<u64>>,
    drop_link_at: Cell<Option<u64>>,
    pub leds: RefCell<Vec<(Led, bool)>>,
    pub delays: RefCell<Vec<u32>>,
}

impl<'a> VirtualBoard<'a> {
    pub fn new(signals: &'a SharedSignals) -> Self {
        Self {
            signals,
            now: Cell::new(0),
            press_at: Cell::new(None),
            drop_link_at: Cell::new(None),
            leds: RefCell::new(Vec::new()),
            delays: RefCell::new(Vec::new()),
        }
    }

    pub fn press_at(&self, ms: u64) {
        self.press_at.set(Some(ms));
    }

    pub fn drop_link_at(&self, ms: u64) {
        self.drop_link_at.set(Some(ms));
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn last(&self, led: Led) -> Option<bool> {
        self.leds
            .borrow()
            .iter()
            .rev()
            .find(|(l, _)| *l == led)
            .map(|(_, on)| *on)
    }

    pub fn writes(&self, led: Led) -> Vec<bool> {
        self.leds
            .borrow()
            .iter()
            .filter(|(l, _)| *l == led)
            .map(|(_, on)| *on)
            .collect()
    }
}

impl IndicatorPort for VirtualBoard<'_> {
    fn set(&self, led: Led, on: bool) {
        self.leds.borrow_mut().push((led, on));
    }
}

impl ClockPort for VirtualBoard<'_> {
    fn delay_ms(&self, ms: u32) {
        self.delays.borrow_mut().push(ms);
        let now = self.now.get() + u64::from(ms);
        self.now.set(now);
        if self.press_at.get().is_some_and(|at| now >= at) {
            self.press_at.set(None);
            self.signals.confirm.raise();
        }
        if self.drop_link_at.get().is_some_and(|at| now >= at) {
            self.drop_link_at.set(None);
            self.signals.invalidation.bump();
            self.signals.link.set_down();
        }
    }

    fn uptime_ms(&self) -> u64 {
        self.now.get()
    }
}

// ── Dialer / Connection ───────────────────────────────────────

#[derive(Debug, Default)]
pub struct Wire {
    pub dialed: Vec<SocketAddrV4>,
    pub written: Vec<Vec<u8>>,
    pub closes: u32,
}

/// One scripted dial outcome.
pub enum Dial {
    Fail(DialError),
    Peer {
        request: Vec<u8>,
        fail_read: bool,
        fail_write: bool,
    },
}

impl Dial {
    pub fn sends(request: &[u8]) -> Self {
        Self::Peer {
            request: request.to_vec(),
            fail_read: false,
            fail_write: false,
        }
    }

    pub fn drops_response(request: &[u8]) -> Self {
        Self::Peer {
            request: request.to_vec(),
            fail_read: false,
            fail_write: true,
        }
    }

    /// The peer resets the connection before sending anything.
    pub fn resets() -> Self {
        Self::Peer {
            request: Vec::new(),
            fail_read: true,
            fail_write: false,
        }
    }
}

#[derive(Default)]
pub struct MockDialer {
    script: VecDeque<Dial>,
    pub wire: Arc<Mutex<Wire>>,
}

impl MockDialer {
    pub fn new(script: impl IntoIterator<Item = Dial>) -> Self {
        Self {
            script: script.into_iter().collect(),
            wire: Arc::default(),
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.wire.lock().unwrap().written.clone()
    }

    pub fn dialed(&self) -> Vec<SocketAddrV4> {
        self.wire.lock().unwrap().dialed.clone()
    }

    pub fn closes(&self) -> u32 {
        self.wire.lock().unwrap().closes
    }
}

impl Dialer for MockDialer {
    type Conn = MockConn;

    fn dial(&mut self, peer: SocketAddrV4) -> Result<MockConn, DialError> {
        self.wire.lock().unwrap().dialed.push(peer);
        match self.script.pop_front() {
            None => Err(DialError::Connect),
            Some(Dial::Fail(e)) => Err(e),
            Some(Dial::Peer {
                request,
                fail_read,
                fail_write,
            }) => Ok(MockConn {
                request,
                fail_read,
                fail_write,
                wire: Arc::clone(&self.wire),
            }),
        }
    }
}

pub struct MockConn {
    request: Vec<u8>,
    fail_read: bool,
    fail_write: bool,
    wire: Arc<Mutex<Wire>>,
}

impl Connection for MockConn {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.fail_read {
            return Err(TransportError::Io);
        }
        let n = self.request.len().min(buf.len());
        buf[..n].copy_from_slice(&self.request[..n]);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_write {
            return Err(TransportError::Closed);
        }
        self.wire.lock().unwrap().written.push(data.to_vec());
        Ok(())
    }

    fn close(self) {
        self.wire.lock().unwrap().closes += 1;
    }
}

// ── MockToken ─────────────────────────────────────────────────

/// Answers every command with `DE AD 90 00` and records what it saw.
#[derive(Default)]
pub struct MockToken {
    pub processed: Vec<u8>,
    pub invalidations: u32,
    pub initializes: u32,
    pub restores: u32,
    pub fail_initialize: bool,
    pub fail_restore: bool,
}

pub const TOKEN_REPLY: [u8; 4] = [0xDE, 0xAD, 0x90, 0x00];

impl CommandParser for MockToken {}

impl CommandProcessor for MockToken {
    fn process(&mut self, command: &Command, response: &mut Response) {
        self.processed.push(command.ins);
        response.push_data(&TOKEN_REPLY[..2]).unwrap();
        response.set_status(StatusWord::SUCCESS);
    }

    fn invalidate(&mut self) {
        self.invalidations += 1;
    }
}

impl Provisioner for MockToken {
    fn initialize(&mut self) -> Result<(), ProvisionError> {
        self.initializes += 1;
        if self.fail_initialize {
            return Err(ProvisionError::Storage(StorageError::Full));
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), ProvisionError> {
        self.restores += 1;
        if self.fail_restore {
            return Err(ProvisionError::Corrupted);
        }
        Ok(())
    }
}

// ── Station / Volume / Sink ───────────────────────────────────

#[derive(Default)]
pub struct MockStation {
    pub applied: Vec<String>,
    pub connects: u32,
    pub fail_connect: bool,
}

impl StationPort for MockStation {
    fn apply(&mut self, network: &CandidateNetwork) -> Result<(), StationError> {
        self.applied.push(network.ssid.as_str().to_owned());
        Ok(())
    }

    fn connect(&mut self) -> Result<(), StationError> {
        if self.fail_connect {
            return Err(StationError::ConnectFailed(-1));
        }
        self.connects += 1;
        Ok(())
    }
}

pub struct MockVolume {
    pub mounted: bool,
    pub unmounts: u32,
}

impl MockVolume {
    pub fn mounted() -> Self {
        Self {
            mounted: true,
            unmounts: 0,
        }
    }
}

impl VolumePort for MockVolume {
    fn mount(&mut self) -> Result<(), VolumeError> {
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), VolumeError> {
        if !self.mounted {
            return Err(VolumeError::NotMounted);
        }
        self.mounted = false;
        self.unmounts += 1;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
