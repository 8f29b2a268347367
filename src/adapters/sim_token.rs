//! Demo security token.
//!
//! A small command processor and provisioner standing in for a full
//! OpenPGP-card engine.  It is enough to drive every path of the session
//! loop end to end:
//!
//! | INS  | Command               | Behaviour                                   |
//! |------|-----------------------|---------------------------------------------|
//! | 0x84 | GET CHALLENGE         | `Le` random bytes                           |
//! | 0x20 | VERIFY                | PIN check, 3 retries, persisted counter     |
//! | 0x2A | PSO (9E9A, sign)      | HMAC-SHA256 over the data; needs VERIFY     |
//! | 0x88 | INTERNAL AUTHENTICATE | HMAC-SHA256 over the data                   |
//!
//! CLA 0x10 commands are buffered and prefixed to the next CLA 0x00
//! command, so only the terminal part of a chain reaches the gate.
//!
//! The 32-byte device secret is generated by `initialize` and kept in
//! the "token" NVS namespace; `restore` reloads it at boot.

use log::{debug, info, warn};

use crate::apdu::{
    Command, INS_GET_CHALLENGE, INS_INTERNAL_AUTHENTICATE,
    INS_PERFORM_SECURITY_OPERATION, INS_VERIFY, MAX_COMMAND_DATA, RESPONSE_CAPACITY, Response,
    StatusWord,
};
use crate::app::ports::{
    CommandParser, CommandProcessor, ProvisionError, Provisioner, StorageError, StoragePort,
};

pub const TOKEN_NAMESPACE: &str = "token";
const SECRET_KEY: &str = "secret";
const PIN_KEY: &str = "pin";
const RETRIES_KEY: &str = "pin_retries";

const SECRET_LEN: usize = 32;
const MAX_PIN_LEN: usize = 16;
pub const DEFAULT_PIN: &[u8] = b"123456";
pub const PIN_RETRIES: u8 = 3;

/// P1P2 of PSO: COMPUTE DIGITAL SIGNATURE.
const PSO_SIGN: u16 = 0x9E9A;

const LABEL_SIGN: &[u8] = b"netkey/pso";
const LABEL_AUTH: &[u8] = b"netkey/auth";

pub struct SimToken<S> {
    store: S,
    secret: Option<[u8; SECRET_LEN]>,
    pin: heapless::Vec<u8, MAX_PIN_LEN>,
    retries: u8,
    verified: bool,
    chain: heapless::Vec<u8, MAX_COMMAND_DATA>,
}

impl<S: StoragePort> SimToken<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            secret: None,
            pin: heapless::Vec::new(),
            retries: PIN_RETRIES,
            verified: false,
            chain: heapless::Vec::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    fn secret(&self) -> Option<&[u8; SECRET_LEN]> {
        self.secret.as_ref()
    }

    fn persist_retries(&mut self) {
        if let Err(e) = self.store.write(TOKEN_NAMESPACE, RETRIES_KEY, &[self.retries]) {
            warn!("TOKEN: retry counter not persisted: {}", e);
        }
    }

    // ── Instructions ──────────────────────────────────────────

    fn get_challenge(&mut self, command: &Command, response: &mut Response) {
        if command.le == 0 || command.le > RESPONSE_CAPACITY - 2 {
            response.reject(StatusWord::WRONG_LENGTH);
            return;
        }
        let mut buf = [0u8; RESPONSE_CAPACITY];
        fill_random(&mut buf[..command.le]);
        if response.push_data(&buf[..command.le]).is_err() {
            response.reject(StatusWord::WRONG_LENGTH);
            return;
        }
        response.set_status(StatusWord::SUCCESS);
    }

    fn verify(&mut self, data: &[u8], response: &mut Response) {
        if self.retries == 0 {
            response.reject(StatusWord::AUTH_METHOD_BLOCKED);
            return;
        }
        // Empty VERIFY queries the state.
        if data.is_empty() {
            let sw = if self.verified {
                StatusWord::SUCCESS
            } else {
                StatusWord::verify_failed(self.retries)
            };
            response.reject(sw);
            return;
        }
        if constant_time_eq(data, &self.pin) {
            self.verified = true;
            if self.retries != PIN_RETRIES {
                self.retries = PIN_RETRIES;
                self.persist_retries();
            }
            response.reject(StatusWord::SUCCESS);
        } else {
            self.verified = false;
            self.retries -= 1;
            self.persist_retries();
            warn!("TOKEN: wrong PIN, {} retries left", self.retries);
            response.reject(StatusWord::verify_failed(self.retries));
        }
    }

    fn sign(&mut self, command: &Command, data: &[u8], response: &mut Response) {
        if command.p1p2 != PSO_SIGN {
            response.reject(StatusWord::INCORRECT_P1P2);
            return;
        }
        if !self.verified {
            response.reject(StatusWord::SECURITY_STATUS_NOT_SATISFIED);
            return;
        }
        self.mac_response(LABEL_SIGN, data, response);
    }

    fn mac_response(&self, label: &[u8], data: &[u8], response: &mut Response) {
        if data.is_empty() {
            response.reject(StatusWord::WRONG_LENGTH);
            return;
        }
        let Some(secret) = self.secret() else {
            response.reject(StatusWord::SECURITY_STATUS_NOT_SATISFIED);
            return;
        };
        let mut mac = hmac_sha256::HMAC::new(secret);
        mac.update(label);
        mac.update(data);
        let tag = mac.finalize();
        if response.push_data(&tag).is_err() {
            response.reject(StatusWord::WRONG_LENGTH);
            return;
        }
        response.set_status(StatusWord::SUCCESS);
    }
}

impl<S: StoragePort> CommandParser for SimToken<S> {}

impl<S: StoragePort> CommandProcessor for SimToken<S> {
    fn process(&mut self, command: &Command, response: &mut Response) {
        response.clear();
        if self.secret.is_none() {
            response.reject(StatusWord::SECURITY_STATUS_NOT_SATISFIED);
            return;
        }

        if command.is_chained() {
            if self.chain.extend_from_slice(&command.data).is_err() {
                self.chain.clear();
                response.reject(StatusWord::WRONG_LENGTH);
            } else {
                response.reject(StatusWord::SUCCESS);
            }
            return;
        }
        if command.cla != 0x00 {
            self.chain.clear();
            response.reject(StatusWord::CLA_NOT_SUPPORTED);
            return;
        }

        // Terminal command: chained prefix + own data.
        let mut data: heapless::Vec<u8, MAX_COMMAND_DATA> = core::mem::take(&mut self.chain);
        if data.extend_from_slice(&command.data).is_err() {
            response.reject(StatusWord::WRONG_LENGTH);
            return;
        }

        match command.ins {
            INS_GET_CHALLENGE => self.get_challenge(command, response),
            INS_VERIFY => self.verify(&data, response),
            INS_PERFORM_SECURITY_OPERATION => self.sign(command, &data, response),
            INS_INTERNAL_AUTHENTICATE => self.mac_response(LABEL_AUTH, &data, response),
            other => {
                debug!("TOKEN: INS {:02X} not supported", other);
                response.reject(StatusWord::INS_NOT_SUPPORTED);
            }
        }
    }

    fn invalidate(&mut self) {
        if self.verified || !self.chain.is_empty() {
            debug!("TOKEN: session state dropped");
        }
        self.verified = false;
        self.chain.clear();
    }
}

impl<S: StoragePort> Provisioner for SimToken<S> {
    fn initialize(&mut self) -> Result<(), ProvisionError> {
        let mut secret = [0u8; SECRET_LEN];
        fill_random(&mut secret);
        self.store.write(TOKEN_NAMESPACE, SECRET_KEY, &secret)?;
        self.store.write(TOKEN_NAMESPACE, PIN_KEY, DEFAULT_PIN)?;
        self.store.write(TOKEN_NAMESPACE, RETRIES_KEY, &[PIN_RETRIES])?;

        self.secret = Some(secret);
        self.pin = heapless::Vec::from_slice(DEFAULT_PIN).map_err(|_| ProvisionError::Corrupted)?;
        self.retries = PIN_RETRIES;
        info!("TOKEN: device secret generated");
        Ok(())
    }

    fn restore(&mut self) -> Result<(), ProvisionError> {
        let mut secret = [0u8; SECRET_LEN];
        let len = match self.store.read(TOKEN_NAMESPACE, SECRET_KEY, &mut secret) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return Err(ProvisionError::MissingState),
            Err(e) => return Err(e.into()),
        };
        if len != SECRET_LEN {
            return Err(ProvisionError::Corrupted);
        }

        let mut pin = [0u8; MAX_PIN_LEN];
        let pin_len = match self.store.read(TOKEN_NAMESPACE, PIN_KEY, &mut pin) {
            Ok(0) => return Err(ProvisionError::Corrupted),
            Ok(n) => n,
            Err(StorageError::NotFound) => return Err(ProvisionError::MissingState),
            Err(e) => return Err(e.into()),
        };

        let mut retries = [PIN_RETRIES];
        match self.store.read(TOKEN_NAMESPACE, RETRIES_KEY, &mut retries) {
            Ok(1) | Err(StorageError::NotFound) => {}
            Ok(_) => return Err(ProvisionError::Corrupted),
            Err(e) => return Err(e.into()),
        }

        self.secret = Some(secret);
        self.pin = heapless::Vec::from_slice(&pin[..pin_len]).map_err(|_| ProvisionError::Corrupted)?;
        self.retries = retries[0].min(PIN_RETRIES);
        info!("TOKEN: device secret restored ({} PIN retries)", self.retries);
        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Platform-specific randomness ─────────────────────────────

/// Fill `buf` from the hardware RNG.
#[cfg(target_os = "espidf")]
fn fill_random(buf: &mut [u8]) {
    // SAFETY: esp_fill_random writes exactly `len` bytes into the buffer,
    // which is valid and exclusively borrowed.
    unsafe {
        esp_idf_svc::sys::esp_fill_random(buf.as_mut_ptr().cast(), buf.len());
    }
}

/// Simulation stub: `RandomState` gives non-cryptographic entropy.
#[cfg(not(target_os = "espidf"))]
fn fill_random(buf: &mut [u8]) {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    for chunk in buf.chunks_mut(8) {
        let val = RandomState::new().build_hasher().finish().to_le_bytes();
        chunk.copy_from_slice(&val[..chunk.len()]);
    }
}
