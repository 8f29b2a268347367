//! Command / response model (ISO 7816-4 APDUs).
//!
//! ```text
//!   ┌─────┬─────┬────┬────┬────────┬──────────┬────────┐
//!   │ CLA │ INS │ P1 │ P2 │ Lc (.) │ data (.) │ Le (.) │
//!   └─────┴─────┴────┴────┴────────┴──────────┴────────┘
//!   response:  [ data ... ] SW1 SW2
//! ```
//!
//! The core only classifies commands (sensitive or not, end of exchange or
//! not); everything else is opaque and handed to the command processor.

pub mod parser;

use core::fmt;

/// Receive buffer size of one exchange.
pub const RECV_BUFFER_SIZE: usize = 1024;
/// Maximum command data length accepted.
pub const MAX_COMMAND_DATA: usize = RECV_BUFFER_SIZE;
/// Maximum response length, status word included.
pub const RESPONSE_CAPACITY: usize = 1024;

// ── Class / instruction bytes ───────────────────────────────────

/// Class byte of a non-terminal part of a chained command.
pub const CLA_CHAINED: u8 = 0x10;

/// Sentinel: no command / end of exchange.
pub const INS_NONE: u8 = 0x00;
pub const INS_VERIFY: u8 = 0x20;
pub const INS_PERFORM_SECURITY_OPERATION: u8 = 0x2A;
pub const INS_GET_CHALLENGE: u8 = 0x84;
pub const INS_INTERNAL_AUTHENTICATE: u8 = 0x88;

/// Instructions that need physical confirmation.
pub const SENSITIVE_INSTRUCTIONS: [u8; 2] = [INS_INTERNAL_AUTHENTICATE, INS_PERFORM_SECURITY_OPERATION];

// ── Status words ────────────────────────────────────────────────

/// Two-byte trailer of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const SUCCESS: Self = Self(0x9000);
    pub const WRONG_LENGTH: Self = Self(0x6700);
    pub const SECURITY_STATUS_NOT_SATISFIED: Self = Self(0x6982);
    /// Authentication method blocked.  Sent when confirmation times out.
    pub const AUTH_METHOD_BLOCKED: Self = Self(0x6983);
    pub const WRONG_DATA: Self = Self(0x6A80);
    pub const INCORRECT_P1P2: Self = Self(0x6A86);
    pub const INS_NOT_SUPPORTED: Self = Self(0x6D00);
    pub const CLA_NOT_SUPPORTED: Self = Self(0x6E00);

    /// `63Cx`: verification failed, `x` retries left.
    pub const fn verify_failed(retries: u8) -> Self {
        Self(0x63C0 | (retries & 0x0F) as u16)
    }

    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

// ── Command ─────────────────────────────────────────────────────

/// A parsed command.  `Command::default()` is the end-of-exchange sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    /// `P1 << 8 | P2`.
    pub p1p2: u16,
    /// Length of `data` (Lc).
    pub lc: usize,
    pub data: heapless::Vec<u8, MAX_COMMAND_DATA>,
    /// Expected response length (Le), 0 if absent.
    pub le: usize,
}

impl Command {
    /// The "nothing to process" sentinel.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.ins == INS_NONE
    }

    /// Non-terminal part of a chained command.
    pub fn is_chained(&self) -> bool {
        self.cla == CLA_CHAINED
    }

    /// Sensitive iff the instruction is a security operation and the
    /// command is not a chained continuation.
    pub fn requires_confirmation(&self) -> bool {
        SENSITIVE_INSTRUCTIONS.contains(&self.ins) && !self.is_chained()
    }

    pub fn is_get_challenge(&self) -> bool {
        self.cla == 0x00 && self.ins == INS_GET_CHALLENGE
    }
}

// ── Response ────────────────────────────────────────────────────

/// Error returned when a response would exceed [`RESPONSE_CAPACITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOverflow;

/// Bounded response buffer.  Owned by the session loop for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    data: heapless::Vec<u8, RESPONSE_CAPACITY>,
}

impl Response {
    pub const fn new() -> Self {
        Self {
            data: heapless::Vec::new(),
        }
    }

    /// A response carrying only a status word.
    pub fn from_status(sw: StatusWord) -> Self {
        let mut r = Self::new();
        r.set_status(sw);
        r
    }

    /// The fixed lockout response `{0x69, 0x83}`.
    pub fn locked_out() -> Self {
        Self::from_status(StatusWord::AUTH_METHOD_BLOCKED)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn push_data(&mut self, bytes: &[u8]) -> Result<(), ResponseOverflow> {
        // Keep room for the status word.
        if self.data.len() + bytes.len() + 2 > RESPONSE_CAPACITY {
            return Err(ResponseOverflow);
        }
        self.data.extend_from_slice(bytes).map_err(|_| ResponseOverflow)
    }

    /// Append the status word.  Always fits after a successful `push_data`.
    pub fn set_status(&mut self, sw: StatusWord) {
        let _ = self.data.extend_from_slice(&sw.to_bytes());
    }

    /// Replace the contents with a bare status word.
    pub fn reject(&mut self, sw: StatusWord) {
        self.clear();
        self.set_status(sw);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Trailing status word, if the response has one.
    pub fn status(&self) -> Option<StatusWord> {
        let n = self.data.len();
        if n < 2 {
            return None;
        }
        Some(StatusWord(u16::from_be_bytes([self.data[n - 2], self.data[n - 1]])))
    }
}

/// Hex rendering for `debug!` tracing of commands and responses.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
