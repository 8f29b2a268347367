//! Raw bytes → [`Command`].
//!
//! Accepts the four ISO 7816-3 cases in both short and extended length
//! encodings:
//!
//! ```text
//!   case 1   CLA INS P1 P2
//!   case 2S  CLA INS P1 P2 Le
//!   case 3S  CLA INS P1 P2 Lc data
//!   case 4S  CLA INS P1 P2 Lc data Le
//!   case 2E  CLA INS P1 P2 00 Le1 Le2
//!   case 3E  CLA INS P1 P2 00 Lc1 Lc2 data
//!   case 4E  CLA INS P1 P2 00 Lc1 Lc2 data Le1 Le2
//! ```
//!
//! Malformed input never errors out of [`parse`]; it yields the
//! end-of-exchange sentinel so the session simply closes.

use core::fmt;

use log::warn;

use super::{Command, MAX_COMMAND_DATA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer than four header bytes.
    TooShort,
    /// Lc / Le bytes do not match the received length.
    LengthMismatch,
    /// Command data exceeds [`MAX_COMMAND_DATA`].
    DataTooLong,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "header truncated"),
            Self::LengthMismatch => write!(f, "length fields do not match body"),
            Self::DataTooLong => write!(f, "command data too long"),
        }
    }
}

/// Parse a command, mapping malformed input to [`Command::none`].
pub fn parse(raw: &[u8]) -> Command {
    match try_parse(raw) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("APDU: {} ({} bytes), ending exchange", e, raw.len());
            Command::none()
        }
    }
}

/// Strict parse.  Empty input is the sentinel, not an error.
pub fn try_parse(raw: &[u8]) -> Result<Command, ParseError> {
    if raw.is_empty() {
        return Ok(Command::none());
    }
    if raw.len() < 4 {
        return Err(ParseError::TooShort);
    }

    let mut cmd = Command {
        cla: raw[0],
        ins: raw[1],
        p1: raw[2],
        p2: raw[3],
        p1p2: u16::from_be_bytes([raw[2], raw[3]]),
        ..Command::default()
    };

    let body = &raw[4..];
    match body {
        // case 1
        [] => {}
        // case 2S
        [le] => cmd.le = short_le(*le),
        // extended
        [0, rest @ ..] if rest.len() >= 2 => parse_extended(&mut cmd, rest)?,
        [0, _] => return Err(ParseError::LengthMismatch),
        // cases 3S / 4S
        [lc, rest @ ..] => {
            let lc = usize::from(*lc);
            if rest.len() == lc {
                set_data(&mut cmd, rest)?;
            } else if rest.len() == lc + 1 {
                set_data(&mut cmd, &rest[..lc])?;
                cmd.le = short_le(rest[lc]);
            } else {
                return Err(ParseError::LengthMismatch);
            }
        }
    }
    Ok(cmd)
}

fn parse_extended(cmd: &mut Command, rest: &[u8]) -> Result<(), ParseError> {
    let word = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
    let tail = &rest[2..];

    // case 2E
    if tail.is_empty() {
        cmd.le = extended_le(word);
        return Ok(());
    }

    let lc = word;
    if lc == 0 {
        return Err(ParseError::LengthMismatch);
    }
    if tail.len() == lc {
        set_data(cmd, tail)
    } else if tail.len() == lc + 2 {
        set_data(cmd, &tail[..lc])?;
        cmd.le = extended_le(usize::from(u16::from_be_bytes([tail[lc], tail[lc + 1]])));
        Ok(())
    } else {
        Err(ParseError::LengthMismatch)
    }
}

fn set_data(cmd: &mut Command, data: &[u8]) -> Result<(), ParseError> {
    if data.len() > MAX_COMMAND_DATA {
        return Err(ParseError::DataTooLong);
    }
    cmd.data
        .extend_from_slice(data)
        .map_err(|_| ParseError::DataTooLong)?;
    cmd.lc = data.len();
    Ok(())
}

fn short_le(b: u8) -> usize {
    if b == 0 { 256 } else { usize::from(b) }
}

fn extended_le(w: usize) -> usize {
    if w == 0 { 65_536 } else { w }
}
