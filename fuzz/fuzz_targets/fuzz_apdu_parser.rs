//! Fuzz target: `apdu::parser::parse`
//!
//! Drives arbitrary byte sequences through the command parser, asserting
//! that it never panics, that parsed data never exceeds the receive
//! buffer, and that malformed input always yields the INS 0x00 sentinel.
//!
//! cargo fuzz run fuzz_apdu_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use netkey::apdu::parser::{parse, try_parse};
use netkey::apdu::{MAX_COMMAND_DATA, RESPONSE_CAPACITY, Response};

fuzz_target!(|data: &[u8]| {
    let cmd = parse(data);
    assert!(cmd.data.len() <= MAX_COMMAND_DATA, "command data exceeds buffer");
    assert_eq!(cmd.lc, cmd.data.len());

    // Strict and lenient parse agree on well-formed input.
    if let Ok(strict) = try_parse(data) {
        assert_eq!(strict, cmd);
    } else {
        assert!(cmd.is_none(), "malformed input must yield the sentinel");
    }

    let mut response = Response::new();
    if response.push_data(&cmd.data).is_ok() {
        response.set_status(netkey::apdu::StatusWord::SUCCESS);
        assert!(response.len() <= RESPONSE_CAPACITY);
        assert!(response.status().is_some());
    }
});
