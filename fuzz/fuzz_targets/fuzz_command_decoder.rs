//! Fuzz target: `protocol::decode`
//!
//! Drives arbitrary byte sequences into the command decoder and asserts
//! that it never panics and that every accepted `Set` names a pin that
//! fits the registry's name buffer.  Accepted commands must decode the
//! same way a second time.
//!
//! cargo fuzz run fuzz_command_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinlink::app::protocol::{decode, Command};
use pinlink::app::registry::MAX_PIN_NAME_LEN;

fuzz_target!(|data: &[u8]| {
    let first = decode(data);
    if let Ok(Command::Set { pin, .. }) = &first {
        assert!(pin.len() <= MAX_PIN_NAME_LEN);
    }
    if first.is_ok() {
        assert_eq!(first, decode(data));
    }
});
