#![no_main]

use bridge_runtime::envelope;
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes fed straight into the wire framing reader: malformed length headers,
    // truncated bodies, and invalid JSON must all be rejected as a `ProtocolError`, never a
    // panic.
    let mut cursor = Cursor::new(data.to_vec());
    let _ = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(envelope::read_message(&mut cursor));
});
