#![no_main]

use bridge_runtime::envelope::Request;
use bridge_runtime::handlers;
use bridge_runtime::validator::Validator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes parsed as a JSON request and run through the validator must never panic,
    // regardless of malformed identifiers, oversized params, or unknown module/function pairs.
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(request) = serde_json::from_str::<Request>(text) {
            let manifest = handlers::default_manifest();
            let validator = Validator::new(&manifest);
            let _ = validator.validate(&request);
        }
    }
});
