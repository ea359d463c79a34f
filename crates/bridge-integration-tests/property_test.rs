//! Property-based tests for the daemon's envelope, validator, and resource-manager contracts.
//!
//! Run with: cargo test --test property --release -- --test-threads=1

use bridge_config::{is_well_formed_identifier, HandlerManifest, ModuleManifest};
use bridge_runtime::envelope::{Request, Response};
use bridge_runtime::error::ErrorKind;
use bridge_runtime::resource::{Limits, ResourceManager};
use bridge_runtime::validator::Validator;
use proptest::prelude::*;
use std::sync::Arc;

fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,19}"
}

fn arb_params() -> impl Strategy<Value = serde_json::Map<String, serde_json::Value>> {
    prop::collection::hash_map("[a-z][a-z0-9_]{0,10}", "[a-zA-Z0-9 ]{0,20}", 0..5).prop_map(
        |fields| {
            fields
                .into_iter()
                .map(|(k, v)| (k, serde_json::json!(v)))
                .collect()
        },
    )
}

fn arb_request() -> impl Strategy<Value = Request> {
    (arb_identifier(), arb_identifier(), arb_params()).prop_map(|(module, function, params)| {
        Request {
            module,
            function,
            params,
            request_id: Some("r".to_string()),
        }
    })
}

proptest! {
    /// Property 1 (envelope invariant, serialization half): every request the generator
    /// produces survives an encode/decode round trip with its module, function, and
    /// request_id unchanged.
    #[test]
    fn request_round_trips_through_json(request in arb_request()) {
        let value = serde_json::to_value(&request).unwrap();
        let parsed: Request = serde_json::from_value(value).unwrap();
        prop_assert_eq!(parsed.module, request.module);
        prop_assert_eq!(parsed.function, request.function);
        prop_assert_eq!(parsed.request_id, request.request_id);
    }

    /// Property 1: `success` is always boolean and `result` is present exactly when the
    /// envelope reports success (the daemon never emits a success envelope without a result,
    /// nor attaches a result to a failure envelope).
    #[test]
    fn ok_and_err_envelopes_never_mix_their_fields(message in "[a-zA-Z0-9 ]{1,40}") {
        let ok = Response::ok(serde_json::json!({"value": 1}), 0.5, None);
        prop_assert!(ok.success);
        prop_assert!(ok.result.is_some());
        prop_assert!(ok.error.is_none());

        let err = Response::err(message, ErrorKind::Handler, None);
        prop_assert!(!err.success);
        prop_assert!(err.result.is_none());
        prop_assert!(err.error.is_some());
    }

    /// Property 5: a function name built by embedding a forbidden-looking substring (e.g.
    /// "exec") inside an otherwise allow-listed identifier like `execute_immediate` must
    /// never be rejected purely because of the substring — whole-name matching only.
    #[test]
    fn whole_identifier_matching_ignores_forbidden_substrings(prefix in "[a-z]{0,10}", suffix in "[a-z]{0,10}") {
        let function = format!("{prefix}execute_immediate{suffix}");
        let manifest = HandlerManifest::new(vec![ModuleManifest::new(
            "database",
            ["execute_immediate".to_string()],
        )]);
        let validator = Validator::new(&manifest);

        let request = Request {
            module: "database".to_string(),
            function: function.clone(),
            params: serde_json::Map::new(),
            request_id: None,
        };

        let result = validator.validate(&request);
        if function == "execute_immediate" {
            prop_assert!(result.is_ok());
        } else {
            // any decorated variant is a *different* identifier and must be rejected, but
            // never silently accepted because it merely *contains* the allow-listed name.
            prop_assert!(result.is_err());
        }
    }

    /// Property 5, converse: well-formed identifiers that are not allow-listed at all are
    /// always rejected as a security error.
    #[test]
    fn non_allow_listed_identifiers_are_always_rejected(module in arb_identifier(), function in arb_identifier()) {
        let manifest = HandlerManifest::new(vec![ModuleManifest::new(
            "database",
            ["execute_immediate".to_string()],
        )]);
        let validator = Validator::new(&manifest);

        prop_assume!(!(module == "database" && function == "execute_immediate"));

        let request = Request {
            module,
            function,
            params: serde_json::Map::new(),
            request_id: None,
        };

        let result = validator.validate(&request);
        prop_assert!(result.is_err());
        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::Security);
    }

    /// Well-formed identifiers are exactly those matching the daemon's identifier grammar;
    /// generated lowercase-alnum-underscore strings always pass.
    #[test]
    fn generated_identifiers_are_well_formed(name in arb_identifier()) {
        prop_assert!(is_well_formed_identifier(&name));
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    /// Property 3 (sliding window accuracy): after tracking N requests in quick succession,
    /// `requests_per_minute` reports exactly N, since all N timestamps fall within the
    /// trailing 60-second window.
    #[test]
    fn requests_per_minute_counts_recent_requests_exactly(n in 0usize..50) {
        let manager = Arc::new(ResourceManager::new(Limits {
            max_concurrent_requests: 1000,
            max_requests_per_minute: 10_000,
            max_memory_mb: 1024,
            max_cpu_percent: 800.0,
        }));

        let mut guards = Vec::with_capacity(n);
        for _ in 0..n {
            guards.push(manager.track_request());
        }

        prop_assert_eq!(manager.requests_per_minute(), n);

        // Property 2 (counter conservation): dropping every guard returns in-flight to zero.
        drop(guards);
        prop_assert_eq!(manager.in_flight(), 0);
    }
}
