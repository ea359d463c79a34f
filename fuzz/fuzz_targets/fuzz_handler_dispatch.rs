#![no_main]

use bridge_runtime::handlers;
use bridge_runtime::resource::{Limits, ResourceManager};
use bridge_runtime::telemetry::{HealthCheck, MetricsCollector};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Arbitrary module-name lookups against the default registry must never panic, regardless
    // of whether the name is registered, empty, or absurdly long.
    let resources = Arc::new(ResourceManager::new(Limits {
        max_concurrent_requests: 100,
        max_requests_per_minute: 2000,
        max_memory_mb: 1024,
        max_cpu_percent: 200.0,
    }));
    let modules = handlers::default_modules(MetricsCollector::new(), HealthCheck::new(), resources);

    if let Ok(name) = std::str::from_utf8(data) {
        let _ = modules.get(name);
        if let Some(module) = modules.get("system") {
            let _ = module.function(name);
        }
    }

    let _ = modules.get("");
    let long_name = "a".repeat(10_000);
    let _ = modules.get(&long_name);
});
