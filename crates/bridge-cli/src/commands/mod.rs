pub mod call;
pub mod health;
pub mod serve;

use bridge_config::BridgeConfig;
use bridge_runtime::resource::{Limits, ResourceManager};
use bridge_runtime::telemetry::{HealthCheck, MetricsCollector};
use bridge_runtime::{default_manifest, default_modules, ModuleRegistry};
use std::sync::Arc;

/// The module registry and allow-list every subcommand wires the same way: the reference
/// `system`/`database`/`ssh`/`http`/`xml` modules, bound to a resource manager sized from the
/// daemon config.
pub fn wiring(config: &BridgeConfig) -> (bridge_config::HandlerManifest, ModuleRegistry) {
    let resources = Arc::new(ResourceManager::new(Limits {
        max_concurrent_requests: config.max_concurrent_requests,
        max_requests_per_minute: config.max_requests_per_minute,
        max_memory_mb: config.max_memory_mb,
        max_cpu_percent: config.max_cpu_percent,
    }));
    let modules = default_modules(MetricsCollector::new(), HealthCheck::new(), resources);
    (default_manifest(), modules)
}

/// Parse a `--param key=value` argument into a `(key, json value)` pair. The value is parsed
/// as JSON when possible (so `--param limit=5` and `--param active=true` produce numbers and
/// booleans), falling back to a plain JSON string otherwise.
pub fn parse_param(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--param must be in the form key=value, got: {raw}"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::json!(value));
    Ok((key.to_string(), value))
}
