//! Reference handler modules (§10.6): `system` (always registered, §4.I) plus the four
//! illustrative external-collaborator modules the spec names without fixing their internals —
//! `database`, `ssh`, `http`, `xml`.

pub mod database;
pub mod http;
pub mod ssh;
pub mod system;
pub mod xml;

use crate::registry::ModuleRegistry;
use crate::resource::ResourceManager;
use crate::telemetry::{HealthCheck, MetricsCollector};
use bridge_config::{HandlerManifest, ModuleManifest};
use std::sync::Arc;

/// Build the module registry this daemon serves: `system` bound to the daemon's own shared
/// metrics/health/resource state, plus the stateless reference modules. A deployment that wants
/// fewer or different external modules assembles its own `ModuleRegistry` instead of calling
/// this; it exists purely as the default wiring for `bridge-cli serve` and the fallback executor.
pub fn default_modules(
    metrics: MetricsCollector,
    health: HealthCheck,
    resources: Arc<ResourceManager>,
) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(system::build(metrics, health, resources));
    registry.register(database::build());
    registry.register(ssh::build());
    registry.register(http::build());
    registry.register(xml::build());
    registry
}

/// The allow-list matching [`default_modules`]: every function each reference module
/// actually exports, published the way the validator (§4.D) expects — a per-module function
/// list, not a substring pattern.
pub fn default_manifest() -> HandlerManifest {
    HandlerManifest::new(vec![
        ModuleManifest::new(system::MODULE_NAME, owned(system::FUNCTIONS)),
        ModuleManifest::new(database::MODULE_NAME, owned(database::FUNCTIONS)),
        ModuleManifest::new(ssh::MODULE_NAME, owned(ssh::FUNCTIONS)),
        ModuleManifest::new(http::MODULE_NAME, owned(http::FUNCTIONS)),
        ModuleManifest::new(xml::MODULE_NAME, owned(xml::FUNCTIONS)),
    ])
}

fn owned(functions: &[&str]) -> Vec<String> {
    functions.iter().map(|s| s.to_string()).collect()
}
