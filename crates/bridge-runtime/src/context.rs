//! The single process-wide object the connection loop, background monitor, and fallback
//! executor all share: registry, handle registry, resource manager, and metrics, constructed
//! once at startup and torn down on shutdown (§9 "Global mutable state").

use crate::dispatcher::Dispatcher;
use crate::handle::HandleRegistry;
use crate::registry::ModuleRegistry;
use crate::resource::{Limits, ResourceManager};
use crate::telemetry::{HealthCheck, MetricsCollector};
use bridge_config::{BridgeConfig, HandlerManifest};
use std::sync::Arc;

pub struct DaemonContext {
    pub config: BridgeConfig,
    pub manifest: HandlerManifest,
    pub modules: Arc<ModuleRegistry>,
    pub handles: Arc<HandleRegistry>,
    pub resources: Arc<ResourceManager>,
    pub metrics: MetricsCollector,
    pub health: HealthCheck,
}

impl DaemonContext {
    /// Builds the context's own metrics/health/resources once, then hands clones of those
    /// exact instances to `build_modules` so the registered `system` module (§4.I) reports on
    /// the same state the connection loop and background monitor record into, not a second,
    /// disconnected set.
    pub fn new(
        config: BridgeConfig,
        manifest: HandlerManifest,
        build_modules: impl FnOnce(MetricsCollector, HealthCheck, Arc<ResourceManager>) -> ModuleRegistry,
    ) -> Self {
        let handles = Arc::new(HandleRegistry::new(config.state_dir.clone()));
        let resources = Arc::new(ResourceManager::new(Limits {
            max_concurrent_requests: config.max_concurrent_requests,
            max_requests_per_minute: config.max_requests_per_minute,
            max_memory_mb: config.max_memory_mb,
            max_cpu_percent: config.max_cpu_percent,
        }));
        let metrics = MetricsCollector::new();
        let health = HealthCheck::new();
        health.register_component("daemon", crate::telemetry::HealthStatus::Healthy);

        let modules = build_modules(metrics.clone(), health.clone(), resources.clone());

        Self {
            config,
            manifest,
            modules: Arc::new(modules),
            handles,
            resources,
            metrics,
            health,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.modules.clone(), self.handles.clone())
    }
}
