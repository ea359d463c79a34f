//! Metrics & Logging Surface (§4.I): the reserved `system` module. Always registered and
//! read-only; its functions go through the same allow-list check as any other module (§4.D),
//! so `default_manifest()` must list each one explicitly.

use crate::handler::{HandlerModule, SimpleModule};
use crate::resource::{ResourceManager, Signal};
use crate::telemetry::{HealthCheck, HealthStatus, MetricsCollector};
use std::sync::Arc;

pub const MODULE_NAME: &str = "system";
pub const FUNCTIONS: &[&str] = &["ping", "metrics", "health", "version"];

/// Build the `system` module bound to this daemon's shared metrics and health state.
pub fn build(
    metrics: MetricsCollector,
    health: HealthCheck,
    resources: Arc<ResourceManager>,
) -> Arc<dyn HandlerModule> {
    let mut module = SimpleModule::new(MODULE_NAME);

    module = module.with_function(
        "ping",
        Arc::new(|_params, _handles| async move { Ok(serde_json::json!({"ok": true})) }),
    );

    {
        let metrics = metrics.clone();
        let resources = resources.clone();
        module = module.with_function(
            "metrics",
            Arc::new(move |_params, _handles| {
                let metrics = metrics.clone();
                let resources = resources.clone();
                async move { Ok(metrics_snapshot(&metrics, &resources)) }
            }),
        );
    }

    {
        let health = health.clone();
        let resources = resources.clone();
        module = module.with_function(
            "health",
            Arc::new(move |_params, _handles| {
                let health = health.clone();
                let resources = resources.clone();
                async move { Ok(health_snapshot(&health, &resources)) }
            }),
        );
    }

    module = module.with_function(
        "version",
        Arc::new(|_params, _handles| async move {
            Ok(serde_json::json!({"version": env!("CARGO_PKG_VERSION")}))
        }),
    );

    Arc::new(module)
}

/// The `system.metrics` snapshot: total requests/successes/failures, rolling latency
/// percentiles, current/peak concurrency, current memory/CPU, throttle and rejection counts.
fn metrics_snapshot(
    metrics: &MetricsCollector,
    resources: &ResourceManager,
) -> serde_json::Value {
    serde_json::json!({
        "uptime_seconds": metrics.uptime_seconds(),
        "total_requests": metrics.total_request_count(),
        "total_successes": metrics.total_success_count(),
        "total_failures": metrics.total_error_count(),
        "current_concurrency": resources.in_flight(),
        "peak_concurrency": metrics.peak_concurrency(),
        "requests_per_minute": resources.requests_per_minute(),
        "throttle_count": metrics.throttle_count(),
        "rejection_count": metrics.rejection_count(),
        "dispatch_duration_micros": {
            "avg": metrics.avg_latency_micros(),
            "p50": metrics.latency_percentile_micros(0.50),
            "p95": metrics.latency_percentile_micros(0.95),
            "p99": metrics.latency_percentile_micros(0.99),
        },
        "memory_mb": {
            "p50": resources.memory_percentile_mb(0.50),
            "p95": resources.memory_percentile_mb(0.95),
            "p99": resources.memory_percentile_mb(0.99),
        },
        "cpu_percent": {
            "p50": resources.cpu_percentile_percent(0.50),
            "p95": resources.cpu_percentile_percent(0.95),
            "p99": resources.cpu_percentile_percent(0.99),
        },
    })
}

/// The `system.health` derived ok/degraded/critical view: component health plus a verdict on
/// whether any resource signal is in violation right now.
fn health_snapshot(health: &HealthCheck, resources: &ResourceManager) -> serde_json::Value {
    let throttling = resources.is_throttling();
    let status = if throttling && health.get_status() == HealthStatus::Healthy {
        HealthStatus::Degraded
    } else {
        health.get_status()
    };

    let mut value = health.export_json();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("status".to_string(), serde_json::json!(format!("{status:?}")));
        obj.insert("throttling".to_string(), serde_json::json!(throttling));
        obj.insert(
            "signals".to_string(),
            serde_json::json!({
                "concurrency": format!("{:?}", resources.classify(Signal::Concurrency)),
                "request_rate": format!("{:?}", resources.classify(Signal::RequestRate)),
                "memory": format!("{:?}", resources.classify(Signal::Memory)),
                "cpu": format!("{:?}", resources.classify(Signal::Cpu)),
            }),
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Limits;

    fn limits() -> Limits {
        Limits {
            max_concurrent_requests: 100,
            max_requests_per_minute: 2000,
            max_memory_mb: 1024,
            max_cpu_percent: 200.0,
        }
    }

    #[tokio::test]
    async fn ping_reports_ok() {
        let module = build(
            MetricsCollector::new(),
            HealthCheck::new(),
            Arc::new(ResourceManager::new(limits())),
        );
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        let result = module
            .function("ping")
            .unwrap()
            .call(serde_json::Map::new(), handles)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn metrics_reports_current_concurrency() {
        let resources = Arc::new(ResourceManager::new(limits()));
        let _guard = resources.track_request();
        let module = build(MetricsCollector::new(), HealthCheck::new(), resources);
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        let result = module
            .function("metrics")
            .unwrap()
            .call(serde_json::Map::new(), handles)
            .await
            .unwrap();
        assert_eq!(result["current_concurrency"], 1);
    }

    #[tokio::test]
    async fn metrics_reports_aggregate_totals_and_rolling_average() {
        let metrics = MetricsCollector::new();
        metrics.record_request("database.connect", std::time::Duration::from_micros(100), true);
        metrics.record_request("http.request", std::time::Duration::from_micros(300), false);

        let module = build(metrics, HealthCheck::new(), Arc::new(ResourceManager::new(limits())));
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        let result = module
            .function("metrics")
            .unwrap()
            .call(serde_json::Map::new(), handles)
            .await
            .unwrap();

        assert_eq!(result["total_requests"], 2);
        assert_eq!(result["total_successes"], 1);
        assert_eq!(result["total_failures"], 1);
        assert_eq!(result["dispatch_duration_micros"]["avg"], 200.0);
    }

    #[tokio::test]
    async fn health_degrades_under_throttling() {
        let resources = Arc::new(ResourceManager::new(Limits {
            max_concurrent_requests: 1,
            ..limits()
        }));
        let _guard = resources.track_request();
        let health = HealthCheck::new();
        health.register_component("daemon", HealthStatus::Healthy);
        let module = build(MetricsCollector::new(), health, resources);
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        let result = module
            .function("health")
            .unwrap()
            .call(serde_json::Map::new(), handles)
            .await
            .unwrap();
        assert_eq!(result["status"], "Degraded");
        assert_eq!(result["throttling"], true);
    }

    #[tokio::test]
    async fn version_reports_crate_version() {
        let module = build(
            MetricsCollector::new(),
            HealthCheck::new(),
            Arc::new(ResourceManager::new(limits())),
        );
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        let result = module
            .function("version")
            .unwrap()
            .call(serde_json::Map::new(), handles)
            .await
            .unwrap();
        assert_eq!(result["version"], env!("CARGO_PKG_VERSION"));
    }
}
