//! # Telemetry and Observability
//!
//! Metrics collection and health-check surface for `bridged` (§4.I): request latency
//! percentiles, throttle/rejection counters, peak concurrency, and per-component health
//! status consumed by `system.metrics`/`system.health`.
//!
//! ## Features
//!
//! - **Prometheus-style Metrics**: Request counts, latencies, error rates
//! - **Health Checks**: Readiness and liveness probes
//! - **Structured Logging**: Integration with the `tracing` crate
//!
//! ## Example
//!
//! ```rust
//! use bridge_runtime::telemetry::{MetricsCollector, HealthCheck};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let collector = MetricsCollector::new();
//!
//! // Record a request
//! let start = std::time::Instant::now();
//! // ... handle request ...
//! collector.record_request("greet", start.elapsed(), true);
//!
//! // Check health
//! let health = HealthCheck::new();
//! assert!(health.is_healthy());
//! # }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Prometheus-compatible metrics collector
#[derive(Clone)]
pub struct MetricsCollector {
    /// Total requests by tool name
    request_counts: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Total errors by tool name
    error_counts: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Request latencies (sum in microseconds)
    latency_sums: Arc<dashmap::DashMap<String, AtomicU64>>,
    /// Individual dispatch durations in microseconds, for p50/p95/p99 (§4.I)
    latency_samples: Arc<Mutex<Vec<u64>>>,
    /// Requests delayed by the backpressure policy (§4.C)
    throttle_count: Arc<AtomicU64>,
    /// Requests rejected by the validator (§4.D)
    rejection_count: Arc<AtomicU64>,
    /// Highest concurrent-request count observed
    peak_concurrency: Arc<AtomicUsize>,
    /// Server start time
    start_time: Arc<Instant>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            request_counts: Arc::new(dashmap::DashMap::new()),
            error_counts: Arc::new(dashmap::DashMap::new()),
            latency_sums: Arc::new(dashmap::DashMap::new()),
            latency_samples: Arc::new(Mutex::new(Vec::new())),
            throttle_count: Arc::new(AtomicU64::new(0)),
            rejection_count: Arc::new(AtomicU64::new(0)),
            peak_concurrency: Arc::new(AtomicUsize::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }

    /// Record a request with latency and success status
    pub fn record_request(&self, tool: &str, latency: Duration, success: bool) {
        // Increment request count
        self.request_counts
            .entry(tool.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        // Record latency
        let micros = latency.as_micros() as u64;
        self.latency_sums
            .entry(tool.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(micros, Ordering::Relaxed);
        self.latency_samples
            .lock()
            .expect("metrics mutex poisoned")
            .push(micros);

        // Record error if applicable
        if !success {
            self.error_counts
                .entry(tool.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_throttle(&self) {
        self.throttle_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejection_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_concurrency(&self, current: usize) {
        self.peak_concurrency.fetch_max(current, Ordering::Relaxed);
    }

    pub fn throttle_count(&self) -> u64 {
        self.throttle_count.load(Ordering::Relaxed)
    }

    pub fn rejection_count(&self) -> u64 {
        self.rejection_count.load(Ordering::Relaxed)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrency.load(Ordering::Relaxed)
    }

    /// Percentile of dispatch duration in microseconds across every tool, linear-interpolated
    /// over the sorted sample set. `p` is in `[0.0, 1.0]`.
    pub fn latency_percentile_micros(&self, p: f64) -> Option<f64> {
        let mut samples = self
            .latency_samples
            .lock()
            .expect("metrics mutex poisoned")
            .clone();
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let rank = (p * (samples.len() - 1) as f64).round() as usize;
        Some(samples[rank.min(samples.len() - 1)] as f64)
    }

    /// Get total request count for a tool
    pub fn get_request_count(&self, tool: &str) -> u64 {
        self.request_counts
            .get(tool)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get total error count for a tool
    pub fn get_error_count(&self, tool: &str) -> u64 {
        self.error_counts
            .get(tool)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get average latency for a tool in microseconds
    pub fn get_avg_latency_micros(&self, tool: &str) -> Option<f64> {
        let count = self.get_request_count(tool);
        if count == 0 {
            return None;
        }

        let sum = self
            .latency_sums
            .get(tool)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0);

        Some(sum as f64 / count as f64)
    }

    /// Get error rate (0.0 to 1.0) for a tool
    pub fn get_error_rate(&self, tool: &str) -> f64 {
        let total = self.get_request_count(tool);
        if total == 0 {
            return 0.0;
        }

        let errors = self.get_error_count(tool);
        errors as f64 / total as f64
    }

    /// Total requests across every tool, the daemon-wide count `system.metrics` reports (§4.I).
    pub fn total_request_count(&self) -> u64 {
        self.request_counts
            .iter()
            .map(|e| e.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Total errors across every tool.
    pub fn total_error_count(&self) -> u64 {
        self.error_counts
            .iter()
            .map(|e| e.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Total successful requests across every tool.
    pub fn total_success_count(&self) -> u64 {
        self.total_request_count().saturating_sub(self.total_error_count())
    }

    /// Average dispatch latency in microseconds across every tool, the rolling average §4.I
    /// mandates alongside the p50/p95/p99 breakdown.
    pub fn avg_latency_micros(&self) -> Option<f64> {
        let samples = self.latency_samples.lock().expect("metrics mutex poisoned");
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        // Request count metric
        output.push_str("# HELP bridge_requests_total Total number of requests\n");
        output.push_str("# TYPE bridge_requests_total counter\n");
        for entry in self.request_counts.iter() {
            let count = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "bridge_requests_total{{tool=\"{}\"}} {}\n",
                entry.key(),
                count
            ));
        }

        // Error count metric
        output.push_str("# HELP bridge_errors_total Total number of errors\n");
        output.push_str("# TYPE bridge_errors_total counter\n");
        for entry in self.error_counts.iter() {
            let count = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "bridge_errors_total{{tool=\"{}\"}} {}\n",
                entry.key(),
                count
            ));
        }

        // Latency metric
        output.push_str("# HELP bridge_latency_microseconds_sum Sum of request latencies\n");
        output.push_str("# TYPE bridge_latency_microseconds_sum counter\n");
        for entry in self.latency_sums.iter() {
            let sum = entry.value().load(Ordering::Relaxed);
            output.push_str(&format!(
                "bridge_latency_microseconds_sum{{tool=\"{}\"}} {}\n",
                entry.key(),
                sum
            ));
        }

        // Uptime metric
        output.push_str("# HELP bridge_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE bridge_uptime_seconds gauge\n");
        output.push_str(&format!(
            "bridge_uptime_seconds {}\n",
            self.uptime_seconds()
        ));

        output
    }

    /// Get metrics summary as JSON
    pub fn export_json(&self) -> serde_json::Value {
        let mut tools = serde_json::Map::new();

        for entry in self.request_counts.iter() {
            let tool = entry.key();
            let requests = entry.value().load(Ordering::Relaxed);
            let errors = self.get_error_count(tool);
            let avg_latency = self.get_avg_latency_micros(tool);

            let mut tool_data = serde_json::Map::new();
            tool_data.insert("requests".to_string(), serde_json::json!(requests));
            tool_data.insert("errors".to_string(), serde_json::json!(errors));
            tool_data.insert(
                "error_rate".to_string(),
                serde_json::json!(self.get_error_rate(tool)),
            );
            if let Some(latency) = avg_latency {
                tool_data.insert("avg_latency_micros".to_string(), serde_json::json!(latency));
            }

            tools.insert(tool.clone(), serde_json::Value::Object(tool_data));
        }

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "tools": tools,
            "throttle_count": self.throttle_count(),
            "rejection_count": self.rejection_count(),
            "peak_concurrency": self.peak_concurrency(),
            "dispatch_duration_micros": {
                "p50": self.latency_percentile_micros(0.50),
                "p95": self.latency_percentile_micros(0.95),
                "p99": self.latency_percentile_micros(0.99),
            }
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Service is healthy and ready
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Convert to HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Health status
    pub status: HealthStatus,
    /// Optional message
    pub message: Option<String>,
    /// Check timestamp
    pub timestamp: SystemTime,
}

/// Health check aggregator
#[derive(Clone)]
pub struct HealthCheck {
    /// Component health status
    components: Arc<dashmap::DashMap<String, ComponentHealth>>,
    /// Server start time
    start_time: Arc<SystemTime>,
}

impl HealthCheck {
    /// Create a new health check
    pub fn new() -> Self {
        Self {
            components: Arc::new(dashmap::DashMap::new()),
            start_time: Arc::new(SystemTime::now()),
        }
    }

    /// Register a component health status
    pub fn register_component(&self, name: impl Into<String>, status: HealthStatus) {
        self.register_component_with_message(name, status, None);
    }

    /// Register a component with message
    pub fn register_component_with_message(
        &self,
        name: impl Into<String>,
        status: HealthStatus,
        message: Option<String>,
    ) {
        let name = name.into();
        self.components.insert(
            name.clone(),
            ComponentHealth {
                name,
                status,
                message,
                timestamp: SystemTime::now(),
            },
        );
    }

    /// Get overall health status
    pub fn get_status(&self) -> HealthStatus {
        if self.components.is_empty() {
            return HealthStatus::Healthy;
        }

        let mut has_degraded = false;
        for component in self.components.iter() {
            match component.status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Check if service is healthy
    pub fn is_healthy(&self) -> bool {
        self.get_status().is_healthy()
    }

    /// Export health status as JSON
    pub fn export_json(&self) -> serde_json::Value {
        let overall_status = self.get_status();
        let mut components = Vec::new();

        for entry in self.components.iter() {
            let health = entry.value();
            components.push(serde_json::json!({
                "name": health.name,
                "status": format!("{:?}", health.status),
                "message": health.message,
                "timestamp": health.timestamp
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs()
            }));
        }

        serde_json::json!({
            "status": format!("{:?}", overall_status),
            "uptime_seconds": SystemTime::now()
                .duration_since(*self.start_time)
                .unwrap_or_default()
                .as_secs(),
            "components": components
        })
    }

    /// Get component health
    pub fn get_component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.get(name).map(|c| c.clone())
    }

    /// Remove component
    pub fn remove_component(&self, name: &str) {
        self.components.remove(name);
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// Telemetry middleware for automatic metrics collection
pub struct TelemetryMiddleware {
    /// Metrics collector
    collector: MetricsCollector,
}

impl TelemetryMiddleware {
    /// Create new telemetry middleware
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }

    /// Get reference to metrics collector
    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}
