//! Resource Manager: concurrency counter, sliding-window rate limiter, OS memory/CPU sampler,
//! and the warning/violation classification that drives the connection loop's backpressure
//! policy (§4.C).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Concurrency,
    RequestRate,
    Memory,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Ok,
    Warning,
    Violation,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_concurrent_requests: usize,
    pub max_requests_per_minute: usize,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
}

const WARNING_FRACTION: f64 = 0.8;
const RATE_WINDOW: Duration = Duration::from_secs(60);
pub const CONNECTION_CAP_DELAY: Duration = Duration::from_millis(100);
pub const RESOURCE_VIOLATION_DELAY: Duration = Duration::from_millis(1000);

/// §3's "resource-sample record" retention window for percentile reporting.
const SAMPLE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy)]
struct Sample {
    taken_at: Instant,
    memory_bytes: u64,
    cpu_percent: f64,
}

/// Tracks the four signals in §4.C and classifies each as ok/warning/violation. Shared across
/// every worker task behind an `Arc`; counter operations are O(1) so they never become a
/// contention point even under the heaviest load the concurrency cap allows.
pub struct ResourceManager {
    limits: Limits,
    in_flight: AtomicUsize,
    request_timestamps: Mutex<VecDeque<Instant>>,
    latest_sample: Mutex<Sample>,
    /// Bounded ~5 minute ring of memory/CPU samples (§3) backing percentile reporting in
    /// `system.metrics`, distinct from `latest_sample`'s single current reading.
    sample_ring: Mutex<VecDeque<Sample>>,
    pid: Pid,
}

/// RAII guard returned by [`ResourceManager::track_request`]; decrements the in-flight
/// counter when dropped, including on panic or early return, guaranteeing conservation
/// (testable property 2).
pub struct RequestGuard {
    manager: Arc<ResourceManager>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.manager.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ResourceManager {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            in_flight: AtomicUsize::new(0),
            request_timestamps: Mutex::new(VecDeque::new()),
            latest_sample: Mutex::new(Sample {
                taken_at: Instant::now(),
                memory_bytes: 0,
                cpu_percent: 0.0,
            }),
            sample_ring: Mutex::new(VecDeque::new()),
            pid: sysinfo::get_current_pid().unwrap_or(Pid::from(0)),
        }
    }

    /// Increment the concurrency counter and append a timestamp to the rate-limit window.
    /// Returns a guard that decrements the counter on drop.
    pub fn track_request(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.request_timestamps
            .lock()
            .expect("resource manager mutex poisoned")
            .push_back(Instant::now());
        RequestGuard {
            manager: self.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Prune the sliding window to `[now-60s, now]` and return its length — the count of
    /// requests accepted in the trailing 60 seconds (testable property 3).
    pub fn requests_per_minute(&self) -> usize {
        let mut timestamps = self
            .request_timestamps
            .lock()
            .expect("resource manager mutex poisoned");
        let cutoff = Instant::now() - RATE_WINDOW;
        while matches!(timestamps.front(), Some(t) if *t < cutoff) {
            timestamps.pop_front();
        }
        timestamps.len()
    }

    /// Refresh the OS memory/CPU sample. Called by the background monitor on its cadence.
    /// Updates both the single current reading used by `classify` and the retained ring used
    /// for percentile reporting.
    pub fn refresh_sample(&self, system: &mut System) {
        system.refresh_process(self.pid);
        let (memory_bytes, cpu_percent) = system
            .process(self.pid)
            .map(|p| (p.memory(), p.cpu_usage() as f64))
            .unwrap_or((0, 0.0));
        let taken = Sample {
            taken_at: Instant::now(),
            memory_bytes,
            cpu_percent,
        };

        *self
            .latest_sample
            .lock()
            .expect("resource manager mutex poisoned") = taken;

        let mut ring = self
            .sample_ring
            .lock()
            .expect("resource manager mutex poisoned");
        ring.push_back(taken);
        let cutoff = Instant::now() - SAMPLE_WINDOW;
        while matches!(ring.front(), Some(s) if s.taken_at < cutoff) {
            ring.pop_front();
        }
    }

    /// A percentile (0.0-1.0) over the retained memory samples, in megabytes. `None` if no
    /// sample has been taken yet.
    pub fn memory_percentile_mb(&self, p: f64) -> Option<f64> {
        let ring = self
            .sample_ring
            .lock()
            .expect("resource manager mutex poisoned");
        percentile_of(ring.iter().map(|s| (s.memory_bytes / (1024 * 1024)) as f64), p)
    }

    /// A percentile (0.0-1.0) over the retained CPU samples, in percent.
    pub fn cpu_percentile_percent(&self, p: f64) -> Option<f64> {
        let ring = self
            .sample_ring
            .lock()
            .expect("resource manager mutex poisoned");
        percentile_of(ring.iter().map(|s| s.cpu_percent), p)
    }

    pub fn classify(&self, signal: Signal) -> Level {
        let (current, limit) = match signal {
            Signal::Concurrency => (
                self.in_flight() as f64,
                self.limits.max_concurrent_requests as f64,
            ),
            Signal::RequestRate => (
                self.requests_per_minute() as f64,
                self.limits.max_requests_per_minute as f64,
            ),
            Signal::Memory => {
                let sample = self
                    .latest_sample
                    .lock()
                    .expect("resource manager mutex poisoned");
                (
                    (sample.memory_bytes / (1024 * 1024)) as f64,
                    self.limits.max_memory_mb as f64,
                )
            }
            Signal::Cpu => {
                let sample = self
                    .latest_sample
                    .lock()
                    .expect("resource manager mutex poisoned");
                (sample.cpu_percent, self.limits.max_cpu_percent)
            }
        };
        classify_value(current, limit)
    }

    /// True if any signal is currently in violation — the daemon-wide "throttling" state.
    pub fn is_throttling(&self) -> bool {
        [
            Signal::Concurrency,
            Signal::RequestRate,
            Signal::Memory,
            Signal::Cpu,
        ]
        .into_iter()
        .any(|signal| self.classify(signal) == Level::Violation)
    }

    pub fn connection_cap_reached(&self, current_connections: usize, cap: usize) -> bool {
        let _ = self;
        current_connections >= cap
    }

    /// §7's "reserved for pathological overloads" case: when concurrency has run past this
    /// multiple of the configured limit, the accept-time backpressure delay (§4.C) has already
    /// failed to keep the daemon within bounds — an already-accepted connection's next request
    /// gets `error_kind=resource` immediately instead of another silent delay.
    pub fn hard_ceiling_exceeded(&self) -> bool {
        self.in_flight() as f64 >= HARD_CEILING_MULTIPLIER * self.limits.max_concurrent_requests as f64
    }
}

const HARD_CEILING_MULTIPLIER: f64 = 1.5;

/// Nearest-rank percentile over an iterator of samples, matching `telemetry.rs`'s latency
/// percentile shape so `system.metrics` reports memory/CPU percentiles the same way it reports
/// dispatch-latency percentiles.
fn percentile_of(values: impl Iterator<Item = f64>, p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let index = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    Some(sorted[index.min(sorted.len() - 1)])
}

fn classify_value(current: f64, limit: f64) -> Level {
    if current >= limit {
        Level::Violation
    } else if current >= WARNING_FRACTION * limit {
        Level::Warning
    } else {
        Level::Ok
    }
}
