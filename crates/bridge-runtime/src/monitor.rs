//! Background Monitor (§4.G): a periodic task, independent of any client connection, that
//! keeps the resource sampler fresh and sweeps handles nobody has touched in a while.

use crate::context::DaemonContext;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, info, warn};

/// Spawn the monitor loop on the current Tokio runtime. Returns the task handle so callers
/// (tests, graceful shutdown) can abort it; dropping the handle does not stop the task.
pub fn spawn(ctx: Arc<DaemonContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(ctx: Arc<DaemonContext>) {
    let mut system = System::new();
    let mut ticker = tokio::time::interval(ctx.config.resource_check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tick(&ctx, &mut system).await;
    }
}

async fn tick(ctx: &Arc<DaemonContext>, system: &mut System) {
    ctx.resources.refresh_sample(system);
    ctx.metrics.observe_concurrency(ctx.resources.in_flight());

    if ctx.resources.is_throttling() {
        warn!("resource monitor: daemon is throttling on at least one signal");
    } else {
        debug!(
            in_flight = ctx.resources.in_flight(),
            requests_per_minute = ctx.resources.requests_per_minute(),
            "resource monitor: sampled"
        );
    }

    let released = ctx.handles.sweep(ctx.config.stale_timeout).await;
    if !released.is_empty() {
        info!(count = released.len(), "resource monitor: swept stale handles");
    }
}
