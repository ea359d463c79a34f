//! Per-request timeout enforcement. A handler that exceeds its deadline surfaces
//! `error_kind=timeout` (§7) rather than hanging the worker indefinitely.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::timeout;

pub async fn with_timeout<F>(duration: Duration, future: F) -> Result<F::Output>
where
    F: std::future::Future,
{
    timeout(duration, future)
        .await
        .map_err(|_| Error::Timeout(format!("operation exceeded {duration:?}")))
}
