//! Connection Loop (§4.F): a single acceptor task over a Unix domain socket, backpressure
//! before each `accept`, and one worker task per connection reading a sequential
//! request/response stream (no pipelining) until the client closes or a read fails.

use crate::context::DaemonContext;
use crate::envelope::{self, ProtocolError, Response};
use crate::error::ErrorKind;
use crate::resource::{CONNECTION_CAP_DELAY, RESOURCE_VIOLATION_DELAY};
use crate::validator::Validator;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

pub struct Listener {
    socket: UnixListener,
    ctx: Arc<DaemonContext>,
}

impl Listener {
    /// Bind the daemon's Unix socket, removing a stale socket file left behind by a crashed
    /// prior process first (a fresh `bind` on an existing path otherwise fails with
    /// `AddrInUse`).
    pub fn bind(ctx: Arc<DaemonContext>) -> std::io::Result<Self> {
        let path = &ctx.config.socket_path;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let socket = UnixListener::bind(path)?;
        info!(socket = %path.display(), "bridged listening");
        Ok(Self { socket, ctx })
    }

    /// Run the accept loop forever. Each accepted connection is handled on its own spawned
    /// task; a failed `accept` is logged and retried rather than ending the daemon.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            while self.ctx.resources.connection_cap_reached(
                self.ctx.resources.in_flight(),
                self.ctx.config.max_concurrent_requests,
            ) {
                self.ctx.metrics.record_throttle();
                tokio::time::sleep(CONNECTION_CAP_DELAY).await;
            }
            while self.ctx.resources.is_throttling() {
                self.ctx.metrics.record_throttle();
                warn!("resource signal in violation, delaying accept");
                tokio::time::sleep(RESOURCE_VIOLATION_DELAY).await;
            }

            match self.socket.accept().await {
                Ok((stream, _addr)) => {
                    let ctx = self.ctx.clone();
                    let connection_id = uuid::Uuid::new_v4().to_string();
                    tokio::spawn(async move {
                        let span = tracing::info_span!("connection", id = %connection_id);
                        let _enter = span.enter();
                        info!("connection accepted");
                        handle_connection(stream, ctx).await;
                        info!("connection closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: Arc<DaemonContext>) {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let request = match envelope::read_request(&mut reader).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("client closed connection");
                return;
            }
            Err(ProtocolError::Timeout) => {
                warn!("read timed out");
                return;
            }
            Err(other) => {
                warn!(error = %other, "protocol error, closing connection");
                let response = Response::err(other.to_string(), ErrorKind::Protocol, None);
                let _ = envelope::write_response(&mut writer, &response).await;
                return;
            }
        };

        debug!(
            module = %request.module,
            function = %request.function,
            request_id = request.request_id.as_deref().unwrap_or(""),
            "request received"
        );

        let response = if request.module != "system" && ctx.resources.hard_ceiling_exceeded() {
            // §7: the accept-time backpressure delay (§4.C) has already failed to keep
            // concurrency within bounds. Rather than piling on another silent delay, this
            // request is turned away immediately with `error_kind=resource` — `system` calls
            // are exempt so `system.health`/`system.metrics` stay reachable during the
            // pathological overload they exist to diagnose.
            warn!("hard concurrency ceiling exceeded, rejecting request with a resource error");
            Response::err(
                "daemon is overloaded far beyond its concurrency limit".to_string(),
                ErrorKind::Resource,
                request.request_id.clone(),
            )
        } else {
            let _guard = ctx.resources.track_request();
            let validator = Validator::new(&ctx.manifest);
            match validator.validate(&request) {
                Err(e) => {
                    ctx.metrics.record_rejection();
                    Response::err(e.to_string(), e.kind(), request.request_id.clone())
                }
                Ok(()) => {
                    let started = std::time::Instant::now();
                    let response = ctx.dispatcher().dispatch(request.clone()).await;
                    ctx.metrics.record_request(
                        &format!("{}.{}", request.module, request.function),
                        started.elapsed(),
                        response.success,
                    );
                    response
                }
            }
        };

        info!(
            module = %request.module,
            function = %request.function,
            success = response.success,
            duration_ms = response.duration_ms.unwrap_or(0.0),
            "request completed"
        );

        if envelope::write_response(&mut writer, &response).await.is_err() {
            warn!("failed to write response, closing connection");
            return;
        }
    }
}
