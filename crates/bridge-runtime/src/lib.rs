//! # bridge-runtime
//!
//! The execution engine for `bridged`, the long-lived helper daemon that exposes module-level
//! operations (database sessions, SSH sessions, HTTP requests, XML parsing) to short-lived
//! client processes over a local Unix socket.
//!
//! This crate provides: the wire envelope and framing ([`envelope`]), the session/handle
//! registry with on-disk restoration ([`handle`]), the resource monitor and backpressure
//! policy ([`resource`]), the request validator ([`validator`]), the dispatcher with its
//! double-layered success envelope ([`dispatcher`]), the connection-acceptance loop
//! ([`server`]), the background sweeper ([`monitor`]), the fallback single-shot executor
//! ([`fallback`]), and the bundled reference handler modules ([`handlers`]).
//!
//! ## Quick start
//!
//! ```no_run
//! use bridge_config::BridgeConfig;
//! use bridge_runtime::context::DaemonContext;
//! use bridge_runtime::handlers::default_modules;
//! use bridge_runtime::server::Listener;
//!
//! # #[tokio::main]
//! # async fn main() -> std::io::Result<()> {
//! let config = BridgeConfig::from_env().expect("invalid BRIDGE_* environment");
//! config.ensure_state_dir().expect("state dir must be writable");
//!
//! let manifest = bridge_runtime::default_manifest();
//! let ctx = std::sync::Arc::new(DaemonContext::new(config, manifest, default_modules));
//! bridge_runtime::monitor::spawn(ctx.clone());
//! Listener::bind(ctx)?.run().await
//! # }
//! ```

pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod fallback;
pub mod handle;
pub mod handler;
pub mod handlers;
pub mod monitor;
pub mod registry;
pub mod resource;
pub mod server;
pub mod telemetry;
pub mod timeout;
pub mod validator;

pub use context::DaemonContext;
pub use dispatcher::Dispatcher;
pub use envelope::{ProtocolError, Request, Response};
pub use error::{Error, ErrorKind, Result};
pub use fallback::FallbackExecutor;
pub use handle::{HandleKind, HandleMetadata, HandleRegistry, NativeResource};
pub use handler::{HandleFacade, HandlerFn, HandlerModule, SimpleModule};
pub use handlers::{default_manifest, default_modules};
pub use registry::ModuleRegistry;
pub use resource::{Level, Limits, ResourceManager, Signal};
pub use server::Listener;
pub use telemetry::{ComponentHealth, HealthCheck, HealthStatus, MetricsCollector};
pub use timeout::with_timeout;
pub use validator::Validator;
