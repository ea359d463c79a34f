//! Fallback single-shot execution (§4.H): used when no daemon is reachable at the configured
//! socket. A fresh, empty [`HandleRegistry`] is built directly over the shared state
//! directory — there is no live in-memory resource for any handle the caller names, so every
//! handle reference is forced through the restoration path (§4.B) the same way it would be
//! after a daemon restart.

use crate::dispatcher::Dispatcher;
use crate::envelope::{Request, Response};
use crate::handle::HandleRegistry;
use crate::registry::ModuleRegistry;
use crate::validator::Validator;
use bridge_config::{BridgeConfig, HandlerManifest};
use std::sync::Arc;

pub struct FallbackExecutor {
    config: BridgeConfig,
    manifest: HandlerManifest,
    modules: Arc<ModuleRegistry>,
}

impl FallbackExecutor {
    pub fn new(config: BridgeConfig, manifest: HandlerManifest, modules: ModuleRegistry) -> Self {
        Self {
            config,
            manifest,
            modules: Arc::new(modules),
        }
    }

    /// Validate and dispatch a single request against a handle registry with nothing held in
    /// memory. Every handle lookup either restores from `<state_dir>/<kind>/<id>.meta` or
    /// fails with `error_kind=unknown_handle` / `restoration`, never a stale in-process value.
    pub async fn execute(&self, request: Request) -> Response {
        tracing::warn!(
            module = %request.module,
            function = %request.function,
            "executing in fallback mode: no daemon reachable, handles will be restored from disk"
        );

        let validator = Validator::new(&self.manifest);
        if let Err(error) = validator.validate(&request) {
            return Response::err(error.to_string(), error.kind(), request.request_id.clone());
        }

        let handles = Arc::new(HandleRegistry::new(self.config.state_dir.clone()));
        let dispatcher = Dispatcher::new(self.modules.clone(), handles);
        dispatcher.dispatch(request).await
    }
}
