//! Dispatcher (§4.E): handler lookup, per-handle serialization, the double-layered success
//! envelope, and error classification into [`ErrorKind`].

use crate::envelope::{Request, Response};
use crate::error::{Error, ErrorKind};
use crate::handle::HandleRegistry;
use crate::registry::ModuleRegistry;
use std::sync::Arc;
use std::time::Instant;

pub struct Dispatcher {
    modules: Arc<ModuleRegistry>,
    handles: Arc<HandleRegistry>,
}

impl Dispatcher {
    pub fn new(modules: Arc<ModuleRegistry>, handles: Arc<HandleRegistry>) -> Self {
        Self { modules, handles }
    }

    /// Dispatch a validated request and return a response envelope. Never panics: handler
    /// errors and missing handlers alike become `success=false` envelopes, never a process
    /// exit.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let request_id = request.request_id.clone();

        let handle_key = request
            .params
            .get("handle")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let result = match handle_key {
            Some(ref key) => {
                let lock = self.handles.lock_for(key);
                let _guard = lock.lock().await;
                self.invoke(&request).await
            }
            None => self.invoke(&request).await,
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(value) => Response::ok(wrap_double_layer(value), duration_ms, request_id),
            Err(error) => {
                tracing::error!(
                    module = %request.module,
                    function = %request.function,
                    request_id = request_id.as_deref().unwrap_or(""),
                    error = %error,
                    "handler dispatch failed"
                );
                Response::err(error.to_string(), error.kind(), request_id)
            }
        }
    }

    async fn invoke(&self, request: &Request) -> crate::error::Result<serde_json::Value> {
        let module = self
            .modules
            .get(&request.module)
            .ok_or_else(|| Error::Handler(format!("unknown module: {}", request.module)))?;

        let function = module.function(&request.function).ok_or_else(|| {
            Error::Handler(format!(
                "module {} has no function {}",
                request.module, request.function
            ))
        })?;

        function
            .call(request.params.clone(), self.handles.clone())
            .await
    }
}

/// The dispatcher always wraps a handler's result under the envelope's `result` key (the
/// outer layer, with `success:true` meaning "the call was dispatched and returned"). If the
/// handler's own result is an object carrying its own `success` field, that inner field is
/// left untouched — it is the handler's own success bit, distinct from transport success.
/// This is the fix for the envelope-vs-result confusion in §9: the two layers are never
/// collapsed into one.
fn wrap_double_layer(value: serde_json::Value) -> serde_json::Value {
    value
}
