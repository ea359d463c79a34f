//! Handler Interface (§4.J): the uniform adapter between handler modules and the dispatcher.
//! A module declares its name and a function-name-to-callable map; callables take keyword
//! params as a JSON object and return a JSON-serializable value, optionally through the
//! handle registry facade.

use crate::error::Result;
use crate::handle::HandleRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// The facade a handler function gets to the process-local handle registry. Handlers never
/// see the registry's internals directly — only allocate/resolve/persist/release, matching
/// the contract in §4.J.
pub type HandleFacade = Arc<HandleRegistry>;

/// One callable exported by a [`HandlerModule`]: `params` is the request's JSON object,
/// `handles` is the facade onto the handle registry.
#[async_trait]
pub trait HandlerFn: Send + Sync {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: HandleFacade,
    ) -> Result<serde_json::Value>;
}

#[async_trait]
impl<F, Fut> HandlerFn for F
where
    F: Fn(serde_json::Map<String, serde_json::Value>, HandleFacade) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value>> + Send,
{
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: HandleFacade,
    ) -> Result<serde_json::Value> {
        (self)(params, handles).await
    }
}

/// A named collection of functions dispatched to by module name. `exported_functions` is the
/// list the allow-list in [`bridge_config::HandlerManifest`] is built from; it must match the
/// function names actually registered here exactly, or calls to an unreachable name will
/// 404 at dispatch time despite being allow-listed.
pub trait HandlerModule: Send + Sync {
    fn name(&self) -> &str;

    fn exported_functions(&self) -> Vec<String>;

    fn function(&self, name: &str) -> Option<Arc<dyn HandlerFn>>;
}

/// A simple in-memory implementation of [`HandlerModule`] built by registering closures —
/// the shape every reference module in `handlers/` uses.
pub struct SimpleModule {
    name: String,
    functions: std::collections::HashMap<String, Arc<dyn HandlerFn>>,
}

impl SimpleModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: std::collections::HashMap::new(),
        }
    }

    pub fn with_function(mut self, name: impl Into<String>, handler: Arc<dyn HandlerFn>) -> Self {
        self.functions.insert(name.into(), handler);
        self
    }
}

impl HandlerModule for SimpleModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn exported_functions(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    fn function(&self, name: &str) -> Option<Arc<dyn HandlerFn>> {
        self.functions.get(name).cloned()
    }
}
