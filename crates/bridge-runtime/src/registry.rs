//! Module registry: an `FxHashMap`-keyed lookup from module name to [`HandlerModule`],
//! generalized from the O(1)-dispatch shape into an untyped-`serde_json::Value` dispatch
//! since modules here are not known at compile time.

use crate::handler::HandlerModule;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<String, Arc<dyn HandlerModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, module: Arc<dyn HandlerModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HandlerModule>> {
        self.modules.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(|k| k.as_str()).collect()
    }
}
