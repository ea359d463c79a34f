//! Opaque session/statement handles: an in-memory map of live native resources plus a
//! parallel on-disk metadata tree that lets a fallback-mode invocation (§4.H) restore a
//! session the in-memory map never saw.

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Connection,
    Statement,
    Ssh,
}

impl HandleKind {
    fn dir_name(self) -> &'static str {
        match self {
            HandleKind::Connection => "connections",
            HandleKind::Statement => "statements",
            HandleKind::Ssh => "ssh",
        }
    }
}

/// The persisted, serializable half of a handle. Secrets are never written here — restoring
/// a connection with expired or absent credentials surfaces `error_kind=restoration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleMetadata {
    pub handle_id: String,
    pub kind: HandleKind,
    pub parent_handle: Option<String>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub created_at: u64,
    pub last_used_at: u64,
    #[serde(default)]
    pub autocommit: Option<bool>,
    #[serde(default)]
    pub bind_plan: Option<serde_json::Value>,
    #[serde(default)]
    pub sql_template: Option<String>,
}

/// A boxed native resource held only in-process; never serialized, never crosses a process
/// boundary. Handler modules downcast through [`NativeResource::downcast`].
pub struct NativeResource(Box<dyn Any + Send + Sync>);

impl NativeResource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

struct Slot {
    native: Option<NativeResource>,
    lock: Arc<Mutex<()>>,
}

/// Process-local handle registry: an in-memory map of live native resources and a parallel
/// filesystem tree of metadata records under `<state_dir>/<kind>/<id>.meta`.
pub struct HandleRegistry {
    state_dir: PathBuf,
    slots: DashMap<String, Slot>,
}

impl HandleRegistry {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            slots: DashMap::new(),
        }
    }

    /// Mint a fresh opaque id and reserve a slot for it. The caller binds the native resource
    /// and persists metadata in separate calls once both are ready.
    pub fn allocate(&self, kind: HandleKind) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.slots.insert(
            id.clone(),
            Slot {
                native: None,
                lock: Arc::new(Mutex::new(())),
            },
        );
        let _ = kind;
        id
    }

    pub fn bind(&self, id: &str, native: NativeResource) {
        if let Some(mut slot) = self.slots.get_mut(id) {
            slot.native = Some(native);
        } else {
            self.slots.insert(
                id.to_string(),
                Slot {
                    native: Some(native),
                    lock: Arc::new(Mutex::new(())),
                },
            );
        }
    }

    /// The per-handle lock used by the dispatcher (§4.E) to serialize concurrent calls
    /// against the same cursor.
    pub fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.slots
            .entry(id.to_string())
            .or_insert_with(|| Slot {
                native: None,
                lock: Arc::new(Mutex::new(())),
            })
            .lock
            .clone()
    }

    pub fn resolve<T: Any + Send + Sync + Clone>(&self, id: &str) -> Option<T> {
        self.slots
            .get(id)
            .and_then(|slot| slot.native.as_ref().and_then(|n| n.downcast::<T>().cloned()))
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.slots.get(id).map(|s| s.native.is_some()).unwrap_or(false)
    }

    pub fn describe(&self, id: &str, kind: HandleKind) -> Option<HandleMetadata> {
        read_metadata(&self.meta_path(id, kind)).ok()
    }

    /// Overwrite the metadata record for `id`, updating `last_used_at` to now.
    pub fn persist(&self, metadata: &HandleMetadata) -> Result<()> {
        let path = self.meta_path(&metadata.handle_id, metadata.kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(metadata)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// Drop the in-memory slot and remove the on-disk metadata (clean close).
    pub fn release(&self, id: &str, kind: HandleKind) {
        self.slots.remove(id);
        let _ = std::fs::remove_file(self.meta_path(id, kind));
    }

    /// Scan every kind's metadata directory and release handles whose `last_used_at` is
    /// older than `stale_after`. Returns the ids released.
    ///
    /// §4.G requires this to be safe against a racing in-flight request on the same handle:
    /// a candidate found stale by the initial directory scan is re-checked under its
    /// per-handle lock (the same lock the dispatcher holds for the duration of a call) before
    /// being released, so a request that started using the handle just before the sweep and
    /// bumped `last_used_at` is never pulled out from under it.
    pub async fn sweep(&self, stale_after: Duration) -> Vec<String> {
        let now = now_unix();
        let mut candidates = Vec::new();
        for kind in [HandleKind::Connection, HandleKind::Statement, HandleKind::Ssh] {
            let dir = self.state_dir.join(kind.dir_name());
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(metadata) = read_metadata(&entry.path()) else {
                    continue;
                };
                let age = now.saturating_sub(metadata.last_used_at);
                if age >= stale_after.as_secs() {
                    candidates.push((metadata.handle_id, kind));
                }
            }
        }

        let mut released = Vec::new();
        for (id, kind) in candidates {
            let lock = self.lock_for(&id);
            let _guard = lock.lock().await;
            let Some(metadata) = self.describe(&id, kind) else {
                continue;
            };
            let age = now_unix().saturating_sub(metadata.last_used_at);
            if age >= stale_after.as_secs() {
                self.release(&id, kind);
                released.push(id);
            }
        }
        released
    }

    fn meta_path(&self, id: &str, kind: HandleKind) -> PathBuf {
        self.state_dir.join(kind.dir_name()).join(format!("{id}.meta"))
    }

    /// Look up metadata by id without already knowing its kind (used by restoration).
    pub fn find_metadata(&self, id: &str) -> Option<(HandleKind, HandleMetadata)> {
        for kind in [HandleKind::Connection, HandleKind::Statement, HandleKind::Ssh] {
            if let Some(meta) = self.describe(id, kind) {
                return Some((kind, meta));
            }
        }
        None
    }

    pub fn unknown_handle(id: &str) -> Error {
        Error::UnknownHandle(id.to_string())
    }
}

fn read_metadata(path: &Path) -> std::result::Result<HandleMetadata, ()> {
    let bytes = std::fs::read(path).map_err(|_| ())?;
    serde_json::from_slice(&bytes).map_err(|_| ())
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_bind_resolve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandleRegistry::new(dir.path());
        let id = registry.allocate(HandleKind::Connection);
        registry.bind(&id, NativeResource::new(42u32));
        assert_eq!(registry.resolve::<u32>(&id), Some(42));
    }

    #[test]
    fn persist_and_describe_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandleRegistry::new(dir.path());
        let id = registry.allocate(HandleKind::Connection);
        let meta = HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Connection,
            parent_handle: None,
            parameters: serde_json::Map::new(),
            created_at: now_unix(),
            last_used_at: now_unix(),
            autocommit: Some(true),
            bind_plan: None,
            sql_template: None,
        };
        registry.persist(&meta).unwrap();
        let described = registry.describe(&id, HandleKind::Connection).unwrap();
        assert_eq!(described.handle_id, id);
    }

    #[tokio::test]
    async fn sweep_releases_only_stale_handles() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandleRegistry::new(dir.path());
        let id = registry.allocate(HandleKind::Connection);
        let meta = HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Connection,
            parent_handle: None,
            parameters: serde_json::Map::new(),
            created_at: now_unix(),
            last_used_at: now_unix().saturating_sub(1000),
            autocommit: None,
            bind_plan: None,
            sql_template: None,
        };
        registry.persist(&meta).unwrap();
        let released = registry.sweep(Duration::from_secs(300)).await;
        assert_eq!(released, vec![id]);
    }

    #[tokio::test]
    async fn sweep_does_not_release_a_handle_touched_under_its_lock_during_the_scan() {
        // Regression for §4.G: a handle that looked stale at scan time but was freshly
        // persisted (touched) before the sweep reaches it under the per-handle lock must
        // survive, since its lock serializes against dispatch the same way.
        let dir = tempfile::tempdir().unwrap();
        let registry = HandleRegistry::new(dir.path());
        let id = registry.allocate(HandleKind::Connection);
        let stale_meta = HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Connection,
            parent_handle: None,
            parameters: serde_json::Map::new(),
            created_at: now_unix(),
            last_used_at: now_unix().saturating_sub(1000),
            autocommit: None,
            bind_plan: None,
            sql_template: None,
        };
        registry.persist(&stale_meta).unwrap();

        // Simulate a racing request that re-touches the handle while holding its lock.
        let lock = registry.lock_for(&id);
        let guard = lock.lock().await;
        let mut fresh_meta = stale_meta.clone();
        fresh_meta.last_used_at = now_unix();
        registry.persist(&fresh_meta).unwrap();
        drop(guard);

        let released = registry.sweep(Duration::from_secs(300)).await;
        assert!(released.is_empty(), "freshly-touched handle must not be swept");
    }

    #[test]
    fn unknown_id_is_not_live() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandleRegistry::new(dir.path());
        assert!(!registry.is_live("nonexistent"));
    }
}
