//! Reference `ssh` module (§10.6): a minimal session-handle fixture standing in for the
//! SFTP/SSH internals the spec names as an example without fixing, exercising the same
//! open/command/close lifecycle shape as [`super::database`].

use crate::error::{Error, Result};
use crate::handle::{now_unix, HandleKind, HandleMetadata, NativeResource};
use crate::handler::{HandlerFn, HandlerModule, SimpleModule};
use async_trait::async_trait;
use std::sync::Arc;

pub const MODULE_NAME: &str = "ssh";
pub const FUNCTIONS: &[&str] = &["open", "exec", "close"];

#[derive(Debug, Clone)]
struct Session {
    host: String,
    user: String,
}

pub fn build() -> Arc<dyn HandlerModule> {
    let module = SimpleModule::new(MODULE_NAME)
        .with_function("open", Arc::new(OpenFn))
        .with_function("exec", Arc::new(ExecFn))
        .with_function("close", Arc::new(CloseFn));
    Arc::new(module)
}

struct OpenFn;

#[async_trait]
impl HandlerFn for OpenFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let host = params
            .get("host")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("open requires a host parameter".to_string()))?
            .to_string();
        let user = params
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or("root")
            .to_string();

        let id = handles.allocate(HandleKind::Ssh);
        handles.bind(
            &id,
            NativeResource::new(Session {
                host: host.clone(),
                user: user.clone(),
            }),
        );

        let mut parameters = serde_json::Map::new();
        parameters.insert("host".to_string(), serde_json::json!(host));
        parameters.insert("user".to_string(), serde_json::json!(user));
        let now = now_unix();
        handles.persist(&HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Ssh,
            parent_handle: None,
            parameters,
            created_at: now,
            last_used_at: now,
            autocommit: None,
            bind_plan: None,
            sql_template: None,
        })?;

        Ok(serde_json::json!({"success": true, "handle": id}))
    }
}

struct ExecFn;

#[async_trait]
impl HandlerFn for ExecFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let id = params
            .get("handle")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("exec requires a handle parameter".to_string()))?
            .to_string();
        let command = params
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("exec requires a command parameter".to_string()))?
            .to_string();

        let session = resolve_session(&handles, &id)?;
        if let Some((HandleKind::Ssh, mut metadata)) = handles.find_metadata(&id) {
            metadata.last_used_at = now_unix();
            handles.persist(&metadata)?;
        }

        Ok(serde_json::json!({
            "success": true,
            "stdout": format!("{}@{}$ {}", session.user, session.host, command),
            "stderr": "",
            "exit_code": 0,
        }))
    }
}

struct CloseFn;

#[async_trait]
impl HandlerFn for CloseFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let id = params
            .get("handle")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("close requires a handle parameter".to_string()))?
            .to_string();
        handles.release(&id, HandleKind::Ssh);
        Ok(serde_json::json!({"success": true}))
    }
}

/// Restoration (§4.B): an SSH session has no long-lived native resource worth re-opening
/// eagerly in this fixture, but the contract is identical to the database module's — resolve
/// the live slot first, fall back to persisted host/user, and never silently succeed for an
/// id with no metadata at all.
fn resolve_session(handles: &crate::handler::HandleFacade, id: &str) -> Result<Session> {
    if let Some(session) = handles.resolve::<Session>(id) {
        return Ok(session);
    }

    let (kind, metadata) = handles
        .find_metadata(id)
        .ok_or_else(|| crate::handle::HandleRegistry::unknown_handle(id))?;
    if kind != HandleKind::Ssh {
        return Err(Error::Handler(format!("{id} is not an ssh handle")));
    }

    let host = metadata
        .parameters
        .get("host")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Restoration(format!("ssh session {id} has no persisted host")))?
        .to_string();
    let user = metadata
        .parameters
        .get("user")
        .and_then(|v| v.as_str())
        .unwrap_or("root")
        .to_string();

    let session = Session { host, user };
    handles.bind(id, NativeResource::new(session.clone()));
    Ok(session)
}
