//! Reference `database` module (§10.6): a minimal in-process SQL fixture exercising the full
//! connection/statement handle lifecycle (§4.B) without depending on an external driver.
//!
//! `execute_immediate` implements the §9 fix directly: a statement whose leading keyword is
//! `SELECT` or `WITH` (case-insensitive) is detected as read-returning and fetched before its
//! cursor is released, instead of the earlier close-then-fetch bug the spec calls out.

use crate::error::{Error, Result};
use crate::handle::{now_unix, HandleKind, HandleMetadata, NativeResource};
use crate::handler::{HandlerFn, HandlerModule, SimpleModule};
use async_trait::async_trait;
use std::sync::Arc;

pub const MODULE_NAME: &str = "database";
pub const FUNCTIONS: &[&str] = &["connect", "execute_immediate", "prepare", "execute", "close"];

#[derive(Debug, Clone)]
struct Connection {
    dsn: String,
    autocommit: bool,
}

#[derive(Debug, Clone)]
struct Statement {
    parent: String,
    sql: String,
}

pub fn build() -> Arc<dyn HandlerModule> {
    let module = SimpleModule::new(MODULE_NAME)
        .with_function("connect", Arc::new(ConnectFn))
        .with_function("execute_immediate", Arc::new(ExecuteImmediateFn))
        .with_function("prepare", Arc::new(PrepareFn))
        .with_function("execute", Arc::new(ExecuteFn))
        .with_function("close", Arc::new(CloseFn));
    Arc::new(module)
}

struct ConnectFn;

#[async_trait]
impl HandlerFn for ConnectFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let dsn = params
            .get("dsn")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("connect requires a dsn parameter".to_string()))?
            .to_string();
        let autocommit = params
            .get("autocommit")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let id = handles.allocate(HandleKind::Connection);
        handles.bind(&id, NativeResource::new(Connection { dsn: dsn.clone(), autocommit }));

        let mut parameters = serde_json::Map::new();
        parameters.insert("dsn".to_string(), serde_json::json!(dsn));
        let now = now_unix();
        handles.persist(&HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Connection,
            parent_handle: None,
            parameters,
            created_at: now,
            last_used_at: now,
            autocommit: Some(autocommit),
            bind_plan: None,
            sql_template: None,
        })?;

        Ok(serde_json::json!({"success": true, "handle": id}))
    }
}

struct ExecuteImmediateFn;

#[async_trait]
impl HandlerFn for ExecuteImmediateFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let id = required_str(&params, "handle")?;
        let sql = required_str(&params, "sql")?;
        resolve_connection(&handles, &id)?;
        touch_connection(&handles, &id)?;
        Ok(run_sql(&sql))
    }
}

struct PrepareFn;

#[async_trait]
impl HandlerFn for PrepareFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let connection_id = required_str(&params, "handle")?;
        let sql = required_str(&params, "sql")?;
        resolve_connection(&handles, &connection_id)?;

        let id = handles.allocate(HandleKind::Statement);
        handles.bind(
            &id,
            NativeResource::new(Statement {
                parent: connection_id.clone(),
                sql: sql.clone(),
            }),
        );

        let now = now_unix();
        handles.persist(&HandleMetadata {
            handle_id: id.clone(),
            kind: HandleKind::Statement,
            parent_handle: Some(connection_id),
            parameters: serde_json::Map::new(),
            created_at: now,
            last_used_at: now,
            autocommit: None,
            bind_plan: None,
            sql_template: Some(sql),
        })?;

        Ok(serde_json::json!({"success": true, "handle": id}))
    }
}

struct ExecuteFn;

#[async_trait]
impl HandlerFn for ExecuteFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let id = required_str(&params, "handle")?;
        let statement = resolve_statement(&handles, &id)?;
        resolve_connection(&handles, &statement.parent)?;
        touch_statement(&handles, &id)?;
        Ok(run_sql(&statement.sql))
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
        let id = required_str(&params, "handle")?;
        let kind = handles
            .find_metadata(&id)
            .map(|(kind, _)| kind)
            .unwrap_or(HandleKind::Connection);
        handles.release(&id, kind);
        Ok(serde_json::json!({"success": true}))
    }
}

fn required_str(params: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Handler(format!("missing required parameter: {key}")))
}

/// Restoration algorithm (§4.B) for a connection handle: if it is already live, nothing to do;
/// otherwise read persisted metadata and re-open using the stored DSN.
fn resolve_connection(handles: &crate::handler::HandleFacade, id: &str) -> Result<Connection> {
    if let Some(conn) = handles.resolve::<Connection>(id) {
        return Ok(conn);
    }

    let (kind, metadata) = handles
        .find_metadata(id)
        .ok_or_else(|| crate::handle::HandleRegistry::unknown_handle(id))?;
    if kind != HandleKind::Connection {
        return Err(Error::Handler(format!("{id} is not a connection handle")));
    }

    let dsn = metadata
        .parameters
        .get("dsn")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::Restoration(format!(
                "connection {id} has no persisted dsn to restore from"
            ))
        })?
        .to_string();

    let conn = Connection {
        dsn,
        autocommit: metadata.autocommit.unwrap_or(true),
    };
    handles.bind(id, NativeResource::new(conn.clone()));
    Ok(conn)
}

/// Restoration algorithm for a statement handle: resolve the parent connection first, then
/// re-prepare from the persisted SQL template.
fn resolve_statement(handles: &crate::handler::HandleFacade, id: &str) -> Result<Statement> {
    if let Some(stmt) = handles.resolve::<Statement>(id) {
        return Ok(stmt);
    }

    let (kind, metadata) = handles
        .find_metadata(id)
        .ok_or_else(|| crate::handle::HandleRegistry::unknown_handle(id))?;
    if kind != HandleKind::Statement {
        return Err(Error::Handler(format!("{id} is not a statement handle")));
    }

    let parent = metadata.parent_handle.clone().ok_or_else(|| {
        Error::Restoration(format!("statement {id} has no parent to restore against"))
    })?;
    resolve_connection(handles, &parent)?;

    let sql = metadata.sql_template.clone().ok_or_else(|| {
        Error::Restoration(format!("statement {id} has no persisted SQL template"))
    })?;

    let stmt = Statement { parent, sql };
    handles.bind(id, NativeResource::new(stmt.clone()));
    Ok(stmt)
}

fn touch_connection(handles: &crate::handler::HandleFacade, id: &str) -> Result<()> {
    if let Some((HandleKind::Connection, mut metadata)) = handles.find_metadata(id) {
        metadata.last_used_at = now_unix();
        handles.persist(&metadata)?;
    }
    Ok(())
}

fn touch_statement(handles: &crate::handler::HandleFacade, id: &str) -> Result<()> {
    if let Some((HandleKind::Statement, mut metadata)) = handles.find_metadata(id) {
        metadata.last_used_at = now_unix();
        handles.persist(&metadata)?;
    }
    Ok(())
}

fn is_read_returning(sql: &str) -> bool {
    let trimmed = sql.trim_start().to_ascii_uppercase();
    trimmed.starts_with("SELECT") || trimmed.starts_with("WITH")
}

/// Evaluate the fixture's tiny `SELECT <literal>[, <literal> ...] FROM <table>` grammar
/// (the `SELECT` keyword itself, case-insensitively, up to the first ` FROM `/` from `), or
/// treat anything else as a DML statement that always succeeds with one affected row. A
/// `WITH`-prefixed query falls back to a single null column, since the fixture's grammar does
/// not model CTEs.
fn run_sql(sql: &str) -> serde_json::Value {
    if !is_read_returning(sql) {
        return serde_json::json!({"success": true, "rows_affected": 1});
    }

    let trimmed = sql.trim().trim_end_matches(';');
    let upper = trimmed.to_ascii_uppercase();
    let select_list = if upper.starts_with("SELECT") {
        let after_select = &trimmed[6..];
        let upper_after = &upper[6..];
        match upper_after.find(" FROM ") {
            Some(idx) => &after_select[..idx],
            None => after_select,
        }
    } else {
        ""
    };

    let mut columns = Vec::new();
    let mut row = Vec::new();
    for expr in select_list.split(',') {
        let expr = expr.trim();
        if expr.is_empty() {
            continue;
        }
        let value = if let Ok(n) = expr.parse::<i64>() {
            serde_json::json!(n)
        } else if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
            serde_json::json!(expr[1..expr.len() - 1])
        } else {
            serde_json::Value::Null
        };
        columns.push(serde_json::json!({"name": expr}));
        row.push(value);
    }

    if columns.is_empty() {
        columns.push(serde_json::json!({"name": "value"}));
        row.push(serde_json::Value::Null);
    }

    serde_json::json!({
        "success": true,
        "rows": [row],
        "rows_affected": 1,
        "columns": columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleRegistry;

    fn facade() -> (tempfile::TempDir, crate::handler::HandleFacade) {
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(HandleRegistry::new(dir.path()));
        (dir, handles)
    }

    #[tokio::test]
    async fn connect_then_execute_immediate_select() {
        let (_dir, handles) = facade();
        let module = build();

        let connect_result = module
            .function("connect")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({"dsn": "fixture://local"})).unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();
        let handle = connect_result["handle"].as_str().unwrap().to_string();

        let exec_result = module
            .function("execute_immediate")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"handle": handle, "sql": "SELECT 1 FROM dual"}),
                )
                .unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();

        assert_eq!(exec_result["success"], true);
        assert_eq!(exec_result["rows"], serde_json::json!([[1]]));
        assert_eq!(exec_result["rows_affected"], 1);
        assert_eq!(exec_result["columns"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execute_immediate_on_unknown_handle_fails() {
        let (_dir, handles) = facade();
        let module = build();
        let result = module
            .function("execute_immediate")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"handle": "ghost", "sql": "SELECT 1 FROM dual"}),
                )
                .unwrap(),
                handles,
            )
            .await;
        assert!(matches!(result, Err(Error::UnknownHandle(_))));
    }

    #[tokio::test]
    async fn prepare_and_execute_round_trip() {
        let (_dir, handles) = facade();
        let module = build();

        let connect_result = module
            .function("connect")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({"dsn": "fixture://local"})).unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();
        let connection = connect_result["handle"].as_str().unwrap().to_string();

        let prepare_result = module
            .function("prepare")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"handle": connection, "sql": "UPDATE t SET x = 1"}),
                )
                .unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();
        let statement = prepare_result["handle"].as_str().unwrap().to_string();

        let exec_result = module
            .function("execute")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({"handle": statement})).unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();
        assert_eq!(exec_result["rows_affected"], 1);
    }

    #[tokio::test]
    async fn restoration_reopens_connection_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let handles: crate::handler::HandleFacade = Arc::new(HandleRegistry::new(dir.path()));
        let module = build();

        let connect_result = module
            .function("connect")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({"dsn": "fixture://local"})).unwrap(),
                handles.clone(),
            )
            .await
            .unwrap();
        let connection = connect_result["handle"].as_str().unwrap().to_string();

        // Simulate a daemon restart: a brand-new registry over the same state directory has
        // no in-memory slot for `connection`, only the metadata file `connect` persisted.
        let restarted: crate::handler::HandleFacade = Arc::new(HandleRegistry::new(dir.path()));
        assert!(!restarted.is_live(&connection));

        let exec_result = module
            .function("execute_immediate")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"handle": connection, "sql": "SELECT 2 FROM dual"}),
                )
                .unwrap(),
                restarted,
            )
            .await
            .unwrap();
        assert_eq!(exec_result["rows"], serde_json::json!([[2]]));
    }

    #[test]
    fn detects_select_and_with_case_insensitively() {
        assert!(is_read_returning("select 1"));
        assert!(is_read_returning("  SeLeCt 1"));
        assert!(is_read_returning("WITH cte AS (SELECT 1) SELECT * FROM cte"));
        assert!(!is_read_returning("UPDATE t SET x = 1"));
        assert!(!is_read_returning("execute_immediate_not_a_keyword"));
    }
}
