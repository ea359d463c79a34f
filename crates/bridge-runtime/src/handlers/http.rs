//! Reference `http` module (§10.6): a thin `reqwest`-backed user agent, adapted from the
//! teacher's typed `HttpHandler`/`HttpInput`/`HttpOutput` triplet to the untyped keyword-
//! parameter/JSON-result Handler Interface (§4.J) used by every module in this daemon.

use crate::error::{Error, Result};
use crate::handler::{HandlerFn, HandlerModule, SimpleModule};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const MODULE_NAME: &str = "http";
pub const FUNCTIONS: &[&str] = &["request"];

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub fn build() -> Arc<dyn HandlerModule> {
    let module = SimpleModule::new(MODULE_NAME).with_function(
        "request",
        Arc::new(RequestFn {
            client: Client::new(),
        }),
    );
    Arc::new(module)
}

struct RequestFn {
    client: Client,
}

#[async_trait]
impl HandlerFn for RequestFn {
    async fn call(
        &self,
        params: serde_json::Map<String, serde_json::Value>,
        _handles: crate::handler::HandleFacade,
    ) -> Result<serde_json::Value> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Handler("request requires a url parameter".to_string()))?;
        let method = parse_method(
            params
                .get("method")
                .and_then(|v| v.as_str())
                .unwrap_or("GET"),
        )?;
        let timeout_ms = params
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(headers) = params.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }

        if let Some(query) = params.get("query").and_then(|v| v.as_object()) {
            let pairs: HashMap<&str, &str> = query
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
                .collect();
            if !pairs.is_empty() {
                request = request.query(&pairs);
            }
        }

        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                // §7: a handler-specific deadline was exceeded; surface `error_kind=timeout`
                // rather than folding it into the generic handler-error bucket.
                Error::Timeout(format!("http request to {url} exceeded {timeout_ms}ms"))
            } else {
                Error::Handler(format!("http request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = serde_json::Map::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.to_string(), serde_json::json!(value));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Handler(format!("failed to read response body: {e}")))?;
        let body = serde_json::from_slice::<serde_json::Value>(&bytes)
            .unwrap_or_else(|_| serde_json::json!(String::from_utf8_lossy(&bytes)));

        Ok(serde_json::json!({
            "success": status < 400,
            "status": status,
            "headers": headers,
            "body": body,
        }))
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        other => Err(Error::Handler(format!("unsupported http method: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> (tempfile::TempDir, crate::handler::HandleFacade) {
        let dir = tempfile::tempdir().unwrap();
        let handles = Arc::new(crate::handle::HandleRegistry::new(dir.path()));
        (dir, handles)
    }

    #[tokio::test]
    async fn get_request_returns_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let module = build();
        let (_dir, handles) = facade();
        let result = module
            .function("request")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"url": format!("{}/ping", server.url())}),
                )
                .unwrap(),
                handles,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["success"], true);
        assert_eq!(result["status"], 200);
        assert_eq!(result["body"]["ok"], true);
    }

    #[tokio::test]
    async fn server_error_status_is_not_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let module = build();
        let (_dir, handles) = facade();
        let result = module
            .function("request")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"url": format!("{}/broken", server.url())}),
                )
                .unwrap(),
                handles,
            )
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["status"], 500);
    }

    #[tokio::test]
    async fn post_request_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/items")
            .match_body(mockito::Matcher::Json(serde_json::json!({"name": "widget"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let module = build();
        let (_dir, handles) = facade();
        let result = module
            .function("request")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({
                    "url": format!("{}/items", server.url()),
                    "method": "post",
                    "body": {"name": "widget"},
                }))
                .unwrap(),
                handles,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["status"], 201);
        assert_eq!(result["body"]["id"], 1);
    }

    #[tokio::test]
    async fn request_exceeding_its_timeout_surfaces_timeout_error_kind() {
        // A raw listener that accepts the connection and then never writes a response, so
        // the client's deadline expires waiting on response headers rather than on connect.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                // Hold the connection open without responding until the test ends.
                let _ = stream;
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        let module = build();
        let (_dir, handles) = facade();
        let result = module
            .function("request")
            .unwrap()
            .call(
                serde_json::from_value(serde_json::json!({
                    "url": format!("http://{addr}/slow"),
                    "timeout_ms": 20,
                }))
                .unwrap(),
                handles,
            )
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let module = build();
        let (_dir, handles) = facade();
        let result = module
            .function("request")
            .unwrap()
            .call(
                serde_json::from_value(
                    serde_json::json!({"url": "http://example.invalid", "method": "TRACE"}),
                )
                .unwrap(),
                handles,
            )
            .await;
        assert!(matches!(result, Err(Error::Handler(_))));
    }
}
