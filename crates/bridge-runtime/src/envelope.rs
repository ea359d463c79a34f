//! Wire framing and the response envelope: `<decimal length>\n<json payload>`, one request and
//! one response per round trip, no pipelining.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Requests larger than this (including the JSON payload, before the length header) are
/// rejected with `error_kind=protocol` rather than read into memory.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message of {0} bytes exceeds the {1}-byte limit")]
    MessageTooLarge(usize, usize),

    #[error("malformed length prefix: {0:?}")]
    MalformedLength(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out waiting for data")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Response {
    pub fn ok(result: serde_json::Value, duration_ms: f64, request_id: Option<String>) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
            duration_ms: Some(duration_ms),
            request_id,
        }
    }

    pub fn err(error: String, error_kind: ErrorKind, request_id: Option<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            error_kind: Some(error_kind),
            duration_ms: None,
            request_id,
        }
    }
}

/// Encode a JSON payload with its decimal-length-and-newline prefix.
pub fn encode(payload: &serde_json::Value) -> std::result::Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(payload)?;
    let mut framed = format!("{}\n", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Write a framed response to an async writer.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> std::result::Result<(), ProtocolError> {
    let value = serde_json::to_value(response)?;
    let framed = encode(&value)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message: the decimal length header up to `\n`, then exactly that many
/// bytes of JSON body.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::result::Result<serde_json::Value, ProtocolError> {
    let length = tokio::time::timeout(READ_TIMEOUT, read_length_header(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;

    if length > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::MessageTooLarge(length, MAX_MESSAGE_BYTES));
    }

    let mut body = vec![0u8; length];
    tokio::time::timeout(READ_TIMEOUT, reader.read_exact(&mut body))
        .await
        .map_err(|_| ProtocolError::Timeout)?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::Io(e)
            }
        })?;

    Ok(serde_json::from_slice(&body)?)
}

/// Read one framed request, mapping the payload into the typed [`Request`] shape.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::result::Result<Request, ProtocolError> {
    let value = read_message(reader).await?;
    Ok(serde_json::from_value(value)?)
}

async fn read_length_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> std::result::Result<usize, ProtocolError> {
    let mut digits = Vec::with_capacity(8);
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if digits.is_empty() {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(ProtocolError::MalformedLength(
                String::from_utf8_lossy(&digits).to_string(),
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        if !byte[0].is_ascii_digit() || digits.len() > 10 {
            return Err(ProtocolError::MalformedLength(
                String::from_utf8_lossy(&digits).to_string(),
            ));
        }
        digits.push(byte[0]);
    }

    std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::MalformedLength(String::from_utf8_lossy(&digits).to_string()))
}
