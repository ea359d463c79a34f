use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Internal error type. Carries a message suitable for logging; callers that need the
/// wire-stable classification convert with [`Error::kind`] into an [`ErrorKind`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("restoration error: {0}")]
    Restoration(String),

    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The wire-stable classification written into a response envelope's `error_kind`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Security(_) => ErrorKind::Security,
            Error::Handler(_) => ErrorKind::Handler,
            Error::Resource(_) => ErrorKind::Resource,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Restoration(_) => ErrorKind::Restoration,
            Error::UnknownHandle(_) => ErrorKind::UnknownHandle,
            Error::Serialization(_) | Error::Io(_) => ErrorKind::Protocol,
        }
    }
}

/// The classification vocabulary in the wire protocol's `error_kind` field. Distinct from
/// [`Error`] because the wire form must stay a small closed set of strings regardless of how
/// the internal error type evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Protocol,
    Security,
    Handler,
    Resource,
    Timeout,
    Restoration,
    UnknownHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_to_wire_vocabulary() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::UnknownHandle).unwrap(),
            "\"unknown_handle\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::Restoration).unwrap(),
            "\"restoration\""
        );
    }

    #[test]
    fn error_maps_to_matching_kind() {
        assert_eq!(Error::Security("x".into()).kind(), ErrorKind::Security);
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Timeout);
    }
}
