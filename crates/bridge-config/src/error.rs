use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidEnvVar {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("state directory {0} is not writable: {1}")]
    StateDirUnwritable(PathBuf, #[source] std::io::Error),

    #[error("duplicate module in manifest: {0}")]
    DuplicateModule(String),

    #[error("malformed identifier: {0:?} (expected [a-z_][a-z0-9_]*)")]
    MalformedIdentifier(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
