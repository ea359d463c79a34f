//! # bridge-config
//!
//! Environment-driven settings and handler manifests for the `bridged` daemon.
//!
//! There is no configuration-file format here — every setting comes from a `BRIDGE_*`
//! environment variable with a documented default (see [`BridgeConfig::from_env`]). The
//! manifest types describe which modules and functions a running daemon will dispatch to,
//! and [`validator::validate_manifest`] enforces that module/function names are well-formed
//! and unique before the daemon starts accepting connections.
//!
//! ```rust
//! use bridge_config::BridgeConfig;
//!
//! let config = BridgeConfig::from_env().expect("valid environment");
//! assert!(config.max_concurrent_requests > 0);
//! ```

pub mod error;
pub mod manifest;
pub mod types;
pub mod validator;

pub use error::{ConfigError, Result};
pub use manifest::{HandlerManifest, ModuleManifest};
pub use types::{BridgeConfig, TransportKind};
pub use validator::{is_well_formed_identifier, validate_manifest};
