use crate::{ConfigError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon-wide settings, built once at startup from the environment (see module docs).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub transport: TransportKind,
    pub socket_path: PathBuf,
    pub state_dir: PathBuf,
    pub max_concurrent_requests: usize,
    pub max_requests_per_minute: usize,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
    pub stale_timeout: Duration,
    pub resource_check_interval: Duration,
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    UnixSocket,
    Tcp,
}

impl BridgeConfig {
    /// Build the config from the recognized `BRIDGE_*` environment variables, falling
    /// back to the documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let socket_path = std::env::var("BRIDGE_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("bridged.sock"));

        let state_dir = std::env::var("BRIDGE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("bridged-state"));

        let max_concurrent_requests =
            parse_env_or("BRIDGE_MAX_CONCURRENT_REQUESTS", 100usize)?;
        let max_requests_per_minute =
            parse_env_or("BRIDGE_MAX_REQUESTS_PER_MINUTE", 2000usize)?;
        let max_memory_mb = parse_env_or("BRIDGE_MAX_MEMORY_MB", 1024u64)?;
        let max_cpu_percent = parse_env_or("BRIDGE_MAX_CPU_PERCENT", 200.0f64)?;
        let stale_timeout_s = parse_env_or("BRIDGE_STALE_TIMEOUT_S", 300u64)?;
        let resource_check_interval_s =
            parse_env_or("BRIDGE_RESOURCE_CHECK_INTERVAL_S", 60u64)?;
        let debug = std::env::var("BRIDGE_DEBUG")
            .map(|v| v != "0" && !v.is_empty())
            .unwrap_or(false);

        Ok(Self {
            transport: TransportKind::UnixSocket,
            socket_path,
            state_dir,
            max_concurrent_requests,
            max_requests_per_minute,
            max_memory_mb,
            max_cpu_percent,
            stale_timeout: Duration::from_secs(stale_timeout_s),
            resource_check_interval: Duration::from_secs(resource_check_interval_s),
            debug,
        })
    }

    /// Ensure the state directory exists and is writable, creating it if necessary.
    /// Callers use this at startup to decide between exit code 0 and exit code 3.
    pub fn ensure_state_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| ConfigError::StateDirUnwritable(self.state_dir.clone(), e))?;

        let probe = self.state_dir.join(".bridge-write-probe");
        std::fs::write(&probe, b"ok")
            .map_err(|e| ConfigError::StateDirUnwritable(self.state_dir.clone(), e))?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }
}

trait FromEnvStr: Sized {
    fn from_env_str(s: &str) -> Option<Self>;
}

impl FromEnvStr for usize {
    fn from_env_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromEnvStr for u64 {
    fn from_env_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

impl FromEnvStr for f64 {
    fn from_env_str(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

fn parse_env_or<T: FromEnvStr>(var: &'static str, default: T) -> Result<T> {
    match std::env::var(var) {
        Ok(raw) => T::from_env_str(&raw).ok_or_else(|| ConfigError::InvalidEnvVar {
            var,
            value: raw,
            reason: "not a valid number".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "BRIDGE_SOCKET_PATH",
            "BRIDGE_STATE_DIR",
            "BRIDGE_MAX_CONCURRENT_REQUESTS",
            "BRIDGE_MAX_REQUESTS_PER_MINUTE",
            "BRIDGE_MAX_MEMORY_MB",
            "BRIDGE_MAX_CPU_PERCENT",
            "BRIDGE_STALE_TIMEOUT_S",
            "BRIDGE_RESOURCE_CHECK_INTERVAL_S",
            "BRIDGE_DEBUG",
        ] {
            std::env::remove_var(var);
        }

        let config = BridgeConfig::from_env().unwrap();
        assert_eq!(config.max_concurrent_requests, 100);
        assert_eq!(config.max_requests_per_minute, 2000);
        assert_eq!(config.max_memory_mb, 1024);
        assert_eq!(config.max_cpu_percent, 200.0);
        assert_eq!(config.stale_timeout, Duration::from_secs(300));
        assert_eq!(config.resource_check_interval, Duration::from_secs(60));
        assert!(!config.debug);
    }

    #[test]
    fn rejects_non_numeric_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BRIDGE_MAX_MEMORY_MB", "not-a-number");
        let result = BridgeConfig::from_env();
        std::env::remove_var("BRIDGE_MAX_MEMORY_MB");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }
}
