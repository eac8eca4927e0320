//! Configuration module for immortal
//!
//! Protocol parameters shared by both sides of a protected pair:
//! - Heartbeat interval and miss threshold
//! - Connection probe cadence
//! - Location of the watchdog executable
//! - Name of the discovery variable

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ImmortalError, Result};

/// Environment variable under which a running watchdog publishes its pid
pub const DISCOVERY_VAR: &str = "IMMORTAL_WD_PID";

/// Environment variable overriding the watchdog executable path
pub const WATCHDOG_BIN_VAR: &str = "IMMORTAL_WATCHDOG_BIN";

/// File name of the watchdog executable
pub const WATCHDOG_BIN_NAME: &str = "watchdog";

/// Protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Heartbeat and check interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Consecutive missed checks before the peer is revived
    #[serde(default = "default_max_misses")]
    pub max_misses: u32,

    /// Cadence of the connection probe in milliseconds
    #[serde(default = "default_probe_ms")]
    pub connect_probe_ms: u64,

    /// Explicit watchdog executable; resolved when unset
    #[serde(default)]
    pub watchdog_binary: Option<PathBuf>,

    /// Discovery variable name
    #[serde(default = "default_discovery_var")]
    pub discovery_var: String,
}

fn default_interval() -> u64 {
    1
}

fn default_max_misses() -> u32 {
    3
}

fn default_probe_ms() -> u64 {
    250
}

fn default_discovery_var() -> String {
    DISCOVERY_VAR.to_string()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_misses: default_max_misses(),
            connect_probe_ms: default_probe_ms(),
            watchdog_binary: None,
            discovery_var: default_discovery_var(),
        }
    }
}

impl ProtocolConfig {
    /// Configuration with the given protocol parameters and defaults elsewhere
    pub fn new(interval_secs: u64, max_misses: u32) -> Self {
        Self {
            interval_secs,
            max_misses,
            ..Default::default()
        }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_max_misses(mut self, max_misses: u32) -> Self {
        self.max_misses = max_misses;
        self
    }

    pub fn with_connect_probe_ms(mut self, millis: u64) -> Self {
        self.connect_probe_ms = millis;
        self
    }

    pub fn with_watchdog_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.watchdog_binary = Some(path.into());
        self
    }

    pub fn with_discovery_var(mut self, name: impl Into<String>) -> Self {
        self.discovery_var = name.into();
        self
    }

    /// Reject parameters the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(ImmortalError::InvalidConfig(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.max_misses == 0 {
            return Err(ImmortalError::InvalidConfig(
                "max_misses must be greater than zero".to_string(),
            ));
        }
        if self.connect_probe_ms == 0 {
            return Err(ImmortalError::InvalidConfig(
                "connect_probe_ms must be greater than zero".to_string(),
            ));
        }
        if self.discovery_var.is_empty() || self.discovery_var.contains('=') {
            return Err(ImmortalError::InvalidConfig(format!(
                "invalid discovery variable name {:?}",
                self.discovery_var
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn connect_probe_interval(&self) -> Duration {
        Duration::from_millis(self.connect_probe_ms)
    }

    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProtocolConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overlaid with `IMMORTAL_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup` (an environment reader)
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("IMMORTAL_INTERVAL") {
            self.interval_secs = parse_number("IMMORTAL_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("IMMORTAL_MAX_MISSES") {
            self.max_misses = parse_number("IMMORTAL_MAX_MISSES", &value)?;
        }
        if let Some(value) = lookup("IMMORTAL_CONNECT_PROBE_MS") {
            self.connect_probe_ms = parse_number("IMMORTAL_CONNECT_PROBE_MS", &value)?;
        }
        if let Some(value) = lookup(WATCHDOG_BIN_VAR) {
            if !value.is_empty() {
                self.watchdog_binary = Some(PathBuf::from(value));
            }
        }
        Ok(self)
    }

    /// Watchdog executable: explicit path, else the one installed next to
    /// the current executable, else a bare name resolved through `PATH`.
    pub fn resolve_watchdog_binary(&self) -> PathBuf {
        if let Some(path) = &self.watchdog_binary {
            return path.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(WATCHDOG_BIN_NAME)))
            .filter(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(WATCHDOG_BIN_NAME))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ImmortalError::InvalidConfig(format!("{} is not a valid number: {:?}", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();
        assert_eq!(config.interval_secs, 1);
        assert_eq!(config.max_misses, 3);
        assert_eq!(config.connect_probe_ms, 250);
        assert_eq!(config.discovery_var, DISCOVERY_VAR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = ProtocolConfig::new(0, 3).validate();
        assert!(matches!(result, Err(ImmortalError::InvalidConfig(msg)) if msg.contains("interval")));
    }

    #[test]
    fn test_zero_max_misses_is_rejected() {
        let result = ProtocolConfig::new(1, 0).validate();
        assert!(matches!(result, Err(ImmortalError::InvalidConfig(msg)) if msg.contains("max_misses")));
    }

    #[test]
    fn test_bad_discovery_var_is_rejected() {
        let config = ProtocolConfig::default().with_discovery_var("A=B");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("IMMORTAL_INTERVAL", "5"),
            ("IMMORTAL_MAX_MISSES", "7"),
            ("IMMORTAL_WATCHDOG_BIN", "/opt/bin/watchdog"),
        ]
        .into_iter()
        .collect();

        let config = ProtocolConfig::default()
            .with_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.max_misses, 7);
        assert_eq!(config.resolve_watchdog_binary(), PathBuf::from("/opt/bin/watchdog"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let result = ProtocolConfig::default()
            .with_env_overrides(|name| (name == "IMMORTAL_MAX_MISSES").then(|| "many".to_string()));
        assert!(matches!(result, Err(ImmortalError::InvalidConfig(_))));
    }

    #[test]
    fn test_json_file_with_partial_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("immortal.json");
        std::fs::write(&path, r#"{ "interval_secs": 2, "max_misses": 4 }"#).unwrap();

        let config = ProtocolConfig::from_json_file(&path).unwrap();
        assert_eq!(config.interval_secs, 2);
        assert_eq!(config.max_misses, 4);
        assert_eq!(config.connect_probe_ms, 250);
        assert!(config.watchdog_binary.is_none());
    }

    #[test]
    fn test_json_file_round_trips_through_serde() {
        let config = ProtocolConfig::new(3, 5).with_watchdog_binary("/usr/local/bin/watchdog");
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_unresolvable_binary_falls_back_to_bare_name() {
        let config = ProtocolConfig::default();
        let resolved = config.resolve_watchdog_binary();
        assert_eq!(resolved.file_name().and_then(|n| n.to_str()), Some(WATCHDOG_BIN_NAME));
    }
}
