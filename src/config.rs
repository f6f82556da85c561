//! Configuration management for the transaction watcher
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub watcher: WatcherConfig,
    pub zksync: ZkSyncConfig,
    pub ethereum: EthereumConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Quiet period before a balance/history refresh fires
    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,
    /// Offset passed to the history refresh
    #[serde(default)]
    pub history_offset: u64,
    /// Ignore a second deposit watch for a (token, hash) already in the list
    #[serde(default)]
    pub guard_duplicate_deposits: bool,
    /// Interval between RPC endpoint health checks
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

impl WatcherConfig {
    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            refresh_debounce_ms: default_refresh_debounce_ms(),
            history_offset: 0,
            guard_duplicate_deposits: false,
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

fn default_refresh_debounce_ms() -> u64 {
    500
}

fn default_health_check_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZkSyncConfig {
    pub rpc_url: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthereumConfig {
    pub rpc_url: String,
    pub confirmation_blocks: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from the configured file
    pub fn load() -> Result<Self> {
        let config_path = env::var("ZK_WATCHER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.zksync.rpc_url.is_empty() {
            anyhow::bail!("zksync.rpc_url must be set");
        }
        if self.ethereum.rpc_url.is_empty() {
            anyhow::bail!("ethereum.rpc_url must be set");
        }
        if self.watcher.refresh_debounce_ms == 0 {
            anyhow::bail!("watcher.refresh_debounce_ms must be greater than zero");
        }
        if self.watcher.health_check_interval_secs == 0 {
            anyhow::bail!("watcher.health_check_interval_secs must be greater than zero");
        }
        if self.zksync.poll_interval_ms == 0 || self.ethereum.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.ethereum.confirmation_blocks == 0 {
            tracing::warn!("ethereum.confirmation_blocks is 0, deposits settle on first receipt");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .context("Invalid substitution pattern")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[zksync]
rpc_url = "https://api.zksync.io/jsrpc"
poll_interval_ms = 1000

[ethereum]
rpc_url = "https://mainnet.example/${WATCHER_TEST_KEY}"
confirmation_blocks = 3
poll_interval_ms = 4000

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_watcher_defaults_when_section_missing() {
        let settings = Settings::parse(SAMPLE).unwrap();
        assert_eq!(settings.watcher.refresh_debounce_ms, 500);
        assert_eq!(settings.watcher.history_offset, 0);
        assert!(!settings.watcher.guard_duplicate_deposits);
        assert_eq!(settings.watcher.health_check_interval_secs, 30);
        assert_eq!(settings.watcher.refresh_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("WATCHER_TEST_KEY", "abc123");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.ethereum.rpc_url, "https://mainnet.example/abc123");
        assert_eq!(settings.ethereum.confirmation_blocks, 3);
        assert_eq!(settings.api.port, 8080);
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let input = format!("[watcher]\nrefresh_debounce_ms = 0\n{}", SAMPLE);
        assert!(Settings::parse(&input).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Settings::load_from(Path::new("/nonexistent/watcher.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
