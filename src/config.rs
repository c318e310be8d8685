//! Gateway configuration, loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::lock::{LockScope, LockSettings};

/// Main gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub opt_out: OptOutConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Accounts allowed to use the gateway
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis URL (e.g., "redis://127.0.0.1:6379/0")
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptOutConfig {
    /// How long a STOP reply blocks the route
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    /// Maximum outbound sends per sender per window
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub hold_timeout_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub scope: LockScope,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub username: String,
    pub auth_id: String,
    /// Numbers owned by the account
    #[serde(default)]
    pub numbers: Vec<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_retention_secs() -> u64 {
    4 * 3600
}

fn default_limit() -> u64 {
    50
}

fn default_window_secs() -> u64 {
    24 * 3600
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "sms_gateway=info,tower_http=info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for OptOutConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

impl OptOutConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            hold_timeout_ms: default_lock_timeout_ms(),
            wait_timeout_ms: default_lock_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            scope: LockScope::default(),
        }
    }
}

impl LockConfig {
    pub fn settings(&self) -> LockSettings {
        LockSettings {
            hold_timeout: Duration::from_millis(self.hold_timeout_ms),
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// In-memory store and a single test account
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            opt_out: OptOutConfig::default(),
            quota: QuotaConfig::default(),
            lock: LockConfig::default(),
            log: LogConfig::default(),
            accounts: vec![AccountConfig {
                username: "test123".to_string(),
                auth_id: "20S0KPNOIM".to_string(),
                numbers: vec!["4924195509192".to_string()],
            }],
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.quota.limit == 0 {
            return Err(GatewayError::Config("quota.limit must be positive".into()));
        }
        if self.quota.window_secs == 0 {
            return Err(GatewayError::Config("quota.window_secs must be positive".into()));
        }
        if self.opt_out.retention_secs == 0 {
            return Err(GatewayError::Config(
                "opt_out.retention_secs must be positive".into(),
            ));
        }
        if self.lock.hold_timeout_ms == 0 || self.lock.poll_interval_ms == 0 {
            return Err(GatewayError::Config("lock timings must be positive".into()));
        }
        if self.lock.poll_interval_ms > self.lock.wait_timeout_ms {
            return Err(GatewayError::Config(
                "lock.poll_interval_ms exceeds lock.wait_timeout_ms".into(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.url.is_none() {
            return Err(GatewayError::Config("redis backend requires store.url".into()));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}
