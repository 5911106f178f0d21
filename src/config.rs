use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit per-transfer state transitions and guard events
    #[serde(default)]
    pub enable_tracing: bool,
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Accounts created at startup
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "acctlock.log".to_string(),
            use_json: false,
            rotation: "never".to_string(),
            enable_tracing: false,
            transfer: TransferConfig::default(),
            accounts: Vec::new(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Upper bound on each balance guard wait; absent means wait forever
    pub lock_timeout_ms: Option<u64>,
    /// Capacity of the notification outbox; 0 logs notifications instead
    pub notify_queue_size: usize,
}

impl TransferConfig {
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeedAccount {
    pub id: String,
    pub balance: Decimal,
}

/// Concurrent transfer workload run by the binary
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub threads: usize,
    pub transfers_per_thread: usize,
    /// Largest random transfer amount, in whole units
    pub max_amount: Decimal,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            transfers_per_thread: 1000,
            max_amount: Decimal::from(100),
            seed: 42,
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        Self::from_path(format!("config/{}.yaml", env))
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
