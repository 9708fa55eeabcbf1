//! Keeper configuration.
//!
//! Read from `$WARDEN_DATA_DIR/config.toml`; every field has a default, so
//! a missing file or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_ledger::{CreditPolicy, RepairPolicy};
use warden_settlement::RetryPolicy;
use warden_types::KeeperId;

use crate::{KeeperError, Result};

/// Complete keeper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    #[serde(default)]
    pub keeper: NodeConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    /// Provider credit bounds and steps.
    #[serde(default)]
    pub credit: CreditPolicy,
    /// Retry policy for settlement calls.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Identity of this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network identifier of this keeper.
    #[serde(default = "default_keeper_id")]
    pub keeper_id: String,
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Challenge driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_challenge_interval")]
    pub interval_secs: u64,
    /// Blocks challenged per provider per round.
    #[serde(default = "default_max_blocks_per_round")]
    pub max_blocks_per_round: usize,
}

/// Repair driver and workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    #[serde(default = "default_repair_interval")]
    pub interval_secs: u64,
    /// Capacity of the repair work queue.
    #[serde(default = "default_repair_queue")]
    pub queue_capacity: usize,
    #[serde(default = "default_repair_workers")]
    pub workers: usize,
    /// Escalation schedule (`[repair.policy]`).
    #[serde(default)]
    pub policy: RepairPolicy,
}

/// Payment driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_payment_interval")]
    pub interval_secs: u64,
    /// Co-signatures a payment waits for after submission.
    #[serde(default)]
    pub co_signers: u32,
}

/// Inbound message dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_queue")]
    pub queue_capacity: usize,
    #[serde(default = "default_dispatch_workers")]
    pub workers: usize,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_persist_interval")]
    pub persist_interval_secs: u64,
    #[serde(default = "default_connectivity_interval")]
    pub connectivity_interval_secs: u64,
}

// Default value functions

fn default_keeper_id() -> String {
    "keeper".to_string()
}

fn default_challenge_interval() -> u64 {
    600
}

fn default_max_blocks_per_round() -> usize {
    100
}

fn default_repair_interval() -> u64 {
    600
}

fn default_repair_queue() -> usize {
    1024
}

fn default_repair_workers() -> usize {
    4
}

fn default_payment_interval() -> u64 {
    24 * 60 * 60
}

fn default_dispatch_queue() -> usize {
    1024
}

fn default_dispatch_workers() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_persist_interval() -> u64 {
    300
}

fn default_connectivity_interval() -> u64 {
    120
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            keeper_id: default_keeper_id(),
            data_dir: String::new(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_challenge_interval(),
            max_blocks_per_round: default_max_blocks_per_round(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_repair_interval(),
            queue_capacity: default_repair_queue(),
            workers: default_repair_workers(),
            policy: RepairPolicy::default(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_payment_interval(),
            co_signers: 0,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_dispatch_queue(),
            workers: default_dispatch_workers(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            persist_interval_secs: default_persist_interval(),
            connectivity_interval_secs: default_connectivity_interval(),
        }
    }
}

impl KeeperConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: KeeperConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// The validated keeper identifier.
    pub fn keeper_id(&self) -> Result<KeeperId> {
        KeeperId::new(self.keeper.keeper_id.as_str())
            .map_err(|e| KeeperError::Config(format!("keeper_id: {e}")))
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.keeper.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.keeper.data_dir)
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".warden"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/warden"))
    }
}
