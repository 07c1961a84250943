//! Configuration for the wallet ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Fee schedule
    pub fees: FeeConfig,

    /// Retry policy for concurrent-modification conflicts
    pub retry: RetryConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet-ledger"),
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            fees: FeeConfig::default(),
            retry: RetryConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Fee rates per operation type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Deposit fee rate (fraction of gross amount)
    pub deposit_rate: Decimal,

    /// Withdrawal fee rate (fraction of gross amount)
    pub withdrawal_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            deposit_rate: Decimal::new(2, 2),     // 2%
            withdrawal_rate: Decimal::new(25, 3), // 2.5%
        }
    }
}

/// Retry policy for `ConcurrentModification`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts before the conflict is surfaced
    pub max_attempts: u32,

    /// Base backoff between attempts (milliseconds)
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 25,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(rate) = std::env::var("WALLET_LEDGER_DEPOSIT_RATE") {
            config.fees.deposit_rate = rate
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid deposit rate: {}", e)))?;
        }

        if let Ok(rate) = std::env::var("WALLET_LEDGER_WITHDRAWAL_RATE") {
            config.fees.withdrawal_rate = rate
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid withdrawal rate: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that hold for every loaded configuration
    pub fn validate(&self) -> crate::Result<()> {
        for (name, rate) in [
            ("deposit_rate", self.fees.deposit_rate),
            ("withdrawal_rate", self.fees.withdrawal_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(crate::Error::Config(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
