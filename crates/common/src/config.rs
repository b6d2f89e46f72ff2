//! Config loader using TOML and serde.
//! Two sections: indexer identity/service settings and transaction
//! execution tuning. Missing fields fall back to defaults.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::Result;

/// Indexer-facing settings: who we are and what we advertise.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    /// Indexer account address (hex).
    pub indexer_address: String,

    /// Public URL of the indexer's query endpoint.
    pub url: String,

    /// Geographic coordinates advertised at registration: [lat, lon].
    pub geo_coordinates: [f64; 2],

    /// Restake claimed rebates instead of withdrawing them.
    #[serde(default = "default_restake")]
    pub restake_rewards: bool,
}

fn default_restake() -> bool {
    true
}

/// Transaction execution tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct TransactionConfig {
    /// Maximum submission attempts per transaction. 0 means unlimited.
    #[serde(default)]
    pub max_transaction_attempts: u32,

    /// Multiplier applied to the gas limit after an out-of-gas revert.
    #[serde(default = "default_gas_bump")]
    pub gas_increase_factor: f64,

    /// Ceiling on the estimated base fee per gas; submission waits while
    /// the network estimate is at or above this.
    #[serde(default = "default_base_fee_max")]
    pub base_fee_per_gas_max: u128,

    /// Per-attempt confirmation wait, in milliseconds.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_ms: u64,

    /// Confirmations required before a receipt is accepted.
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,
}

fn default_gas_bump() -> f64 {
    1.2
}

fn default_base_fee_max() -> u128 {
    100_000_000_000 // 100 gwei
}

fn default_confirmation_timeout() -> u64 {
    90_000
}

fn default_min_confirmations() -> u32 {
    3
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            max_transaction_attempts: 0,
            gas_increase_factor: default_gas_bump(),
            base_fee_per_gas_max: default_base_fee_max(),
            confirmation_timeout_ms: default_confirmation_timeout(),
            min_confirmations: default_min_confirmations(),
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub transactions: TransactionConfig,
}

/// Load config from a TOML file path.
/// If the file is missing or fails to parse, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<NodeConfig> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)?;
    let cfg: NodeConfig = toml::from_str(&s)?;
    Ok(cfg)
}
