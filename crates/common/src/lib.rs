//! # DIXN Common Crate
//!
//! Shared domain types and pure helpers for the DIXN participant node.
//!
//! ## Modules
//! - `types`: core newtypes (addresses, deployment ids, allocation ids, amounts)
//! - `allocation`: allocation records, on-chain state enum, deterministic id derivation
//! - `config`: configuration management
//! - `geohash`: geohash encoding for service registration
//!
//! ## Allocation Identity
//! ```text
//! ┌──────────────────────────────┐
//! │ seed + epoch + deployment    │
//! └──────────────┬───────────────┘
//!                │ keccak256 (+ collision index)
//!                ▼
//!        Ed25519 signing key
//!                │ trailing 20 bytes of pubkey
//!                ▼
//!          AllocationId
//! ```

pub mod allocation;
pub mod config;
pub mod geohash;
pub mod types;

pub use allocation::{
    allocation_id_proof, derive_allocation_id, Allocation, AllocationState, DeploymentSnapshot,
};
pub use config::{IndexerConfig, NodeConfig, TransactionConfig};
pub use types::{Address, AllocationId, BlockHash, DeploymentId, Epoch, Poi, TokenAmount, TxHash};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
