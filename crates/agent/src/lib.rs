//! # DIXN Agent Crate
//!
//! The allocation lifecycle manager: registration, allocate, close,
//! atomic close-and-reallocate, and rebate claims, each idempotent
//! against authoritative ledger state before any gas is spent.

pub mod manager;

pub use manager::{AllocationManager, LifecycleError};
