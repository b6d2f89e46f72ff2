//! # DIXN Ledger Crate
//!
//! Reliable transaction execution over an abstract ledger client.
//!
//! ## Modules
//! - `client`: `LedgerClient` trait, wire types and the scripted mock
//! - `signal`: read-only gate signals (network pause, operator status)
//! - `fee_gate`: fee-threshold gating before every submission
//! - `retry`: failure classification and the retry decision table
//! - `executor`: the submit/confirm/retry loop
//!
//! ## Execution path
//! ```text
//! lifecycle operation
//!   └─ TransactionExecutor::execute
//!        ├─ Signal gates (paused / operator)
//!        ├─ await_acceptable_fee
//!        ├─ LedgerClient::submit / wait_for_confirmation
//!        └─ classify_revert → update_attempt → RetryDecision
//! ```

pub mod client;
pub mod executor;
pub mod fee_gate;
pub mod retry;
pub mod signal;

pub use client::{
    ContractCall, FeeEstimate, LedgerClient, LedgerError, MockLedgerClient, PendingTx, Receipt,
    ReceiptEvent, RegisteredService, TransactionRequest,
};
pub use executor::{ExecutorError, TransactionExecutor, TxOutcome};
pub use fee_gate::{await_acceptable_fee, FEE_POLL_INTERVAL};
pub use retry::{
    classify_revert, decode_revert_reason, encode_revert_reason, update_attempt, AbandonReason,
    AttemptFailure, RetryDecision, RevertReason, TxAttempt, DUPLICATE_TX_COOLDOWN,
};
pub use signal::{
    monitor_network_pauses, monitor_operator_status, Signal, SIGNAL_REFRESH_INTERVAL,
};
