//! # Failure Classification & Retry Policy
//!
//! Turns an opaque failed transaction into a typed cause, and a typed
//! cause into an explicit decision: retry with an adjusted attempt, or
//! abandon. The executor consumes [`RetryDecision`] in a flat loop instead
//! of layering error handlers.
//!
//! ## Decision table
//!
//! | Cause                       | Decision                                  |
//! |-----------------------------|-------------------------------------------|
//! | out-of-gas revert           | gas limit ×bump, nonce +1, retry          |
//! | unknown revert              | abandon                                   |
//! | duplicate transaction       | cooldown, then abandon (re-read the chain)|
//! | nonce too low               | nonce +1, retry                           |
//! | fee too low / timeout       | re-run the fee gate, adopt fresh fees     |
//! | anything else               | retry with unchanged fields               |
//!
//! Every retry path increments the attempt counter exactly once; the
//! attempt ceiling in the executor bounds the "unchanged fields" case.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{ContractCall, FeeEstimate, LedgerClient, LedgerError};
use crate::fee_gate::await_acceptable_fee;

/// Cooldown after a duplicate-transaction diagnosis. The prior submission
/// has very likely been mined; the wait gives it a confirmation window
/// before the caller re-reads ledger state. Awaited in full before the
/// abandon decision is returned.
pub const DUPLICATE_TX_COOLDOWN: Duration = Duration::from_secs(30);

// ════════════════════════════════════════════════════════════════════════════════
// ATTEMPT RECORD
// ════════════════════════════════════════════════════════════════════════════════

/// Mutable per-submission state of one executor invocation.
///
/// Owned exclusively by the in-flight `execute` call; destroyed when it
/// returns. Only [`update_attempt`] mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct TxAttempt {
    /// 1-based attempt counter.
    pub attempt: u32,
    pub nonce: u64,
    pub fee: FeeEstimate,
    pub gas_limit: u64,
    /// Multiplier applied to the gas limit after an out-of-gas revert.
    pub gas_bump: f64,
}

impl TxAttempt {
    #[must_use]
    pub fn new(fee: FeeEstimate, gas_limit: u64, gas_bump: f64) -> Self {
        Self {
            attempt: 1,
            nonce: 0,
            fee,
            gas_limit,
            gas_bump,
        }
    }
}

fn bump_gas(gas_limit: u64, factor: f64) -> u64 {
    let bumped = ((gas_limit as f64) * factor).ceil() as u64;
    // A factor that rounds back down must still strictly increase the
    // limit, or the next attempt would revert identically.
    bumped.max(gas_limit.saturating_add(1))
}

// ════════════════════════════════════════════════════════════════════════════════
// REVERT CLASSIFICATION
// ════════════════════════════════════════════════════════════════════════════════

/// Recovery-relevant classification of a reverted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// Execution exhausted its gas limit.
    OutOfGas,
    /// No reason could be decoded; retrying cannot help.
    Unknown,
    /// A decoded revert string other than out-of-gas.
    Reverted(String),
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfGas => f.write_str("out of gas"),
            Self::Unknown => f.write_str("unknown"),
            Self::Reverted(reason) => f.write_str(reason),
        }
    }
}

/// ABI selector for `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Decode an ABI `Error(string)` revert payload.
///
/// Layout: 4-byte selector, 32-byte data offset, 32-byte length, then the
/// UTF-8 bytes padded to a word boundary.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 68 || data[0..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[60..68]);
    let len = u64::from_be_bytes(len_bytes) as usize;
    let end = 68usize.checked_add(len)?;
    if data.len() < end {
        return None;
    }
    String::from_utf8(data[68..end].to_vec()).ok()
}

/// Encode a revert string as an ABI `Error(string)` payload. Ledger client
/// implementations and test doubles use this to surface revert data the
/// way the chain does.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let bytes = reason.as_bytes();
    let mut data = Vec::with_capacity(68 + ((bytes.len() + 31) / 32) * 32);
    data.extend_from_slice(&ERROR_STRING_SELECTOR);
    let mut offset = [0u8; 32];
    offset[31] = 0x20;
    data.extend_from_slice(&offset);
    let mut len = [0u8; 32];
    len[24..32].copy_from_slice(&(bytes.len() as u64).to_be_bytes());
    data.extend_from_slice(&len);
    data.extend_from_slice(bytes);
    let pad = (32 - bytes.len() % 32) % 32;
    data.extend(std::iter::repeat(0u8).take(pad));
    data
}

/// Re-execute a failed call as a read-only simulation and classify the
/// revert.
///
/// A simulation that itself fails with a gas-exhaustion diagnostic means
/// the original ran out of gas. Any other simulation transport failure is
/// a hard stop and propagates.
pub async fn classify_revert(
    client: &dyn LedgerClient,
    call: &ContractCall,
) -> Result<RevertReason, LedgerError> {
    let reason = match client.simulate(call).await {
        Ok(data) => match decode_revert_reason(&data) {
            Some(decoded) => RevertReason::Reverted(decoded),
            None => RevertReason::Unknown,
        },
        Err(LedgerError::GasExhausted) => RevertReason::OutOfGas,
        Err(other) => return Err(other),
    };
    warn!(reason = %reason, "transaction reverted");
    Ok(reason)
}

// ════════════════════════════════════════════════════════════════════════════════
// RETRY DECISION
// ════════════════════════════════════════════════════════════════════════════════

/// What went wrong with one attempt: a transport failure around
/// submission/confirmation, or a classified on-chain revert.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Transport(LedgerError),
    Revert(RevertReason),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{}", err),
            Self::Revert(reason) => write!(f, "reverted: {}", reason),
        }
    }
}

/// Why an operation was abandoned short of its attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// Revert with an undecodable reason.
    UnknownRevert,
    /// A prior submission was likely mined; the caller must re-read
    /// ledger state rather than risk a double spend.
    DuplicateTransaction,
}

/// Outcome of the retry/update step.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Continue with this adjusted attempt.
    Retry(TxAttempt),
    /// Stop; the reason tells the caller what to do next.
    Abandon(AbandonReason),
}

/// Evaluate a failed attempt and produce the next step.
///
/// Fee-gate failures inside the fee-refresh arm propagate as errors; they
/// mean the ledger itself is unreachable, which no attempt adjustment
/// fixes.
pub async fn update_attempt(
    client: &dyn LedgerClient,
    base_fee_ceiling: u128,
    mut attempt: TxAttempt,
    failure: &AttemptFailure,
) -> Result<RetryDecision, LedgerError> {
    warn!(
        attempt = attempt.attempt,
        nonce = attempt.nonce,
        gas_limit = attempt.gas_limit,
        error = %failure,
        "failed to send transaction, evaluating retry possibilities"
    );

    match failure {
        AttemptFailure::Revert(RevertReason::OutOfGas) => {
            // The reverted transaction consumed its nonce.
            attempt.gas_limit = bump_gas(attempt.gas_limit, attempt.gas_bump);
            attempt.nonce += 1;
        }
        AttemptFailure::Revert(RevertReason::Unknown) => {
            return Ok(RetryDecision::Abandon(AbandonReason::UnknownRevert));
        }
        AttemptFailure::Revert(RevertReason::Reverted(_)) => {
            // Known reason, no adjustment helps; ride the attempt ceiling.
        }
        AttemptFailure::Transport(LedgerError::DuplicateTransaction) => {
            info!(
                cooldown_secs = DUPLICATE_TX_COOLDOWN.as_secs(),
                "duplicate transaction reported, prior submission likely succeeded; waiting before handing back"
            );
            tokio::time::sleep(DUPLICATE_TX_COOLDOWN).await;
            return Ok(RetryDecision::Abandon(AbandonReason::DuplicateTransaction));
        }
        AttemptFailure::Transport(LedgerError::NonceTooLow) => {
            attempt.nonce += 1;
        }
        AttemptFailure::Transport(LedgerError::FeeTooLow)
        | AttemptFailure::Transport(LedgerError::Timeout) => {
            let fresh = await_acceptable_fee(client, base_fee_ceiling).await?;
            attempt.fee = fresh;
        }
        AttemptFailure::Transport(_) => {
            // Unrecognized failure: unchanged fields, counted attempt.
        }
    }

    attempt.attempt += 1;
    Ok(RetryDecision::Retry(attempt))
}
