//! # Transaction Executor
//!
//! Submits a transaction, waits for confirmation, and drives the retry
//! loop on failure.
//!
//! ```text
//! execute(estimate_gas, submit, action)
//!      │
//!      ├─ paused gate ──────────────▶ TxOutcome::Paused
//!      ├─ operator gate ────────────▶ TxOutcome::Unauthorized
//!      │
//!      ▼
//! await_acceptable_fee ─▶ gas estimate ×1.5 ─▶ submit
//!      │
//!      ▼
//! ┌───────────────────────── retry loop ─────────────────────────┐
//! │ attempt ceiling? ── cooldown ──▶ Err(AttemptsExhausted)      │
//! │ resubmit (attempt > 1, rebuilt from the attempt record)      │
//! │ wait_for_confirmation                                        │
//! │ reverted? ──▶ classify_revert                                │
//! │ failure ──▶ update_attempt ──▶ Retry(next) │ Abandon(reason) │
//! └──────────────────────────────────────────────────────────────┘
//!      │
//!      ▼
//! TxOutcome::Confirmed(receipt)
//! ```
//!
//! The gate checks run before any gas is estimated, so a paused network or
//! missing operator authorization costs nothing. No state outlives the
//! call: a crash mid-retry loses only the in-memory attempt record, and
//! callers re-derive intent from ledger state, which is why every
//! lifecycle operation is idempotent against the chain.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use dixn_common::config::TransactionConfig;

use crate::client::{
    FeeEstimate, LedgerClient, LedgerError, PendingTx, Receipt, TransactionRequest,
};
use crate::fee_gate::await_acceptable_fee;
use crate::retry::{
    classify_revert, update_attempt, AbandonReason, AttemptFailure, RetryDecision, TxAttempt,
};
use crate::signal::Signal;

/// Headroom multiplier applied to gas estimates before submission.
const GAS_LIMIT_HEADROOM: f64 = 1.5;

/// Cooldown before reporting an exhausted attempt ceiling, giving the last
/// submission a final mining window.
const RETRY_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

// ════════════════════════════════════════════════════════════════════════════════
// OUTCOME / ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Successful result of [`TransactionExecutor::execute`].
///
/// The gate sentinels are distinguishable outcomes, not errors: callers
/// treat them as benign skips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// The transaction was mined and confirmed.
    Confirmed(Receipt),
    /// The network is paused; nothing was submitted.
    Paused,
    /// This identity lacks operator authorization; nothing was submitted.
    Unauthorized,
}

/// Terminal executor failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// The transaction reverted with no decodable reason.
    UnknownRevert,
    /// The configured attempt ceiling was reached without a receipt.
    AttemptsExhausted { attempts: u32 },
    /// A prior submission of this transaction was likely mined; the
    /// caller must re-read ledger state before acting again.
    DuplicateTransaction,
    /// A ledger interaction outside the recovery table failed outright
    /// (fee estimation, gas estimation, or revert classification).
    Ledger(LedgerError),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRevert => write!(f, "transaction reverted with unknown reason"),
            Self::AttemptsExhausted { attempts } => {
                write!(f, "gave up after {} transaction attempts", attempts)
            }
            Self::DuplicateTransaction => write!(
                f,
                "duplicate transaction, prior submission likely succeeded"
            ),
            Self::Ledger(err) => write!(f, "ledger failure: {}", err),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<LedgerError> for ExecutorError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// EXECUTOR
// ════════════════════════════════════════════════════════════════════════════════

/// Reliable transaction execution over a [`LedgerClient`].
///
/// Owns nothing persistent: the per-call attempt record lives on the
/// stack of `execute` and dies with it. Cloning is cheap and shares the
/// client and gate signals.
#[derive(Clone)]
pub struct TransactionExecutor {
    client: Arc<dyn LedgerClient>,
    paused: Signal<bool>,
    operator: Signal<bool>,
    config: TransactionConfig,
}

impl TransactionExecutor {
    #[must_use]
    pub fn new(
        client: Arc<dyn LedgerClient>,
        paused: Signal<bool>,
        operator: Signal<bool>,
        config: TransactionConfig,
    ) -> Self {
        Self {
            client,
            paused,
            operator,
            config,
        }
    }

    /// Execute a transaction to confirmation.
    ///
    /// `estimate_gas` is the zero-argument estimation for the intended
    /// call; `submit` builds and broadcasts it with the given gas limit
    /// and fee fields (the ledger client assigns the nonce). Resubmissions
    /// are rebuilt by the executor itself from the first submission's
    /// request, with only nonce/fee/gas-limit replaced from the attempt
    /// record.
    pub async fn execute<EG, EGFut, SB, SBFut>(
        &self,
        estimate_gas: EG,
        submit: SB,
        action: &str,
    ) -> Result<TxOutcome, ExecutorError>
    where
        EG: Fn() -> EGFut,
        EGFut: Future<Output = Result<u64, LedgerError>>,
        SB: Fn(u64, FeeEstimate) -> SBFut,
        SBFut: Future<Output = Result<PendingTx, LedgerError>>,
    {
        if self.paused.current() {
            info!(action, "network is paused, skipping this action");
            return Ok(TxOutcome::Paused);
        }

        if !self.operator.current() {
            info!(
                action,
                "not authorized as an operator for the indexer, skipping this action"
            );
            return Ok(TxOutcome::Unauthorized);
        }

        let fee = await_acceptable_fee(self.client.as_ref(), self.config.base_fee_per_gas_max)
            .await?;

        let estimate = estimate_gas().await?;
        let padded_gas_limit = ((estimate as f64) * GAS_LIMIT_HEADROOM).ceil() as u64;

        let mut txc = TxAttempt::new(fee, padded_gas_limit, self.config.gas_increase_factor);
        // Request fields of the first accepted submission; resubmissions
        // preserve its destination, value, payload and chain id.
        let mut template: Option<TransactionRequest> = None;

        info!(
            action,
            attempt = txc.attempt,
            gas_limit = txc.gas_limit,
            fee = %txc.fee,
            "sending transaction"
        );

        let timeout = Duration::from_millis(self.config.confirmation_timeout_ms);

        loop {
            let max_attempts = self.config.max_transaction_attempts;
            if max_attempts != 0 && txc.attempt > max_attempts {
                warn!(
                    action,
                    attempts = max_attempts,
                    "transaction retry limit reached, giving up"
                );
                tokio::time::sleep(RETRY_LIMIT_COOLDOWN).await;
                return Err(ExecutorError::AttemptsExhausted {
                    attempts: max_attempts,
                });
            }

            let step: Result<Receipt, AttemptFailure> = 'attempt: {
                let pending: PendingTx = if let Some(base) = template.clone() {
                    info!(
                        action,
                        attempt = txc.attempt,
                        nonce = txc.nonce,
                        gas_limit = txc.gas_limit,
                        fee = %txc.fee,
                        "resubmitting transaction"
                    );
                    let request = TransactionRequest {
                        call: base.call,
                        sender: base.sender,
                        value: base.value,
                        chain_id: base.chain_id,
                        nonce: txc.nonce,
                        fee: txc.fee,
                        gas_limit: txc.gas_limit,
                    };
                    match self.client.resubmit(&request).await {
                        Ok(pending) => pending,
                        Err(err) => break 'attempt Err(AttemptFailure::Transport(err)),
                    }
                } else {
                    match submit(txc.gas_limit, txc.fee).await {
                        Ok(pending) => {
                            txc.nonce = pending.request.nonce;
                            template = Some(pending.request.clone());
                            pending
                        }
                        Err(err) => break 'attempt Err(AttemptFailure::Transport(err)),
                    }
                };

                info!(
                    action,
                    tx = %pending.hash,
                    attempt = txc.attempt,
                    nonce = pending.request.nonce,
                    "transaction pending"
                );

                let receipt = match self
                    .client
                    .wait_for_confirmation(&pending, self.config.min_confirmations, timeout)
                    .await
                {
                    Ok(receipt) => receipt,
                    Err(err) => break 'attempt Err(AttemptFailure::Transport(err)),
                };

                if !receipt.success {
                    match classify_revert(self.client.as_ref(), &pending.request.call).await {
                        Ok(reason) => break 'attempt Err(AttemptFailure::Revert(reason)),
                        // A simulation transport failure is a hard stop.
                        Err(hard) => return Err(ExecutorError::Ledger(hard)),
                    }
                }

                Ok(receipt)
            };

            match step {
                Ok(receipt) => {
                    info!(
                        action,
                        tx = %receipt.transaction_hash,
                        block = %receipt.block_hash,
                        "transaction successfully included in block"
                    );
                    return Ok(TxOutcome::Confirmed(receipt));
                }
                Err(failure) => {
                    let decision = update_attempt(
                        self.client.as_ref(),
                        self.config.base_fee_per_gas_max,
                        txc,
                        &failure,
                    )
                    .await?;

                    match decision {
                        RetryDecision::Retry(next) => txc = next,
                        RetryDecision::Abandon(AbandonReason::UnknownRevert) => {
                            return Err(ExecutorError::UnknownRevert)
                        }
                        RetryDecision::Abandon(AbandonReason::DuplicateTransaction) => {
                            return Err(ExecutorError::DuplicateTransaction)
                        }
                    }
                }
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ContractCall, MockLedgerClient, ReceiptEvent};
    use dixn_common::types::{AllocationId, BlockHash, TxHash};

    fn config(max_attempts: u32) -> TransactionConfig {
        TransactionConfig {
            max_transaction_attempts: max_attempts,
            gas_increase_factor: 1.2,
            base_fee_per_gas_max: 100,
            confirmation_timeout_ms: 90_000,
            min_confirmations: 3,
        }
    }

    fn executor(mock: &Arc<MockLedgerClient>, max_attempts: u32) -> TransactionExecutor {
        TransactionExecutor::new(
            Arc::clone(mock) as Arc<dyn LedgerClient>,
            Signal::fixed(false),
            Signal::fixed(true),
            config(max_attempts),
        )
    }

    fn claim_call() -> ContractCall {
        ContractCall::ClaimRebate {
            allocation_id: AllocationId::from_bytes([1; 20]),
            restake: true,
        }
    }

    async fn run(
        exec: &TransactionExecutor,
        mock: &Arc<MockLedgerClient>,
        call: &ContractCall,
    ) -> Result<TxOutcome, ExecutorError> {
        let client = Arc::clone(mock) as Arc<dyn LedgerClient>;
        let estimate = {
            let client = Arc::clone(&client);
            let call = call.clone();
            move || {
                let client = Arc::clone(&client);
                let call = call.clone();
                async move { client.estimate_gas(&call).await }
            }
        };
        let submit = {
            let client = Arc::clone(&client);
            let call = call.clone();
            move |gas_limit: u64, fee: FeeEstimate| {
                let client = Arc::clone(&client);
                let call = call.clone();
                async move { client.submit(&call, 0, gas_limit, fee).await }
            }
        };
        exec.execute(estimate, submit, "claim").await
    }

    fn reverted_receipt() -> Receipt {
        Receipt {
            transaction_hash: TxHash::from_bytes([0xAA; 32]),
            block_hash: BlockHash::from_bytes([0xBB; 32]),
            success: false,
            events: Vec::new(),
        }
    }

    // ── Test 1: paused gate short-circuits before any ledger call ───────

    #[tokio::test]
    async fn paused_returns_sentinel_without_ledger_calls() {
        let mock = Arc::new(MockLedgerClient::new());
        let exec = TransactionExecutor::new(
            Arc::clone(&mock) as Arc<dyn LedgerClient>,
            Signal::fixed(true),
            Signal::fixed(true),
            config(3),
        );

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert_eq!(outcome, TxOutcome::Paused);
        assert_eq!(mock.total_calls(), 0);
    }

    // ── Test 2: operator gate short-circuits ────────────────────────────

    #[tokio::test]
    async fn unauthorized_returns_sentinel_without_ledger_calls() {
        let mock = Arc::new(MockLedgerClient::new());
        let exec = TransactionExecutor::new(
            Arc::clone(&mock) as Arc<dyn LedgerClient>,
            Signal::fixed(false),
            Signal::fixed(false),
            config(3),
        );

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert_eq!(outcome, TxOutcome::Unauthorized);
        assert_eq!(mock.total_calls(), 0);
    }

    // ── Test 3: clean first-attempt confirmation ────────────────────────

    #[tokio::test]
    async fn confirms_on_first_attempt() {
        let mock = Arc::new(MockLedgerClient::new());
        let exec = executor(&mock, 3);

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert!(matches!(outcome, TxOutcome::Confirmed(_)));
        assert_eq!(mock.submit_count(), 1);

        // Gas estimate (default 100_000) padded by 50%; fee seeded from
        // the accepted gate estimate.
        let requests = mock.submitted_requests();
        assert_eq!(requests[0].gas_limit, 150_000);
        assert_eq!(requests[0].fee, FeeEstimate::Legacy { gas_price: 1 });
    }

    // ── Test 4: attempt ceiling terminates with exact attempt count ─────

    #[tokio::test(start_paused = true)]
    async fn attempt_ceiling_terminates() {
        let mock = Arc::new(MockLedgerClient::new());
        for _ in 0..3 {
            mock.push_submit_result(Err(LedgerError::Network("pool rejected".to_string())));
        }
        let exec = executor(&mock, 3);

        let result = run(&exec, &mock, &claim_call()).await;
        assert_eq!(result, Err(ExecutorError::AttemptsExhausted { attempts: 3 }));
        assert_eq!(mock.submit_count(), 3);
    }

    // ── Test 5: nonce-too-low recovers with the next nonce ──────────────

    #[tokio::test]
    async fn nonce_too_low_then_success() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_submit_result(Err(LedgerError::NonceTooLow));
        let exec = executor(&mock, 5);

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert!(matches!(outcome, TxOutcome::Confirmed(_)));

        let requests = mock.submitted_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].nonce, requests[0].nonce + 1);
    }

    // ── Test 6: out-of-gas revert bumps gas and nonce on resubmission ───

    #[tokio::test]
    async fn out_of_gas_resubmits_with_bumped_gas() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_confirmation(Ok(reverted_receipt()));
        mock.push_simulation(Err(LedgerError::GasExhausted));
        let exec = executor(&mock, 5);

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert!(matches!(outcome, TxOutcome::Confirmed(_)));

        let requests = mock.submitted_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].gas_limit > requests[0].gas_limit);
        assert_eq!(requests[1].nonce, requests[0].nonce + 1);
        // Payload preserved across the resubmission.
        assert_eq!(requests[1].call, requests[0].call);
        assert_eq!(requests[1].chain_id, requests[0].chain_id);
    }

    // ── Test 7: unknown revert is terminal after one submission ─────────

    #[tokio::test]
    async fn unknown_revert_is_terminal() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_confirmation(Ok(reverted_receipt()));
        mock.push_simulation(Ok(Vec::new())); // undecodable
        let exec = executor(&mock, 5);

        let result = run(&exec, &mock, &claim_call()).await;
        assert_eq!(result, Err(ExecutorError::UnknownRevert));
        assert_eq!(mock.submit_count(), 1);
    }

    // ── Test 8: confirmation timeout refreshes the fee ──────────────────

    #[tokio::test(start_paused = true)]
    async fn timeout_refreshes_fee_fields() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 5 }); // initial gate
        mock.push_fee_estimate(FeeEstimate::Legacy { gas_price: 3 }); // refresh
        mock.push_confirmation(Err(LedgerError::Timeout));
        let exec = executor(&mock, 5);

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        assert!(matches!(outcome, TxOutcome::Confirmed(_)));

        let requests = mock.submitted_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].fee, FeeEstimate::Legacy { gas_price: 5 });
        assert_eq!(requests[1].fee, FeeEstimate::Legacy { gas_price: 3 });
        // Nonce unchanged: same transaction, repriced.
        assert_eq!(requests[1].nonce, requests[0].nonce);
    }

    // ── Test 9: duplicate transaction abandons after the cooldown ───────

    #[tokio::test(start_paused = true)]
    async fn duplicate_transaction_is_terminal() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_submit_result(Err(LedgerError::DuplicateTransaction));
        let exec = executor(&mock, 5);

        let result = run(&exec, &mock, &claim_call()).await;
        assert_eq!(result, Err(ExecutorError::DuplicateTransaction));
        assert_eq!(mock.submit_count(), 1);
    }

    // ── Test 10: hard classification failure propagates ─────────────────

    #[tokio::test]
    async fn classification_transport_failure_propagates() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_confirmation(Ok(reverted_receipt()));
        mock.push_simulation(Err(LedgerError::Network("rpc gone".to_string())));
        let exec = executor(&mock, 5);

        let result = run(&exec, &mock, &claim_call()).await;
        assert!(matches!(result, Err(ExecutorError::Ledger(LedgerError::Network(_)))));
    }

    // ── Test 11: receipt events survive the loop ────────────────────────

    #[tokio::test]
    async fn confirmed_receipt_carries_events() {
        let mock = Arc::new(MockLedgerClient::new());
        mock.push_confirmation(Ok(Receipt {
            transaction_hash: TxHash::from_bytes([0x01; 32]),
            block_hash: BlockHash::from_bytes([0x02; 32]),
            success: true,
            events: vec![ReceiptEvent::AllocationCreated {
                allocation_id: AllocationId::from_bytes([3; 20]),
                tokens: 77,
                epoch: 12,
            }],
        }));
        let exec = executor(&mock, 5);

        let outcome = run(&exec, &mock, &claim_call()).await.expect("outcome");
        match outcome {
            TxOutcome::Confirmed(receipt) => {
                let (_, tokens, epoch) = receipt.allocation_created().expect("event");
                assert_eq!(tokens, 77);
                assert_eq!(epoch, 12);
            }
            other => panic!("expected Confirmed, got {:?}", other),
        }
    }
}
