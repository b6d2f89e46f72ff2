//! # Ledger Client Abstraction
//!
//! Trait-abstracted capability surface over the chain this node stakes on,
//! plus a scripted mock for tests.
//!
//! ```text
//! AllocationManager / TransactionExecutor
//!      │
//!      ▼
//! ┌──────────────┐
//! │ LedgerClient │  <- Abstract trait
//! └──────┬───────┘
//!        │
//!   ┌────┴─────────────┐
//!   │                  │
//! ┌─▼──────────────┐ ┌─▼────────────────┐
//! │ JSON-RPC client│ │ MockLedgerClient │
//! │ (deployment)   │ │ (tests)          │
//! └────────────────┘ └──────────────────┘
//! ```
//!
//! ## Contract
//!
//! - Implementations MUST NOT retry internally; retry policy lives in the
//!   transaction executor.
//! - `submit` assigns the nonce (serialized per signing identity) and chain
//!   id; `resubmit` sends the request's fields verbatim. The executor uses
//!   it to replay a transaction with bumped gas, a new nonce or fresh fees
//!   while preserving destination, value, payload and chain id.
//! - Ledger state returned by the read methods is authoritative; callers
//!   re-read it before every mutating decision instead of caching.
//! - No `panic!`, `unwrap()`, `expect()` in implementations.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use dixn_common::types::{
    Address, AllocationId, BlockHash, DeploymentId, Epoch, Poi, TokenAmount, TxHash,
};
use dixn_common::AllocationState;

// ════════════════════════════════════════════════════════════════════════════════
// FEE ESTIMATE
// ════════════════════════════════════════════════════════════════════════════════

/// A point-in-time fee snapshot from the ledger.
///
/// Legacy and fee-market pricing are mutually exclusive, so the type is an
/// enum rather than a struct of optionals. Estimates are never persisted
/// and never reused across fee-threshold decisions; the gate re-fetches on
/// every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeEstimate {
    /// Single-price transaction type.
    Legacy { gas_price: u128 },
    /// Fee-market transaction type with a max-fee / priority-fee pair.
    Market {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl FeeEstimate {
    /// The base fee the threshold gate compares against the configured
    /// ceiling. For market estimates this mirrors how the upstream
    /// provider derives `max_fee_per_gas` from its base-fee view:
    /// `(max_fee - max_priority_fee) / 2`. Legacy estimates gate on the
    /// gas price itself.
    pub fn base_fee(&self) -> u128 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::Market {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => max_fee_per_gas.saturating_sub(*max_priority_fee_per_gas) / 2,
        }
    }
}

impl fmt::Display for FeeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy { gas_price } => write!(f, "legacy(gas_price={})", gas_price),
            Self::Market {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "market(max_fee={}, max_priority_fee={})",
                max_fee_per_gas, max_priority_fee_per_gas
            ),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTRACT CALLS
// ════════════════════════════════════════════════════════════════════════════════

/// Typed payloads for the staking/registry operations this node performs.
///
/// The concrete wire encoding belongs to the `LedgerClient` implementation;
/// the core only ever handles these typed descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// Register (or re-register) the indexer's service endpoint.
    RegisterService {
        indexer: Address,
        url: String,
        geohash: String,
    },

    /// Open an allocation against a deployment.
    Allocate {
        indexer: Address,
        deployment: DeploymentId,
        tokens: TokenAmount,
        allocation_id: AllocationId,
        metadata: [u8; 32],
        /// Ownership proof binding the indexer to the allocation id.
        proof: [u8; 64],
    },

    /// Close an allocation with a proof-of-indexing.
    CloseAllocation { allocation_id: AllocationId, poi: Poi },

    /// Atomically close one allocation and open another in a single
    /// transaction. The intermediate closed-but-not-reallocated state is
    /// never observable.
    CloseAndAllocate {
        close_allocation_id: AllocationId,
        poi: Poi,
        indexer: Address,
        deployment: DeploymentId,
        tokens: TokenAmount,
        new_allocation_id: AllocationId,
        metadata: [u8; 32],
        proof: [u8; 64],
    },

    /// Claim a closed allocation's share of the rebate pool.
    ClaimRebate {
        allocation_id: AllocationId,
        /// Restake the claimed value instead of withdrawing it.
        restake: bool,
    },
}

impl ContractCall {
    /// Short operation name for log context.
    pub fn action(&self) -> &'static str {
        match self {
            Self::RegisterService { .. } => "register",
            Self::Allocate { .. } => "allocate",
            Self::CloseAllocation { .. } => "close",
            Self::CloseAndAllocate { .. } => "closeAndAllocate",
            Self::ClaimRebate { .. } => "claim",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TRANSACTION REQUEST / PENDING HANDLE / RECEIPT
// ════════════════════════════════════════════════════════════════════════════════

/// Fully-specified transaction: what `submit` assigned plus what the caller
/// provided. `resubmit` replays these fields verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub call: ContractCall,
    pub sender: Address,
    pub value: TokenAmount,
    pub chain_id: u64,
    pub nonce: u64,
    pub fee: FeeEstimate,
    pub gas_limit: u64,
}

/// Handle to a submitted-but-unconfirmed transaction. Carries the full
/// request so retries can rebuild resubmissions without re-deriving the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: TxHash,
    pub request: TransactionRequest,
}

/// Lifecycle events decoded from confirmation receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptEvent {
    /// An allocation was created on-chain.
    AllocationCreated {
        allocation_id: AllocationId,
        tokens: TokenAmount,
        epoch: Epoch,
    },
    /// The indexer's service endpoint was registered.
    ServiceRegistered {
        indexer: Address,
        url: String,
        geohash: String,
    },
}

/// Confirmation receipt for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_hash: BlockHash,
    /// False when the transaction was mined but reverted.
    pub success: bool,
    pub events: Vec<ReceiptEvent>,
}

impl Receipt {
    /// First `AllocationCreated` event, if present.
    pub fn allocation_created(&self) -> Option<(AllocationId, TokenAmount, Epoch)> {
        self.events.iter().find_map(|event| match event {
            ReceiptEvent::AllocationCreated {
                allocation_id,
                tokens,
                epoch,
            } => Some((*allocation_id, *tokens, *epoch)),
            _ => None,
        })
    }

    /// Whether a `ServiceRegistered` event is present.
    pub fn has_service_registered(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, ReceiptEvent::ServiceRegistered { .. }))
    }
}

/// On-chain service registry record for an indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    pub url: String,
    pub geohash: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Transport and ledger-level failures. The retry policy keys off these
/// variants; implementations are responsible for mapping their concrete
/// client's diagnostics onto them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The same transaction (or its nonce) was already accepted by the
    /// pool. Usually means an earlier attempt succeeded.
    DuplicateTransaction,
    /// The submitted nonce is below the account's current nonce.
    NonceTooLow,
    /// The offered fee is below what the pool currently accepts.
    FeeTooLow,
    /// A request or confirmation wait timed out.
    Timeout,
    /// Execution reverted; carries the decoded reason when one exists.
    Reverted(String),
    /// A simulation ran out of gas.
    GasExhausted,
    /// Any other transport-level failure.
    Network(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTransaction => {
                write!(f, "transaction with the same nonce was already imported")
            }
            Self::NonceTooLow => write!(f, "transaction nonce is too low"),
            Self::FeeTooLow => write!(f, "fee is too low, try increasing the fee"),
            Self::Timeout => write!(f, "timeout exceeded"),
            Self::Reverted(reason) => write!(f, "execution reverted: {}", reason),
            Self::GasExhausted => write!(f, "execution ran out of gas"),
            Self::Network(msg) => write!(f, "ledger network error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT TRAIT
// ════════════════════════════════════════════════════════════════════════════════

/// Capability surface the node consumes from its ledger.
///
/// Object-safe and `Send + Sync` so one client can serve concurrent
/// lifecycle operations; nonce assignment inside `submit` must be
/// serialized per signing identity by the implementation.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current fee snapshot. Callers never cache the result.
    async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError>;

    /// Gas required by `call`; fails with [`LedgerError::Reverted`] if the
    /// call would revert.
    async fn estimate_gas(&self, call: &ContractCall) -> Result<u64, LedgerError>;

    /// Sign and broadcast `call`, assigning nonce and chain id.
    async fn submit(
        &self,
        call: &ContractCall,
        value: TokenAmount,
        gas_limit: u64,
        fee: FeeEstimate,
    ) -> Result<PendingTx, LedgerError>;

    /// Broadcast a fully-specified request verbatim (retry path).
    async fn resubmit(&self, request: &TransactionRequest) -> Result<PendingTx, LedgerError>;

    /// Wait until `pending` has at least `min_confirmations` confirmations
    /// or `timeout` elapses.
    async fn wait_for_confirmation(
        &self,
        pending: &PendingTx,
        min_confirmations: u32,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError>;

    /// Execute `call` read-only and return its raw return data. For a
    /// reverting call the return data is the ABI revert payload; used for
    /// revert-reason decoding.
    async fn simulate(&self, call: &ContractCall) -> Result<Vec<u8>, LedgerError>;

    /// Authoritative lifecycle state for an allocation id.
    async fn allocation_state(&self, id: AllocationId) -> Result<AllocationState, LedgerError>;

    /// Stake capacity the indexer has free for new allocations.
    async fn indexer_capacity(&self, indexer: Address) -> Result<TokenAmount, LedgerError>;

    /// Current ledger epoch.
    async fn current_epoch(&self) -> Result<Epoch, LedgerError>;

    /// Registered service record for `indexer`, if any.
    async fn registered_service(
        &self,
        indexer: Address,
    ) -> Result<Option<RegisteredService>, LedgerError>;

    /// Whether the network is globally paused.
    async fn network_paused(&self) -> Result<bool, LedgerError>;

    /// Whether `operator` is authorized to act for `indexer`.
    async fn is_operator(&self, operator: Address, indexer: Address)
        -> Result<bool, LedgerError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// MOCK CLIENT
// ════════════════════════════════════════════════════════════════════════════════

pub use mock::MockLedgerClient;

mod mock {
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use dixn_common::types::{
        Address, AllocationId, BlockHash, Epoch, TokenAmount, TxHash,
    };
    use dixn_common::AllocationState;

    use super::{
        ContractCall, FeeEstimate, LedgerClient, LedgerError, PendingTx, Receipt,
        RegisteredService, TransactionRequest,
    };

    /// Scripted in-memory ledger for tests.
    ///
    /// Mutating methods (`submit`, `resubmit`, `wait_for_confirmation`,
    /// `estimate_gas`, `simulate`, `fee_estimate`) pop pre-loaded responses
    /// in FIFO order and fall back to a benign default when their queue is
    /// empty; read methods return settable state. Call counters and the
    /// recorded submission list let tests assert exactly how many ledger
    /// interactions an operation performed.
    pub struct MockLedgerClient {
        fee_estimates: Mutex<VecDeque<Result<FeeEstimate, LedgerError>>>,
        gas_estimates: Mutex<VecDeque<Result<u64, LedgerError>>>,
        submit_results: Mutex<VecDeque<Result<(), LedgerError>>>,
        confirmations: Mutex<VecDeque<Result<Receipt, LedgerError>>>,
        simulations: Mutex<VecDeque<Result<Vec<u8>, LedgerError>>>,

        allocation_states: Mutex<HashMap<AllocationId, AllocationState>>,
        capacity: Mutex<TokenAmount>,
        epoch: Mutex<Epoch>,
        service: Mutex<Option<RegisteredService>>,
        paused: Mutex<bool>,
        operator: Mutex<bool>,

        submitted: Mutex<Vec<TransactionRequest>>,
        next_nonce: AtomicU64,

        fee_estimate_calls: AtomicU32,
        gas_estimate_calls: AtomicU32,
        submit_calls: AtomicU32,
        confirmation_calls: AtomicU32,
        simulate_calls: AtomicU32,
        state_calls: AtomicU32,
        read_calls: AtomicU32,
    }

    impl MockLedgerClient {
        #[must_use]
        pub fn new() -> Self {
            Self {
                fee_estimates: Mutex::new(VecDeque::new()),
                gas_estimates: Mutex::new(VecDeque::new()),
                submit_results: Mutex::new(VecDeque::new()),
                confirmations: Mutex::new(VecDeque::new()),
                simulations: Mutex::new(VecDeque::new()),
                allocation_states: Mutex::new(HashMap::new()),
                capacity: Mutex::new(u128::MAX),
                epoch: Mutex::new(1),
                service: Mutex::new(None),
                paused: Mutex::new(false),
                operator: Mutex::new(true),
                submitted: Mutex::new(Vec::new()),
                next_nonce: AtomicU64::new(0),
                fee_estimate_calls: AtomicU32::new(0),
                gas_estimate_calls: AtomicU32::new(0),
                submit_calls: AtomicU32::new(0),
                confirmation_calls: AtomicU32::new(0),
                simulate_calls: AtomicU32::new(0),
                state_calls: AtomicU32::new(0),
                read_calls: AtomicU32::new(0),
            }
        }

        // ── Scripting ────────────────────────────────────────────────────

        pub fn push_fee_estimate(&self, estimate: FeeEstimate) {
            self.fee_estimates.lock().push_back(Ok(estimate));
        }

        pub fn push_fee_error(&self, error: LedgerError) {
            self.fee_estimates.lock().push_back(Err(error));
        }

        pub fn push_gas_estimate(&self, result: Result<u64, LedgerError>) {
            self.gas_estimates.lock().push_back(result);
        }

        pub fn push_submit_result(&self, result: Result<(), LedgerError>) {
            self.submit_results.lock().push_back(result);
        }

        pub fn push_confirmation(&self, result: Result<Receipt, LedgerError>) {
            self.confirmations.lock().push_back(result);
        }

        pub fn push_simulation(&self, result: Result<Vec<u8>, LedgerError>) {
            self.simulations.lock().push_back(result);
        }

        pub fn set_allocation_state(&self, id: AllocationId, state: AllocationState) {
            self.allocation_states.lock().insert(id, state);
        }

        pub fn set_capacity(&self, capacity: TokenAmount) {
            *self.capacity.lock() = capacity;
        }

        pub fn set_epoch(&self, epoch: Epoch) {
            *self.epoch.lock() = epoch;
        }

        pub fn set_registered_service(&self, service: Option<RegisteredService>) {
            *self.service.lock() = service;
        }

        pub fn set_paused(&self, paused: bool) {
            *self.paused.lock() = paused;
        }

        pub fn set_operator(&self, operator: bool) {
            *self.operator.lock() = operator;
        }

        // ── Observation ──────────────────────────────────────────────────

        pub fn submitted_requests(&self) -> Vec<TransactionRequest> {
            self.submitted.lock().clone()
        }

        pub fn fee_estimate_count(&self) -> u32 {
            self.fee_estimate_calls.load(Ordering::SeqCst)
        }

        pub fn gas_estimate_count(&self) -> u32 {
            self.gas_estimate_calls.load(Ordering::SeqCst)
        }

        pub fn submit_count(&self) -> u32 {
            self.submit_calls.load(Ordering::SeqCst)
        }

        pub fn confirmation_count(&self) -> u32 {
            self.confirmation_calls.load(Ordering::SeqCst)
        }

        pub fn simulate_count(&self) -> u32 {
            self.simulate_calls.load(Ordering::SeqCst)
        }

        pub fn state_count(&self) -> u32 {
            self.state_calls.load(Ordering::SeqCst)
        }

        /// Total ledger interactions of any kind, reads included.
        pub fn total_calls(&self) -> u32 {
            self.fee_estimate_count()
                + self.gas_estimate_count()
                + self.submit_count()
                + self.confirmation_count()
                + self.simulate_count()
                + self.state_count()
                + self.read_calls.load(Ordering::SeqCst)
        }

        fn tx_hash_for(&self, nonce: u64) -> TxHash {
            let mut bytes = [0u8; 32];
            bytes[24..32].copy_from_slice(&nonce.to_be_bytes());
            TxHash::from_bytes(bytes)
        }

        fn record(&self, request: TransactionRequest) -> PendingTx {
            let hash = self.tx_hash_for(request.nonce);
            self.submitted.lock().push(request.clone());
            PendingTx { hash, request }
        }
    }

    impl Default for MockLedgerClient {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Default receipt when no confirmation is scripted: success, no events.
    fn default_receipt(pending: &PendingTx) -> Receipt {
        Receipt {
            transaction_hash: pending.hash,
            block_hash: BlockHash::from_bytes([0xB0; 32]),
            success: true,
            events: Vec::new(),
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedgerClient {
        async fn fee_estimate(&self) -> Result<FeeEstimate, LedgerError> {
            self.fee_estimate_calls.fetch_add(1, Ordering::SeqCst);
            self.fee_estimates
                .lock()
                .pop_front()
                .unwrap_or(Ok(FeeEstimate::Legacy { gas_price: 1 }))
        }

        async fn estimate_gas(&self, _call: &ContractCall) -> Result<u64, LedgerError> {
            self.gas_estimate_calls.fetch_add(1, Ordering::SeqCst);
            self.gas_estimates.lock().pop_front().unwrap_or(Ok(100_000))
        }

        async fn submit(
            &self,
            call: &ContractCall,
            value: TokenAmount,
            gas_limit: u64,
            fee: FeeEstimate,
        ) -> Result<PendingTx, LedgerError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
            let request = TransactionRequest {
                call: call.clone(),
                sender: Address::from_bytes([0x0E; 20]),
                value,
                chain_id: 1,
                nonce,
                fee,
                gas_limit,
            };
            let pending = self.record(request);
            match self.submit_results.lock().pop_front() {
                Some(Err(e)) => Err(e),
                _ => Ok(pending),
            }
        }

        async fn resubmit(&self, request: &TransactionRequest) -> Result<PendingTx, LedgerError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let pending = self.record(request.clone());
            match self.submit_results.lock().pop_front() {
                Some(Err(e)) => Err(e),
                _ => Ok(pending),
            }
        }

        async fn wait_for_confirmation(
            &self,
            pending: &PendingTx,
            _min_confirmations: u32,
            _timeout: Duration,
        ) -> Result<Receipt, LedgerError> {
            self.confirmation_calls.fetch_add(1, Ordering::SeqCst);
            self.confirmations
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(default_receipt(pending)))
        }

        async fn simulate(&self, _call: &ContractCall) -> Result<Vec<u8>, LedgerError> {
            self.simulate_calls.fetch_add(1, Ordering::SeqCst);
            self.simulations
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(LedgerError::Network("no mock simulation".to_string())))
        }

        async fn allocation_state(
            &self,
            id: AllocationId,
        ) -> Result<AllocationState, LedgerError> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .allocation_states
                .lock()
                .get(&id)
                .copied()
                .unwrap_or(AllocationState::Null))
        }

        async fn indexer_capacity(&self, _indexer: Address) -> Result<TokenAmount, LedgerError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(*self.capacity.lock())
        }

        async fn current_epoch(&self) -> Result<Epoch, LedgerError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(*self.epoch.lock())
        }

        async fn registered_service(
            &self,
            _indexer: Address,
        ) -> Result<Option<RegisteredService>, LedgerError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.service.lock().clone())
        }

        async fn network_paused(&self) -> Result<bool, LedgerError> {
            Ok(*self.paused.lock())
        }

        async fn is_operator(
            &self,
            _operator: Address,
            _indexer: Address,
        ) -> Result<bool, LedgerError> {
            Ok(*self.operator.lock())
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<MockLedgerClient>();
        assert_send_sync::<FeeEstimate>();
        assert_send_sync::<Receipt>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use dixn_common::types::AllocationId;

    // ── Test 1: base fee derivation ─────────────────────────────────────

    #[test]
    fn base_fee_market_derivation() {
        let estimate = FeeEstimate::Market {
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
        };
        assert_eq!(estimate.base_fee(), 45);

        // Priority above max saturates to zero rather than underflowing.
        let inverted = FeeEstimate::Market {
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 100,
        };
        assert_eq!(inverted.base_fee(), 0);
    }

    #[test]
    fn base_fee_legacy_is_gas_price() {
        let estimate = FeeEstimate::Legacy { gas_price: 42 };
        assert_eq!(estimate.base_fee(), 42);
    }

    // ── Test 2: mock nonce assignment ───────────────────────────────────

    #[tokio::test]
    async fn mock_assigns_increasing_nonces() {
        let mock = MockLedgerClient::new();
        let call = ContractCall::ClaimRebate {
            allocation_id: AllocationId::from_bytes([1; 20]),
            restake: true,
        };
        let fee = FeeEstimate::Legacy { gas_price: 1 };

        let a = mock.submit(&call, 0, 100, fee).await.expect("submit a");
        let b = mock.submit(&call, 0, 100, fee).await.expect("submit b");
        assert_eq!(b.request.nonce, a.request.nonce + 1);
        assert_eq!(mock.submit_count(), 2);
    }

    // ── Test 3: scripted submit failure still records the request ───────

    #[tokio::test]
    async fn mock_records_failed_submission() {
        let mock = MockLedgerClient::new();
        mock.push_submit_result(Err(LedgerError::NonceTooLow));

        let call = ContractCall::ClaimRebate {
            allocation_id: AllocationId::from_bytes([1; 20]),
            restake: false,
        };
        let result = mock
            .submit(&call, 0, 100, FeeEstimate::Legacy { gas_price: 1 })
            .await;
        assert_eq!(result, Err(LedgerError::NonceTooLow));
        assert_eq!(mock.submitted_requests().len(), 1);
    }

    // ── Test 4: allocation state defaults to Null ───────────────────────

    #[tokio::test]
    async fn mock_state_defaults_to_null() {
        let mock = MockLedgerClient::new();
        let id = AllocationId::from_bytes([7; 20]);
        assert_eq!(
            mock.allocation_state(id).await.expect("state"),
            AllocationState::Null
        );

        mock.set_allocation_state(id, AllocationState::Active);
        assert_eq!(
            mock.allocation_state(id).await.expect("state"),
            AllocationState::Active
        );
    }

    // ── Test 5: receipt event helpers ───────────────────────────────────

    #[test]
    fn receipt_event_helpers() {
        let receipt = Receipt {
            transaction_hash: TxHash::zero(),
            block_hash: BlockHash::zero(),
            success: true,
            events: vec![ReceiptEvent::AllocationCreated {
                allocation_id: AllocationId::from_bytes([2; 20]),
                tokens: 500,
                epoch: 9,
            }],
        };
        let (id, tokens, epoch) = receipt.allocation_created().expect("event");
        assert_eq!(id, AllocationId::from_bytes([2; 20]));
        assert_eq!(tokens, 500);
        assert_eq!(epoch, 9);
        assert!(!receipt.has_service_registered());
    }

    // ── Test 6: error display ───────────────────────────────────────────

    #[test]
    fn error_display() {
        assert!(LedgerError::NonceTooLow.to_string().contains("nonce"));
        assert!(LedgerError::FeeTooLow.to_string().contains("fee"));
        assert!(LedgerError::Timeout.to_string().contains("timeout"));
        assert!(LedgerError::Reverted("bad state".into())
            .to_string()
            .contains("bad state"));
    }
}
