//! # Allocation Lifecycle Manager
//!
//! The domain state machine over the transaction executor:
//!
//! ```text
//! Null ──allocate──▶ Active ──close──▶ Closed ──claim──▶ Claimed
//!                                        │
//!                                        └──(ledger-internal)──▶ Finalized
//! ```
//!
//! Transitions are only ever *requested*; before every mutating operation
//! the manager re-reads the allocation's authoritative on-chain state and
//! no-ops when that state already reflects the desired outcome. Combined
//! with the executor's at-least-once retry semantics this makes every
//! operation safe to call repeatedly from a scheduling loop.
//!
//! ## Failure contract
//!
//! - Invalid or non-actionable input (zero amount, already in the desired
//!   state, insufficient capacity) is a logged skip, never an error.
//! - `allocate`/`close_and_allocate` swallow all failures into `None`:
//!   callers treat an absent allocation as "try again next cycle".
//! - `close`/`claim` return plain success booleans.
//! - `register` surfaces its error; a registration that cannot complete
//!   needs operator attention.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use dixn_common::allocation::{
    allocation_id_proof, derive_allocation_id, Allocation, AllocationState, DeploymentSnapshot,
};
use dixn_common::geohash;
use dixn_common::types::{Address, AllocationId, BlockHash, DeploymentId, Poi, TokenAmount};
use dixn_ledger::client::{ContractCall, LedgerClient, LedgerError, Receipt};
use dixn_ledger::executor::{ExecutorError, TransactionExecutor, TxOutcome};
use dixn_ledger::signal::Signal;

// ════════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════════

/// Failures below the lifecycle boundary. `allocate`, `close`,
/// `close_and_allocate` and `claim` convert these to soft results;
/// `register` propagates them.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// The confirmation receipt lacks the event that proves the
    /// operation took effect.
    MissingEvent(&'static str),
    /// The requested amount exceeds the stake available for it.
    InsufficientCapacity {
        requested: TokenAmount,
        available: TokenAmount,
    },
    /// Terminal transaction-executor failure.
    Executor(ExecutorError),
    /// Ledger read failed outside the executor.
    Ledger(LedgerError),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEvent(event) => {
                write!(f, "expected {} event missing from receipt", event)
            }
            Self::InsufficientCapacity {
                requested,
                available,
            } => write!(
                f,
                "allocation of {} cancelled: only {} stake available",
                requested, available
            ),
            Self::Executor(err) => write!(f, "{}", err),
            Self::Ledger(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<ExecutorError> for LifecycleError {
    fn from(err: ExecutorError) -> Self {
        Self::Executor(err)
    }
}

impl From<LedgerError> for LifecycleError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MANAGER
// ════════════════════════════════════════════════════════════════════════════════

/// Owns the high-level allocation intent for one indexer identity.
///
/// The manager holds the amount/deployment decisions; the executor owns
/// the in-flight attempt; the ledger owns the truth.
pub struct AllocationManager {
    client: Arc<dyn LedgerClient>,
    executor: TransactionExecutor,
    /// Operator-authorization gate, shared with the executor. Read here
    /// for the registration pre-check.
    operator: Signal<bool>,
    indexer: Address,
    url: String,
    geo_coordinates: [f64; 2],
    restake_rewards: bool,
    /// Secret seed for deterministic allocation-id derivation.
    seed: [u8; 32],
}

impl AllocationManager {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: Arc<dyn LedgerClient>,
        executor: TransactionExecutor,
        operator: Signal<bool>,
        indexer: Address,
        url: String,
        geo_coordinates: [f64; 2],
        restake_rewards: bool,
        seed: [u8; 32],
    ) -> Self {
        Self {
            client,
            executor,
            operator,
            indexer,
            url,
            geo_coordinates,
            restake_rewards,
            seed,
        }
    }

    /// Run `call` through the executor with this manager's client.
    async fn execute_call(&self, call: &ContractCall) -> Result<TxOutcome, LifecycleError> {
        let client = Arc::clone(&self.client);
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
            move |gas_limit, fee| {
                let client = Arc::clone(&client);
                let call = call.clone();
                async move { client.submit(&call, 0, gas_limit, fee).await }
            }
        };
        self.executor
            .execute(estimate, submit, call.action())
            .await
            .map_err(LifecycleError::Executor)
    }

    // ── register ─────────────────────────────────────────────────────────

    /// Register the indexer's service endpoint, if not already registered
    /// with an identical URL and geohash.
    pub async fn register(&self) -> Result<(), LifecycleError> {
        let geohash = geohash::encode_default(self.geo_coordinates[0], self.geo_coordinates[1]);

        info!(
            indexer = %self.indexer,
            url = %self.url,
            geohash = %geohash,
            "register indexer"
        );

        if let Some(service) = self.client.registered_service(self.indexer).await? {
            if service.url == self.url && service.geohash == geohash {
                if self.operator.current() {
                    info!("indexer already registered, operator status already granted");
                    return Ok(());
                }
                info!("indexer already registered, operator status not yet granted");
            }
        }

        let call = ContractCall::RegisterService {
            indexer: self.indexer,
            url: self.url.clone(),
            geohash,
        };

        let receipt = match self.execute_call(&call).await? {
            TxOutcome::Paused | TxOutcome::Unauthorized => return Ok(()),
            TxOutcome::Confirmed(receipt) => receipt,
        };

        if !receipt.has_service_registered() {
            return Err(LifecycleError::MissingEvent("ServiceRegistered"));
        }

        info!("successfully registered indexer");
        Ok(())
    }

    // ── allocate ─────────────────────────────────────────────────────────

    /// Open an allocation against `deployment`.
    ///
    /// Returns `None` on every non-actionable or failed path; the caller's
    /// scheduling loop retries on its own cadence.
    pub async fn allocate(
        &self,
        deployment: DeploymentId,
        amount: TokenAmount,
        active_allocations: &[Allocation],
    ) -> Option<Allocation> {
        if amount == 0 {
            warn!(
                deployment = %deployment,
                "cannot allocate zero tokens, skipping this allocation"
            );
            return None;
        }

        match self
            .try_allocate(deployment, amount, active_allocations)
            .await
        {
            Ok(allocation) => allocation,
            Err(err) => {
                error!(deployment = %deployment, amount, error = %err, "failed to allocate");
                None
            }
        }
    }

    async fn try_allocate(
        &self,
        deployment: DeploymentId,
        amount: TokenAmount,
        active_allocations: &[Allocation],
    ) -> Result<Option<Allocation>, LifecycleError> {
        let current_epoch = self.client.current_epoch().await?;

        info!(
            deployment = %deployment,
            amount,
            epoch = current_epoch,
            "allocate to deployment"
        );

        let free_stake = self.client.indexer_capacity(self.indexer).await?;
        if free_stake < amount {
            return Err(LifecycleError::InsufficientCapacity {
                requested: amount,
                available: free_stake,
            });
        }

        let active_ids: Vec<AllocationId> =
            active_allocations.iter().map(|a| a.id).collect();
        let (signer, allocation_id) =
            derive_allocation_id(&self.seed, current_epoch, &deployment, &active_ids);

        // Re-check against the chain before spending gas on an id that a
        // previous (possibly crashed) run already used.
        let state = self.client.allocation_state(allocation_id).await?;
        if state != AllocationState::Null {
            info!(
                allocation = %allocation_id,
                state = %state,
                "skipping allocation as it already exists on-chain"
            );
            return Ok(None);
        }

        let proof = allocation_id_proof(&signer, &self.indexer, &allocation_id);

        info!(
            indexer = %self.indexer,
            amount,
            allocation = %allocation_id,
            "allocate"
        );

        let call = ContractCall::Allocate {
            indexer: self.indexer,
            deployment,
            tokens: amount,
            allocation_id,
            metadata: [0u8; 32],
            proof,
        };

        let receipt = match self.execute_call(&call).await? {
            TxOutcome::Paused | TxOutcome::Unauthorized => return Ok(None),
            TxOutcome::Confirmed(receipt) => receipt,
        };

        let created = self.decode_creation(&receipt, allocation_id, deployment)?;
        info!(
            tokens = created.allocated_tokens,
            allocation = %created.id,
            epoch = created.created_at_epoch,
            "successfully allocated to deployment"
        );
        Ok(Some(created))
    }

    /// Build the allocation record from the creation event in `receipt`.
    fn decode_creation(
        &self,
        receipt: &Receipt,
        allocation_id: AllocationId,
        deployment: DeploymentId,
    ) -> Result<Allocation, LifecycleError> {
        let (_, tokens, epoch) = receipt
            .allocation_created()
            .ok_or(LifecycleError::MissingEvent("AllocationCreated"))?;

        Ok(Allocation {
            id: allocation_id,
            deployment,
            deployment_snapshot: DeploymentSnapshot::default(),
            allocated_tokens: tokens,
            created_at_epoch: epoch,
            created_at_block_hash: receipt.block_hash,
            closed_at_epoch: 0,
            closed_at_block_hash: BlockHash::zero(),
            poi: None,
        })
    }

    // ── close ────────────────────────────────────────────────────────────

    /// Close an allocation with its proof-of-indexing.
    ///
    /// Already-closed allocations are a success no-op. Gate sentinels and
    /// recoverable failures return `false` so the caller retries later.
    pub async fn close(&self, allocation: &Allocation, poi: Poi) -> bool {
        match self.try_close(allocation, poi).await {
            Ok(closed) => closed,
            Err(err) => {
                warn!(
                    allocation = %allocation.id,
                    error = %err,
                    "failed to close allocation"
                );
                false
            }
        }
    }

    async fn try_close(&self, allocation: &Allocation, poi: Poi) -> Result<bool, LifecycleError> {
        info!(
            allocation = %allocation.id,
            deployment = %allocation.deployment,
            created_at_epoch = allocation.created_at_epoch,
            poi = %poi,
            "close allocation"
        );

        let state = self.client.allocation_state(allocation.id).await?;
        if state != AllocationState::Active {
            info!(state = %state, "allocation has already been closed");
            return Ok(true);
        }

        let call = ContractCall::CloseAllocation {
            allocation_id: allocation.id,
            poi,
        };

        match self.execute_call(&call).await? {
            TxOutcome::Paused | TxOutcome::Unauthorized => Ok(false),
            TxOutcome::Confirmed(_) => {
                info!("successfully closed allocation");
                Ok(true)
            }
        }
    }

    // ── close_and_allocate ───────────────────────────────────────────────

    /// Atomically close `existing` and open a new allocation against
    /// `deployment` in one ledger transaction. The intermediate
    /// closed-but-unreallocated state is never observable.
    ///
    /// The new amount is sized against the combined capacity: free stake
    /// plus the tokens freed by closing `existing`.
    pub async fn close_and_allocate(
        &self,
        existing: &Allocation,
        poi: Poi,
        deployment: DeploymentId,
        amount: TokenAmount,
        active_allocations: &[Allocation],
    ) -> Option<Allocation> {
        match self
            .try_close_and_allocate(existing, poi, deployment, amount, active_allocations)
            .await
        {
            Ok(allocation) => allocation,
            Err(err) => {
                error!(
                    existing = %existing.id,
                    deployment = %deployment,
                    amount,
                    error = %err,
                    "failed to close and reallocate"
                );
                None
            }
        }
    }

    async fn try_close_and_allocate(
        &self,
        existing: &Allocation,
        poi: Poi,
        deployment: DeploymentId,
        amount: TokenAmount,
        active_allocations: &[Allocation],
    ) -> Result<Option<Allocation>, LifecycleError> {
        let existing_state = self.client.allocation_state(existing.id).await?;
        if existing_state != AllocationState::Active {
            info!(
                existing = %existing.id,
                state = %existing_state,
                "existing allocation has already been closed"
            );
            return Ok(None);
        }

        if amount == 0 {
            warn!(
                deployment = %deployment,
                "cannot reallocate zero tokens, skipping this allocation"
            );
            return Ok(None);
        }

        let current_epoch = self.client.current_epoch().await?;

        info!(
            existing_allocation_amount = existing.allocated_tokens,
            new_allocation_amount = amount,
            epoch = current_epoch,
            "reallocate to deployment"
        );

        let free_stake = self.client.indexer_capacity(self.indexer).await?;
        // Closing the existing allocation frees its tokens inside the
        // same transaction, so they count toward the new allocation.
        let post_close_free_stake = free_stake.saturating_add(existing.allocated_tokens);
        if post_close_free_stake < amount {
            return Err(LifecycleError::InsufficientCapacity {
                requested: amount,
                available: post_close_free_stake,
            });
        }

        let active_ids: Vec<AllocationId> =
            active_allocations.iter().map(|a| a.id).collect();
        let (signer, new_allocation_id) =
            derive_allocation_id(&self.seed, current_epoch, &deployment, &active_ids);

        let new_state = self.client.allocation_state(new_allocation_id).await?;
        if new_state != AllocationState::Null {
            warn!(
                allocation = %new_allocation_id,
                state = %new_state,
                "skipping allocation as it already exists on-chain"
            );
            return Ok(None);
        }

        let proof = allocation_id_proof(&signer, &self.indexer, &new_allocation_id);

        info!(
            indexer = %self.indexer,
            amount,
            old_allocation = %existing.id,
            new_allocation = %new_allocation_id,
            "executing reallocate transaction"
        );

        let call = ContractCall::CloseAndAllocate {
            close_allocation_id: existing.id,
            poi,
            indexer: self.indexer,
            deployment,
            tokens: amount,
            new_allocation_id,
            metadata: [0u8; 32],
            proof,
        };

        let receipt = match self.execute_call(&call).await? {
            TxOutcome::Paused | TxOutcome::Unauthorized => return Ok(None),
            TxOutcome::Confirmed(receipt) => receipt,
        };

        let created = self.decode_creation(&receipt, new_allocation_id, deployment)?;
        info!(
            deployment = %deployment,
            tokens = created.allocated_tokens,
            allocation = %created.id,
            epoch = created.created_at_epoch,
            "successfully reallocated to deployment"
        );
        Ok(Some(created))
    }

    // ── claim ────────────────────────────────────────────────────────────

    /// Claim a closed allocation's rebate-pool share.
    ///
    /// `Claimed` (already done) and `Active` (not yet closeable) are both
    /// success no-ops.
    pub async fn claim(&self, allocation: &Allocation) -> bool {
        match self.try_claim(allocation).await {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(
                    allocation = %allocation.id,
                    error = %err,
                    "failed to claim allocation"
                );
                false
            }
        }
    }

    async fn try_claim(&self, allocation: &Allocation) -> Result<bool, LifecycleError> {
        info!(
            allocation = %allocation.id,
            deployment = %allocation.deployment,
            closed_at_epoch = allocation.closed_at_epoch,
            restake_rewards = self.restake_rewards,
            "claim tokens from the rebate pool"
        );

        let state = self.client.allocation_state(allocation.id).await?;
        if state == AllocationState::Claimed {
            info!("allocation rebate already claimed");
            return Ok(true);
        }
        if state == AllocationState::Active {
            info!("allocation still active");
            return Ok(true);
        }

        let call = ContractCall::ClaimRebate {
            allocation_id: allocation.id,
            restake: self.restake_rewards,
        };

        match self.execute_call(&call).await? {
            TxOutcome::Paused | TxOutcome::Unauthorized => Ok(false),
            TxOutcome::Confirmed(_) => {
                info!("successfully claimed allocation");
                Ok(true)
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
