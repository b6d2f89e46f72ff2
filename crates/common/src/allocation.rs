//! Allocation records, the ledger's allocation state enum, and the
//! deterministic allocation-id derivation.
//!
//! ## Identity scheme
//!
//! Every allocation gets its own Ed25519 signing key, derived from the
//! node's secret seed so the same (seed, epoch, deployment) inputs always
//! reproduce the same key without storing anything. The allocation id is
//! the trailing 20 bytes of that key's public half, which keeps it
//! address-shaped and distinct from the indexer's main identity.
//!
//! Derivation is a pure function of `(seed, epoch, deployment, active set)`:
//! a collision with a currently active id bumps an internal index and
//! re-derives, so callers never see a duplicate.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::types::{Address, AllocationId, BlockHash, DeploymentId, Epoch, Poi, TokenAmount};

// ════════════════════════════════════════════════════════════════════════════════
// ALLOCATION STATE
// ════════════════════════════════════════════════════════════════════════════════

/// The ledger's authoritative allocation lifecycle enumeration.
///
/// Numeric values match the on-chain definition:
///
/// ```text
/// enum AllocationState { Null, Active, Closed, Finalized, Claimed }
/// ```
///
/// The node never transitions state locally; it requests transitions and
/// re-reads this enum before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AllocationState {
    /// Id unused on-chain.
    Null = 0,
    /// Capital committed, allocation open.
    Active = 1,
    /// Closed with a proof-of-indexing, rebate pending.
    Closed = 2,
    /// Terminalized by ledger-internal rules; no rebate claimable.
    Finalized = 3,
    /// Rebate claimed.
    Claimed = 4,
}

impl AllocationState {
    /// Parse the ledger's numeric representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::Active),
            2 => Some(Self::Closed),
            3 => Some(Self::Finalized),
            4 => Some(Self::Claimed),
            _ => None,
        }
    }
}

impl fmt::Display for AllocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "Null",
            Self::Active => "Active",
            Self::Closed => "Closed",
            Self::Finalized => "Finalized",
            Self::Claimed => "Claimed",
        };
        f.write_str(s)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ALLOCATION RECORD
// ════════════════════════════════════════════════════════════════════════════════

/// Denormalized deployment stake/signal snapshot carried on the record for
/// consumers; zeroed when the record is built from a creation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub staked_tokens: TokenAmount,
    pub signal_amount: TokenAmount,
}

/// Capital committed by this node against a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub deployment: DeploymentId,
    pub deployment_snapshot: DeploymentSnapshot,
    pub allocated_tokens: TokenAmount,
    pub created_at_epoch: Epoch,
    pub created_at_block_hash: BlockHash,
    /// Zero while the allocation is open.
    pub closed_at_epoch: Epoch,
    pub closed_at_block_hash: BlockHash,
    pub poi: Option<Poi>,
}

impl Allocation {
    pub fn is_open(&self) -> bool {
        self.closed_at_epoch == 0
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ID DERIVATION
// ════════════════════════════════════════════════════════════════════════════════

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

fn id_from_key(key: &VerifyingKey) -> AllocationId {
    let pk = key.to_bytes();
    let mut id = [0u8; 20];
    id.copy_from_slice(&pk[12..32]);
    AllocationId::from_bytes(id)
}

/// Derive the allocation signing key and id for `(seed, epoch, deployment)`.
///
/// The id must be globally unique at creation time; a collision with any
/// currently active id bumps the derivation index and re-derives, so the
/// returned id is guaranteed to avoid `active`. Deterministic: identical
/// inputs always yield the identical `(key, id)` pair.
pub fn derive_allocation_id(
    seed: &[u8; 32],
    epoch: Epoch,
    deployment: &DeploymentId,
    active: &[AllocationId],
) -> (SigningKey, AllocationId) {
    let mut index: u32 = 0;
    loop {
        let digest = keccak(&[
            seed,
            &epoch.to_be_bytes(),
            deployment.as_bytes(),
            &index.to_be_bytes(),
        ]);
        let key = SigningKey::from_bytes(&digest);
        let id = id_from_key(&key.verifying_key());
        if !active.contains(&id) {
            return (key, id);
        }
        index += 1;
    }
}

/// Signed ownership proof binding the indexer identity to a freshly derived
/// allocation id: an Ed25519 signature by the allocation key over
/// `keccak256(indexer ‖ allocation_id)`.
pub fn allocation_id_proof(
    signer: &SigningKey,
    indexer: &Address,
    allocation_id: &AllocationId,
) -> [u8; 64] {
    let message = keccak(&[indexer.as_bytes(), allocation_id.as_bytes()]);
    signer.sign(&message).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    const SEED: [u8; 32] = [0x5E; 32];

    fn deployment() -> DeploymentId {
        DeploymentId::from_bytes([0xD0; 32])
    }

    #[test]
    fn state_numeric_mapping() {
        assert_eq!(AllocationState::from_u8(0), Some(AllocationState::Null));
        assert_eq!(AllocationState::from_u8(1), Some(AllocationState::Active));
        assert_eq!(AllocationState::from_u8(4), Some(AllocationState::Claimed));
        assert_eq!(AllocationState::from_u8(5), None);
    }

    #[test]
    fn derivation_is_deterministic() {
        let (_, a) = derive_allocation_id(&SEED, 7, &deployment(), &[]);
        let (_, b) = derive_allocation_id(&SEED, 7, &deployment(), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn derivation_varies_with_inputs() {
        let (_, a) = derive_allocation_id(&SEED, 7, &deployment(), &[]);
        let (_, b) = derive_allocation_id(&SEED, 8, &deployment(), &[]);
        let (_, c) = derive_allocation_id(&SEED, 7, &DeploymentId::from_bytes([0xD1; 32]), &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn collision_forces_rederivation() {
        let (_, first) = derive_allocation_id(&SEED, 7, &deployment(), &[]);
        let (_, second) = derive_allocation_id(&SEED, 7, &deployment(), &[first]);
        assert_ne!(first, second);

        let (_, third) = derive_allocation_id(&SEED, 7, &deployment(), &[first, second]);
        assert_ne!(third, first);
        assert_ne!(third, second);
    }

    #[test]
    fn proof_verifies_under_allocation_key() {
        let indexer = Address::from_bytes([0x11; 20]);
        let (key, id) = derive_allocation_id(&SEED, 3, &deployment(), &[]);

        let proof = allocation_id_proof(&key, &indexer, &id);
        let message = keccak(&[indexer.as_bytes(), id.as_bytes()]);
        let sig = Signature::from_bytes(&proof);
        assert!(key.verifying_key().verify(&message, &sig).is_ok());
    }

    #[test]
    fn proof_binds_indexer_identity() {
        let indexer = Address::from_bytes([0x11; 20]);
        let other = Address::from_bytes([0x22; 20]);
        let (key, id) = derive_allocation_id(&SEED, 3, &deployment(), &[]);

        let proof = allocation_id_proof(&key, &indexer, &id);
        let wrong_message = keccak(&[other.as_bytes(), id.as_bytes()]);
        let sig = Signature::from_bytes(&proof);
        assert!(key.verifying_key().verify(&wrong_message, &sig).is_err());
    }

    #[test]
    fn open_allocation_has_zero_close_epoch() {
        let (_, id) = derive_allocation_id(&SEED, 1, &deployment(), &[]);
        let alloc = Allocation {
            id,
            deployment: deployment(),
            deployment_snapshot: DeploymentSnapshot::default(),
            allocated_tokens: 1_000,
            created_at_epoch: 1,
            created_at_block_hash: BlockHash::zero(),
            closed_at_epoch: 0,
            closed_at_block_hash: BlockHash::zero(),
            poi: None,
        };
        assert!(alloc.is_open());
    }
}
