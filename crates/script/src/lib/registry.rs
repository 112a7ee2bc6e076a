use std::fmt;
use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, TxHash};
use axo_farms_migration_shared::pool::{AllocationPoints, PoolEntry, PoolIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    Legacy,
    Current,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Current => f.write_str("current"),
        }
    }
}

/// A mutation the ledger has confirmed with a successful receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{registry} registry {operation}: transaction {tx_hash:?} reverted: {reason}")]
    TransactionReverted {
        registry: RegistryKind,
        operation: &'static str,
        tx_hash: Option<TxHash>,
        reason: String,
    },

    #[error("{registry} registry {operation}: confirmation for {tx_hash} not observed within {timeout:?}")]
    TransactionTimeout {
        registry: RegistryKind,
        operation: &'static str,
        tx_hash: TxHash,
        timeout: Duration,
    },

    #[error("{registry} registry {operation}: failed to submit transaction: {reason}")]
    SubmissionFailed {
        registry: RegistryKind,
        operation: &'static str,
        reason: String,
    },

    #[error("{registry} registry {operation}: read failed: {reason}")]
    ReadFailure {
        registry: RegistryKind,
        operation: &'static str,
        reason: String,
    },
}

impl RegistryError {
    pub fn registry(&self) -> RegistryKind {
        match self {
            Self::TransactionReverted { registry, .. }
            | Self::TransactionTimeout { registry, .. }
            | Self::SubmissionFailed { registry, .. }
            | Self::ReadFailure { registry, .. } => *registry,
        }
    }

    /// A timed out transaction may still land later, so its effect is unknown rather than absent.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, Self::TransactionTimeout { .. })
    }
}

/// The registry new pools are created in (`MasterChefV2`).
pub trait CurrentRegistry {
    fn pool_count(&self) -> impl Future<Output = Result<u64, RegistryError>> + Send;

    fn pool_at(&self, index: PoolIndex) -> impl Future<Output = Result<PoolEntry, RegistryError>> + Send;

    /// Appends a pool with a zero placeholder allocation.
    fn create_pool(
        &self,
        staked_asset: Address,
        auxiliary_distributors: &[Address],
        should_mass_update: bool,
    ) -> impl Future<Output = Result<Confirmation, RegistryError>> + Send;

    fn set_pool(
        &self,
        index: PoolIndex,
        allocation_points: AllocationPoints,
        auxiliary_distributors: &[Address],
        overwrite: bool,
        should_mass_update: bool,
    ) -> impl Future<Output = Result<Confirmation, RegistryError>> + Send;
}

/// The registry holding the master slot (`MasterChef`).
pub trait LegacyRegistry {
    fn allocation_at(&self, slot: PoolIndex) -> impl Future<Output = Result<AllocationPoints, RegistryError>> + Send;

    fn set_allocation(
        &self,
        slot: PoolIndex,
        allocation_points: AllocationPoints,
    ) -> impl Future<Output = Result<Confirmation, RegistryError>> + Send;
}
