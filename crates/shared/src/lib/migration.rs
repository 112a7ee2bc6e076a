use std::fmt;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::{AllocationPoints, PoolIndex};

/// Operator input exactly as received, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMigrationInput {
    pub allocation_points: String,
    pub staked_asset: String,
    pub auxiliary_distributors: Vec<String>,
    pub should_mass_update: bool,
    pub settlement_delay_seconds: u64,
}

/// Working state of a single pool migration.
///
/// Fields after `settlement_delay_seconds` start empty and are filled in as the steps
/// complete, so a persisted request tells exactly how far a run got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub requested_allocation_points: AllocationPoints,
    pub staked_asset: Address,
    pub auxiliary_distributors: Vec<Address>,
    pub should_mass_update: bool,
    pub settlement_delay_seconds: u64,
    /// Pool count of the current registry observed right before the pool was created.
    pub expected_pool_index: Option<PoolIndex>,
    pub assigned_pool_index: Option<PoolIndex>,
    pub legacy_allocation_before: Option<AllocationPoints>,
    pub recomputed_legacy_allocation: Option<AllocationPoints>,
}

impl MigrationRequest {
    pub fn new(
        requested_allocation_points: AllocationPoints,
        staked_asset: Address,
        auxiliary_distributors: Vec<Address>,
        should_mass_update: bool,
        settlement_delay_seconds: u64,
    ) -> Self {
        Self {
            requested_allocation_points,
            staked_asset,
            auxiliary_distributors,
            should_mass_update,
            settlement_delay_seconds,
            expected_pool_index: None,
            assigned_pool_index: None,
            legacy_allocation_before: None,
            recomputed_legacy_allocation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationStage {
    Idle,
    Validating,
    Provisioning,
    AwaitingSettlement,
    Rebalancing,
    Finalizing,
    Complete,
    Failed { at: FailedStage },
}

/// Non-terminal stage a run was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailedStage {
    Idle,
    Validating,
    Provisioning,
    AwaitingSettlement,
    Rebalancing,
    Finalizing,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Invalid migration stage transition {from} -> {to}")]
pub struct TransitionError {
    pub from: MigrationStage,
    pub to: MigrationStage,
}

impl MigrationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }

    /// The only forward transition allowed out of this stage.
    pub fn successor(&self) -> Option<MigrationStage> {
        match self {
            Self::Idle => Some(Self::Validating),
            Self::Validating => Some(Self::Provisioning),
            Self::Provisioning => Some(Self::AwaitingSettlement),
            Self::AwaitingSettlement => Some(Self::Rebalancing),
            Self::Rebalancing => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Complete),
            Self::Complete | Self::Failed { .. } => None,
        }
    }

    fn as_failed(&self) -> Option<FailedStage> {
        match self {
            Self::Idle => Some(FailedStage::Idle),
            Self::Validating => Some(FailedStage::Validating),
            Self::Provisioning => Some(FailedStage::Provisioning),
            Self::AwaitingSettlement => Some(FailedStage::AwaitingSettlement),
            Self::Rebalancing => Some(FailedStage::Rebalancing),
            Self::Finalizing => Some(FailedStage::Finalizing),
            Self::Complete | Self::Failed { .. } => None,
        }
    }

    pub fn advance(self) -> Result<MigrationStage, TransitionError> {
        self.transition(self.successor().unwrap_or(self))
    }

    pub fn fail(self) -> Result<MigrationStage, TransitionError> {
        match self.as_failed() {
            Some(at) => Ok(Self::Failed { at }),
            None => Err(TransitionError { from: self, to: self }),
        }
    }

    pub fn transition(self, to: MigrationStage) -> Result<MigrationStage, TransitionError> {
        let allowed = match to {
            Self::Failed { at } => self.as_failed() == Some(at),
            _ => self.successor() == Some(to),
        };
        if allowed {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Validating => f.write_str("validating"),
            Self::Provisioning => f.write_str("provisioning"),
            Self::AwaitingSettlement => f.write_str("awaiting_settlement"),
            Self::Rebalancing => f.write_str("rebalancing"),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Complete => f.write_str("complete"),
            Self::Failed { at } => write!(f, "failed({at:?})"),
        }
    }
}

/// Where a partially applied migration has to be picked up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumePoint {
    /// Pool exists in the current registry, legacy allocation may or may not be updated.
    Rebalance,
    /// Legacy allocation is committed, the new pool still carries its placeholder allocation.
    Finalize,
}

/// Result of a read-only dry run: what a migration would do against the current on-chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub staked_asset: Address,
    pub expected_pool_index: PoolIndex,
    pub requested_allocation_points: AllocationPoints,
    pub legacy_allocation_before: AllocationPoints,
    pub legacy_allocation_after: AllocationPoints,
}
