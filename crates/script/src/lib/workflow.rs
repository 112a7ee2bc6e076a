use std::time::Duration;

use alloy_primitives::Address;
use axo_farms_migration_shared::migration::{
    MigrationPlan, MigrationRequest, MigrationStage, RawMigrationInput, ResumePoint, TransitionError,
};
use axo_farms_migration_shared::pool::{rebalanced_master_allocation, AllocationOverflow, AllocationPoints, PoolIndex};
use axo_farms_migration_shared::validation::{self, InputError};
use thiserror::Error;
use tracing::Instrument;

use crate::recovery::RecoveryMarker;
use crate::registry::{Confirmation, CurrentRegistry, LegacyRegistry, RegistryError};
use crate::settlement::{SettlementError, SettlementStrategy, SettlementWaiter};

/// `setPool` always replaces the distributor list of the freshly created pool.
const OVERWRITE_DISTRIBUTORS: bool = true;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    AllocationOverflow(#[from] AllocationOverflow),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(
        "Pool index conflict: expected new pool at {expected:?}, pool count {pool_count} implies {inferred:?}, \
         stored asset {observed_asset:?} vs requested {requested_asset}"
    )]
    PoolIndexConflict {
        expected: Option<PoolIndex>,
        inferred: Option<PoolIndex>,
        pool_count: u64,
        observed_asset: Option<Address>,
        requested_asset: Address,
    },

    #[error(
        "Legacy allocation at slot {slot} drifted: recorded {recorded_before} before rebalancing, \
         expected {recorded_before} or {expected_after}, found {observed}"
    )]
    LegacyAllocationDrift {
        slot: PoolIndex,
        recorded_before: AllocationPoints,
        expected_after: AllocationPoints,
        observed: AllocationPoints,
    },

    #[error("Recovery marker targets master slot {recorded}, but {configured} is configured")]
    MasterSlotMismatch { recorded: PoolIndex, configured: PoolIndex },

    #[error("Migration request is missing {0} required to continue")]
    IncompleteRequest(&'static str),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

#[derive(Debug, Error)]
#[error("Migration failed in stage {stage}: {error}")]
pub struct MigrationFailure {
    pub stage: MigrationStage,
    #[source]
    pub error: MigrationError,
    /// Request state at the moment of failure. `None` when validation never produced one.
    pub request: Option<MigrationRequest>,
    /// Present when on-chain state may have been partially mutated.
    pub recovery: Option<RecoveryMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub request: MigrationRequest,
    pub provisioned: Option<Confirmation>,
    /// `None` when a resumed run found the legacy allocation already committed.
    pub rebalanced: Option<Confirmation>,
    pub finalized: Confirmation,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowConfig {
    pub master_slot: PoolIndex,
    pub settlement: SettlementStrategy,
}

struct StageTracker {
    stage: MigrationStage,
}

impl StageTracker {
    fn starting_at(stage: MigrationStage) -> Self {
        Self { stage }
    }

    fn advance(&mut self) -> Result<MigrationStage, MigrationError> {
        self.stage = self.stage.advance()?;
        tracing::debug!(stage = %self.stage, "Entered stage");
        Ok(self.stage)
    }
}

/// Drives the add-pool migration across the two registries.
///
/// Every step awaits confirmation of its own mutation before the next one starts. Nothing is
/// retried and nothing is rolled back: a failure past provisioning yields a [`RecoveryMarker`].
pub struct MigrationWorkflow<'a, C, L> {
    current: &'a C,
    legacy: &'a L,
    config: WorkflowConfig,
    settlement: SettlementWaiter,
}

impl<'a, C, L> MigrationWorkflow<'a, C, L>
where
    C: CurrentRegistry,
    L: LegacyRegistry,
{
    pub fn new(current: &'a C, legacy: &'a L, config: WorkflowConfig) -> Self {
        Self {
            current,
            legacy,
            config,
            settlement: SettlementWaiter::new(config.settlement),
        }
    }

    pub async fn run(&self, raw: &RawMigrationInput) -> Result<MigrationOutcome, MigrationFailure> {
        let mut tracker = StageTracker::starting_at(MigrationStage::Idle);
        let validated = tracker
            .advance()
            .and_then(|_| validation::validate_request(raw).map_err(MigrationError::from));
        let mut request = match validated {
            Ok(request) => request,
            Err(error) => {
                tracing::error!(stage = %tracker.stage, "Input rejected: {error}");
                return Err(self.failure(&tracker, None, error));
            }
        };

        tracing::info!(
            staked_asset = %request.staked_asset,
            allocation = %request.requested_allocation_points,
            mass_update = request.should_mass_update,
            master_slot = %self.config.master_slot,
            "Starting pool migration"
        );
        let result = self.drive_from_provisioning(&mut tracker, &mut request).await;
        self.conclude(tracker, request, result)
    }

    /// Continues a migration from a marker left by a failed run.
    pub async fn resume(&self, marker: &RecoveryMarker) -> Result<MigrationOutcome, MigrationFailure> {
        let mut request = marker.request.clone();
        let mut tracker = match marker.resume_from {
            ResumePoint::Rebalance => StageTracker::starting_at(MigrationStage::Provisioning),
            ResumePoint::Finalize => StageTracker::starting_at(MigrationStage::Rebalancing),
        };

        if marker.master_slot != self.config.master_slot {
            // Nothing was touched, the marker stays valid for the right deployment.
            return Err(MigrationFailure {
                stage: tracker.stage.fail().unwrap_or(tracker.stage),
                error: MigrationError::MasterSlotMismatch {
                    recorded: marker.master_slot,
                    configured: self.config.master_slot,
                },
                request: Some(request),
                recovery: None,
            });
        }

        tracing::info!(
            staked_asset = %request.staked_asset,
            resume_from = ?marker.resume_from,
            failed_stage = ?marker.failed_stage,
            "Resuming pool migration"
        );
        let result = match marker.resume_from {
            ResumePoint::Rebalance => self.drive_from_settlement(&mut tracker, &mut request, None, true).await,
            ResumePoint::Finalize => self.drive_from_finalizing(&mut tracker, &mut request, None, None).await,
        };
        self.conclude(tracker, request, result)
    }

    /// Validates and reads both registries without mutating anything.
    pub async fn plan(&self, raw: &RawMigrationInput) -> Result<MigrationPlan, MigrationError> {
        let request = validation::validate_request(raw)?;
        let pool_count = self.current.pool_count().await?;
        let legacy_allocation_before = self.legacy.allocation_at(self.config.master_slot).await?;
        let legacy_allocation_after =
            rebalanced_master_allocation(legacy_allocation_before, request.requested_allocation_points)?;
        Ok(MigrationPlan {
            staked_asset: request.staked_asset,
            expected_pool_index: PoolIndex(pool_count),
            requested_allocation_points: request.requested_allocation_points,
            legacy_allocation_before,
            legacy_allocation_after,
        })
    }

    async fn drive_from_provisioning(
        &self,
        tracker: &mut StageTracker,
        request: &mut MigrationRequest,
    ) -> Result<MigrationOutcome, MigrationError> {
        tracker.advance()?;
        let provisioned = self
            .provision(request)
            .instrument(tracing::info_span!("provision"))
            .await?;
        self.drive_from_settlement(tracker, request, Some(provisioned), false)
            .await
    }

    async fn drive_from_settlement(
        &self,
        tracker: &mut StageTracker,
        request: &mut MigrationRequest,
        provisioned: Option<Confirmation>,
        resuming: bool,
    ) -> Result<MigrationOutcome, MigrationError> {
        tracker.advance()?;
        self.settle(request).instrument(tracing::info_span!("settle")).await?;
        if resuming {
            // The creation may never have landed, whatever the settlement strategy assumed
            self.confirm_pool(request)
                .instrument(tracing::info_span!("confirm_pool"))
                .await?;
        }

        tracker.advance()?;
        let rebalanced = self
            .rebalance(request, resuming)
            .instrument(tracing::info_span!("rebalance"))
            .await?;
        self.drive_from_finalizing(tracker, request, provisioned, rebalanced)
            .await
    }

    async fn drive_from_finalizing(
        &self,
        tracker: &mut StageTracker,
        request: &mut MigrationRequest,
        provisioned: Option<Confirmation>,
        rebalanced: Option<Confirmation>,
    ) -> Result<MigrationOutcome, MigrationError> {
        tracker.advance()?;
        let finalized = self
            .finalize(request)
            .instrument(tracing::info_span!("finalize"))
            .await?;

        tracker.advance()?;
        Ok(MigrationOutcome {
            request: request.clone(),
            provisioned,
            rebalanced,
            finalized,
        })
    }

    async fn provision(&self, request: &mut MigrationRequest) -> Result<Confirmation, MigrationError> {
        let pool_count = self.current.pool_count().await?;
        request.expected_pool_index = Some(PoolIndex(pool_count));

        tracing::info!(expected_pool_index = pool_count, "Adding pool...");
        let confirmation = self
            .current
            .create_pool(
                request.staked_asset,
                &request.auxiliary_distributors,
                request.should_mass_update,
            )
            .await?;
        tracing::info!(tx_hash = %confirmation.tx_hash, "Pool added with placeholder allocation");
        Ok(confirmation)
    }

    async fn settle(&self, request: &MigrationRequest) -> Result<(), MigrationError> {
        let expected_index = request
            .expected_pool_index
            .ok_or(MigrationError::IncompleteRequest("expected_pool_index"))?;
        let bound = Duration::from_secs(request.settlement_delay_seconds);
        self.settlement
            .wait_for_pool(self.current, expected_index, bound)
            .await?;
        Ok(())
    }

    async fn confirm_pool(&self, request: &MigrationRequest) -> Result<(), MigrationError> {
        let expected_index = request
            .expected_pool_index
            .ok_or(MigrationError::IncompleteRequest("expected_pool_index"))?;
        let pool_count = self.current.pool_count().await?;
        if pool_count <= expected_index.0 {
            return Err(SettlementError::NotObserved {
                expected_index,
                last_pool_count: pool_count,
                waited: Duration::from_secs(request.settlement_delay_seconds),
            }
            .into());
        }
        let entry = self.current.pool_at(expected_index).await?;
        if entry.staked_asset != request.staked_asset {
            return Err(MigrationError::PoolIndexConflict {
                expected: Some(expected_index),
                inferred: PoolIndex::last_of(pool_count),
                pool_count,
                observed_asset: Some(entry.staked_asset),
                requested_asset: request.staked_asset,
            });
        }
        tracing::info!(pool_index = %expected_index, "Resumed pool confirmed in current registry");
        Ok(())
    }

    async fn rebalance(
        &self,
        request: &mut MigrationRequest,
        resuming: bool,
    ) -> Result<Option<Confirmation>, MigrationError> {
        let slot = self.config.master_slot;
        let requested = request.requested_allocation_points;
        let current_allocation = self.legacy.allocation_at(slot).await?;

        if resuming {
            if let Some(recorded_before) = request.legacy_allocation_before {
                let expected_after = rebalanced_master_allocation(recorded_before, requested)?;
                if current_allocation == expected_after {
                    tracing::info!(
                        slot = %slot,
                        allocation = %current_allocation,
                        "Legacy allocation already rebalanced, skipping write"
                    );
                    request.recomputed_legacy_allocation = Some(current_allocation);
                    return Ok(None);
                }
                if current_allocation != recorded_before {
                    return Err(MigrationError::LegacyAllocationDrift {
                        slot,
                        recorded_before,
                        expected_after,
                        observed: current_allocation,
                    });
                }
            }
        }

        request.legacy_allocation_before = Some(current_allocation);
        let new_allocation = rebalanced_master_allocation(current_allocation, requested)?;
        tracing::info!(
            slot = %slot,
            before = %current_allocation,
            after = %new_allocation,
            "Adjusting legacy allocation..."
        );
        let confirmation = self.legacy.set_allocation(slot, new_allocation).await?;
        request.recomputed_legacy_allocation = Some(new_allocation);
        Ok(Some(confirmation))
    }

    async fn finalize(&self, request: &mut MigrationRequest) -> Result<Confirmation, MigrationError> {
        let pool_count = self.current.pool_count().await?;
        let inferred = PoolIndex::last_of(pool_count);
        let conflict = |observed_asset| MigrationError::PoolIndexConflict {
            expected: request.expected_pool_index,
            inferred,
            pool_count,
            observed_asset,
            requested_asset: request.staked_asset,
        };

        let index = match (inferred, request.expected_pool_index) {
            (Some(inferred), Some(expected)) if inferred == expected => inferred,
            _ => return Err(conflict(None)),
        };
        let entry = self.current.pool_at(index).await?;
        if entry.staked_asset != request.staked_asset {
            return Err(conflict(Some(entry.staked_asset)));
        }
        request.assigned_pool_index = Some(index);

        tracing::info!(
            pool_index = %index,
            allocation = %request.requested_allocation_points,
            "Setting new pool allocation..."
        );
        let confirmation = self
            .current
            .set_pool(
                index,
                request.requested_allocation_points,
                &request.auxiliary_distributors,
                OVERWRITE_DISTRIBUTORS,
                request.should_mass_update,
            )
            .await?;
        Ok(confirmation)
    }

    fn conclude(
        &self,
        tracker: StageTracker,
        request: MigrationRequest,
        result: Result<MigrationOutcome, MigrationError>,
    ) -> Result<MigrationOutcome, MigrationFailure> {
        match result {
            Ok(outcome) => {
                tracing::info!(
                    pool_index = ?outcome.request.assigned_pool_index,
                    legacy_allocation = ?outcome.request.recomputed_legacy_allocation,
                    "Pool migration complete"
                );
                Ok(outcome)
            }
            Err(error) => {
                let failure = self.failure(&tracker, Some(request), error);
                tracing::error!(
                    stage = %failure.stage,
                    request = ?failure.request,
                    recovery = ?failure.recovery.as_ref().map(|marker| marker.resume_from),
                    "Pool migration failed: {}",
                    failure.error
                );
                Err(failure)
            }
        }
    }

    fn failure(
        &self,
        tracker: &StageTracker,
        request: Option<MigrationRequest>,
        error: MigrationError,
    ) -> MigrationFailure {
        let resume_from = match tracker.stage {
            // A timed out creation may still land, so it is treated like a created pool.
            MigrationStage::Provisioning => match &error {
                MigrationError::Registry(registry_error) if registry_error.outcome_unknown() => {
                    Some(ResumePoint::Rebalance)
                }
                _ => None,
            },
            MigrationStage::AwaitingSettlement | MigrationStage::Rebalancing => Some(ResumePoint::Rebalance),
            MigrationStage::Finalizing => Some(ResumePoint::Finalize),
            _ => None,
        };
        let (stage, failed_stage) = match tracker.stage.fail() {
            Ok(stage @ MigrationStage::Failed { at }) => (stage, Some(at)),
            _ => (tracker.stage, None),
        };

        let recovery = match (resume_from, failed_stage, &request) {
            (Some(resume_from), Some(failed_stage), Some(request)) if request.expected_pool_index.is_some() => {
                Some(RecoveryMarker::new(
                    resume_from,
                    failed_stage,
                    self.config.master_slot,
                    request.clone(),
                    error.to_string(),
                ))
            }
            _ => None,
        };

        MigrationFailure {
            stage,
            error,
            request,
            recovery,
        }
    }
}
