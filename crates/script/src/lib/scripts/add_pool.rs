use anyhow::Context;
use axo_farms_migration_shared::migration::{MigrationPlan, RawMigrationInput};
use axo_farms_migration_shared::validation;
use tracing::Instrument;

use crate::consts::NetworkInfo;
use crate::scripts::prelude::ScriptRuntime;
use crate::scripts::RunReport;
use crate::workflow::{MigrationFailure, MigrationOutcome};

pub const OPERATION: &str = "add_pool";

#[derive(Debug, Default)]
pub struct Flags {
    pub dry_run: bool,
}

#[derive(Debug)]
pub enum AddPoolResult {
    Planned(MigrationPlan),
    Migrated(MigrationOutcome),
}

fn persist_recovery(runtime: &ScriptRuntime, failure: &MigrationFailure) {
    if let Some(marker) = &failure.recovery {
        if let Err(e) = marker.store(&runtime.settings.recovery_dir) {
            // Last resort so the operator can still reconcile by hand
            tracing::error!(marker = ?marker, "Failed to persist recovery marker: {e:?}");
        }
    }
}

async fn run_with_span(
    runtime: &ScriptRuntime,
    input: &RawMigrationInput,
    flags: &Flags,
) -> anyhow::Result<AddPoolResult> {
    let report = RunReport::start(runtime.metrics(), OPERATION);

    runtime
        .verify_chain_id()
        .await
        .inspect_err(|e| tracing::error!("Refusing to run: {e}"))?;

    if flags.dry_run || runtime.is_dry_run() {
        tracing::info!("Dry run mode enabled, reading registries without submitting transactions");
        let plan = runtime
            .workflow()
            .plan(input)
            .await
            .inspect_err(|e| tracing::error!("Failed to build migration plan: {e}"))
            .context("Failed to build migration plan")?;
        tracing::info!(
            staked_asset = %plan.staked_asset,
            expected_pool_index = %plan.expected_pool_index,
            allocation = %plan.requested_allocation_points,
            legacy_before = %plan.legacy_allocation_before,
            legacy_after = %plan.legacy_allocation_after,
            "Migration plan"
        );
        report.planned();
        return Ok(AddPoolResult::Planned(plan));
    }

    match runtime.workflow().run(input).await {
        Ok(outcome) => {
            report.succeeded();
            Ok(AddPoolResult::Migrated(outcome))
        }
        Err(failure) => {
            report.failed(&failure);
            persist_recovery(runtime, &failure);
            Err(failure.into())
        }
    }
}

pub async fn run(runtime: &ScriptRuntime, input: RawMigrationInput, flags: &Flags) -> anyhow::Result<AddPoolResult> {
    // Malformed input never reaches the network
    let request = validation::validate_request(&input)
        .inspect_err(|e| tracing::error!("Rejected migration input: {e}"))?;

    let add_pool_span = tracing::info_span!(
        "span:add_pool",
        network = %runtime.network().as_str(),
        staked_asset = %request.staked_asset,
        allocation = %request.requested_allocation_points,
    );

    let result = run_with_span(runtime, &input, flags).instrument(add_pool_span).await;
    runtime.flush_metrics();
    result
}
