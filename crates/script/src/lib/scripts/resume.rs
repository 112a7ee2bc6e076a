use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::Instrument;

use crate::consts::NetworkInfo;
use crate::recovery::RecoveryMarker;
use crate::scripts::prelude::ScriptRuntime;
use crate::scripts::RunReport;
use crate::workflow::MigrationOutcome;

pub const OPERATION: &str = "resume_migration";

/// Archives the marker of a completed migration. Failing to do so only warns, the migration itself is done.
fn consume_marker(marker_path: &Path) -> Option<PathBuf> {
    match RecoveryMarker::archive(marker_path) {
        Ok(archived) => {
            tracing::info!(archived = ?archived, "Recovery marker consumed");
            Some(archived)
        }
        Err(e) => {
            tracing::warn!("Migration completed but the recovery marker was not archived: {e}");
            None
        }
    }
}

async fn run_with_span(
    runtime: &ScriptRuntime,
    marker_path: &Path,
    marker: &RecoveryMarker,
) -> anyhow::Result<Option<MigrationOutcome>> {
    let report = RunReport::start(runtime.metrics(), OPERATION);

    runtime
        .verify_chain_id()
        .await
        .inspect_err(|e| tracing::error!("Refusing to resume: {e}"))?;

    if runtime.is_dry_run() {
        tracing::info!(
            resume_from = ?marker.resume_from,
            request = ?marker.request,
            "Dry run mode enabled, not resuming"
        );
        report.planned();
        return Ok(None);
    }

    match runtime.workflow().resume(marker).await {
        Ok(outcome) => {
            report.succeeded();
            consume_marker(marker_path);
            Ok(Some(outcome))
        }
        Err(failure) => {
            report.failed(&failure);
            if let Some(next_marker) = &failure.recovery {
                let stored = next_marker.store(&runtime.settings.recovery_dir)?;
                // The new marker supersedes the one just used
                RecoveryMarker::archive(marker_path)?;
                tracing::warn!(marker = ?stored, "Migration still incomplete");
            }
            Err(failure.into())
        }
    }
}

pub async fn run(runtime: &ScriptRuntime, marker_path: &Path) -> anyhow::Result<Option<MigrationOutcome>> {
    let marker = RecoveryMarker::load(marker_path)
        .inspect_err(|e| tracing::error!("Failed to load recovery marker: {e}"))
        .context("Failed to load recovery marker")?;

    let resume_span = tracing::info_span!(
        "span:resume",
        network = %runtime.network().as_str(),
        staked_asset = %marker.request.staked_asset,
        resume_from = ?marker.resume_from,
    );

    let result = run_with_span(runtime, marker_path, &marker)
        .instrument(resume_span)
        .await;
    runtime.flush_metrics();
    result
}
