//! Markers for migrations that stopped after mutating on-chain state.
//!
//! A marker is written whenever a run fails past the point where the current registry may
//! already hold the new pool. It records enough of the request to resume the remaining steps
//! (see [`crate::workflow::MigrationWorkflow::resume`]) or to reconcile by hand.

use std::path::{Path, PathBuf};

use axo_farms_migration_shared::migration::{FailedStage, MigrationRequest, ResumePoint};
use axo_farms_migration_shared::pool::PoolIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

const MARKER_PREFIX: &str = "pending-migration";
const COMPLETED_SUFFIX: &str = "completed";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to access recovery marker {path:?}: {source}")]
    Storage { path: PathBuf, source: utils::Error },

    #[error("Failed to archive recovery marker {path:?}: {source}")]
    Archive { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMarker {
    pub resume_from: ResumePoint,
    pub failed_stage: FailedStage,
    pub master_slot: PoolIndex,
    pub request: MigrationRequest,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl RecoveryMarker {
    pub fn new(
        resume_from: ResumePoint,
        failed_stage: FailedStage,
        master_slot: PoolIndex,
        request: MigrationRequest,
        error: String,
    ) -> Self {
        Self {
            resume_from,
            failed_stage,
            master_slot,
            request,
            error,
            created_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> String {
        let resume_from = match self.resume_from {
            ResumePoint::Rebalance => "rebalance",
            ResumePoint::Finalize => "finalize",
        };
        format!(
            "{MARKER_PREFIX}-{}-{resume_from}-{}.json",
            self.request.staked_asset,
            self.created_at.format("%Y%m%dT%H%M%S%.3fZ")
        )
    }

    pub fn store(&self, dir: &Path) -> Result<PathBuf, Error> {
        let path = dir.join(self.file_name());
        utils::write_json(&path, self).map_err(|source| Error::Storage {
            path: path.clone(),
            source,
        })?;
        tracing::warn!(
            path = ?path,
            resume_from = ?self.resume_from,
            "Stored recovery marker, run resume_migration with it to continue"
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        utils::read_json(path).map_err(|source| Error::Storage {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Renames a consumed marker so it cannot be resumed twice.
    pub fn archive(path: &Path) -> Result<PathBuf, Error> {
        let mut archived = path.as_os_str().to_owned();
        archived.push(format!(".{COMPLETED_SUFFIX}"));
        let archived = PathBuf::from(archived);
        std::fs::rename(path, &archived).map_err(|source| Error::Archive {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(archived)
    }
}
