pub mod add_pool;
pub mod prelude;
pub mod resume;

use std::time::Instant;

use axo_farms_migration_shared::migration::MigrationStage;

use crate::prometheus_metrics::{outcome, Metrics};
use crate::workflow::MigrationFailure;

/// Records how a script run ended.
pub(crate) struct RunReport<'a> {
    metrics: &'a Metrics,
    started: Instant,
}

impl<'a> RunReport<'a> {
    pub(crate) fn start(metrics: &'a Metrics, operation: &str) -> Self {
        metrics.metadata.run_counter.with_label_values(&[operation]).inc();
        Self {
            metrics,
            started: Instant::now(),
        }
    }

    fn finish(self, outcome: f64, stage: &MigrationStage) {
        let execution = &self.metrics.execution;
        execution
            .execution_time_seconds
            .set(self.started.elapsed().as_secs_f64());
        execution.outcome.set(outcome);
        execution.last_stage.with_label_values(&[stage.to_string().as_str()]).set(1.0);
    }

    pub(crate) fn succeeded(self) {
        self.finish(outcome::SUCCESS, &MigrationStage::Complete);
    }

    pub(crate) fn planned(self) {
        self.finish(outcome::DRY_RUN, &MigrationStage::Idle);
    }

    pub(crate) fn failed(self, failure: &MigrationFailure) {
        self.finish(outcome::FAILURE, &failure.stage);
    }
}
