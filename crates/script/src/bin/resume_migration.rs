use std::path::PathBuf;

use axo_farms_migration_scripts::env;
use axo_farms_migration_scripts::scripts;
use axo_farms_migration_scripts::tracing as tracing_config;
use clap::Parser;

// cargo run --bin resume_migration --release -- --marker recovery/pending-migration-<asset>-finalize-<timestamp>.json

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct ResumeArgs {
    /// Recovery marker written by a failed add_pool run
    #[clap(long)]
    marker: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .with_thread_names(true)
            .use_format(env::LOG_FORMAT.default(tracing_config::LogFormat::Plain)?.value),
    );

    let args = ResumeArgs::parse();
    tracing::debug!("Args: {:?}", args);

    let script_runtime = scripts::prelude::ScriptRuntime::init_from_env()
        .inspect_err(|e| tracing::error!("Failed to initialize script runtime: {e}"))?;

    if let Some(outcome) = scripts::resume::run(&script_runtime, &args.marker).await? {
        tracing::info!(
            pool_index = ?outcome.request.assigned_pool_index,
            finalized_tx = %outcome.finalized.tx_hash,
            "Migration resumed and completed"
        );
    }
    Ok(())
}
