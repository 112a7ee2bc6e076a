use axo_farms_migration_scripts::env;
use axo_farms_migration_scripts::scripts;
use axo_farms_migration_scripts::scripts::add_pool::AddPoolResult;
use axo_farms_migration_scripts::tracing as tracing_config;
use axo_farms_migration_shared::migration::RawMigrationInput;
use clap::Parser;

// cargo run --bin add_pool --release -- --alloc-point 250 --lp-token 0x4beAf010A2cF3469D26D6754D65Fc5a19e8F3AA0 --sleep 5

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct AddPoolArgs {
    /// Allocation points the new pool receives, also added to the master slot of the legacy registry
    #[clap(long)]
    alloc_point: String,
    /// Asset staked in the new pool
    #[clap(long)]
    lp_token: String,
    /// Auxiliary reward distributor, repeat for several
    #[clap(long = "rewarder", required = false)]
    rewarders: Vec<String>,
    #[clap(long, required = false, default_value = "false")]
    mass_update: bool,
    /// Upper bound in seconds for the new pool to become visible before rebalancing
    #[clap(long)]
    sleep: u64,
    #[clap(long, required = false, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // logging setup
    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .with_thread_names(true)
            .use_format(env::LOG_FORMAT.default(tracing_config::LogFormat::Plain)?.value),
    );

    let args = AddPoolArgs::parse();
    tracing::debug!("Args: {:?}", args);

    let input = RawMigrationInput {
        allocation_points: args.alloc_point,
        staked_asset: args.lp_token,
        auxiliary_distributors: args.rewarders,
        should_mass_update: args.mass_update,
        settlement_delay_seconds: args.sleep,
    };
    let flags = scripts::add_pool::Flags { dry_run: args.dry_run };

    let script_runtime = scripts::prelude::ScriptRuntime::init_from_env()
        .inspect_err(|e| tracing::error!("Failed to initialize script runtime: {e}"))?;

    match scripts::add_pool::run(&script_runtime, input, &flags).await? {
        AddPoolResult::Planned(plan) => {
            tracing::info!("Dry run complete, plan: {}", serde_json::to_string_pretty(&plan)?);
        }
        AddPoolResult::Migrated(outcome) => {
            tracing::info!(
                pool_index = ?outcome.request.assigned_pool_index,
                finalized_tx = %outcome.finalized.tx_hash,
                "Pool added"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LP_TOKEN: &str = "0x4beAf010A2cF3469D26D6754D65Fc5a19e8F3AA0";

    #[test]
    fn settlement_delay_is_required() {
        let result = AddPoolArgs::try_parse_from(["add_pool", "--alloc-point", "250", "--lp-token", LP_TOKEN]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_full_invocation() {
        let args = AddPoolArgs::try_parse_from([
            "add_pool",
            "--alloc-point",
            "250",
            "--lp-token",
            LP_TOKEN,
            "--sleep",
            "5",
            "--rewarder",
            LP_TOKEN,
        ])
        .expect("Args should parse");
        assert_eq!(args.sleep, 5);
        assert_eq!(args.rewarders, vec![LP_TOKEN.to_owned()]);
        assert!(!args.mass_update);
        assert!(!args.dry_run);
    }
}
