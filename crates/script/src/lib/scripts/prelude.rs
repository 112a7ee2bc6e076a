use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::transports::http::reqwest::Url;
use axo_farms_migration_shared::pool::PoolIndex;
use prometheus::Registry;
use thiserror::Error;

use crate::consts::{NetworkInfo, RegistryDeployment, WrappedNetwork};
use crate::env::EnvError;
use crate::eth_client::{
    CurrentRegistryClient, CurrentRegistryContract, DefaultProvider, EthELClient, ExecutionLayerClient,
    LegacyRegistryClient, LegacyRegistryContract, ProviderError, ProviderFactory, RPCError, TxSettings,
};
use crate::prometheus_metrics::{self, Metrics, Registar};
use crate::settlement::SettlementStrategy;
use crate::workflow::{MigrationWorkflow, WorkflowConfig};

const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 1;
const DEFAULT_RECOVERY_DIR: &str = "recovery";
const DEFAULT_PROMETHEUS_NAMESPACE: &str = "axo_farms_migration";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Failed to parse URL {0}")]
    FailedToParseUrl(String),

    #[error("Failed to create provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Setting {name} is not configured and network {network} has no known deployment")]
    MissingDeployment { name: &'static str, network: String },

    #[error("Network {network} expects chain id {expected}, but the RPC reports {actual}")]
    ChainIdMismatch { network: String, expected: u64, actual: u64 },

    #[error("Failed to read chain id: {0:?}")]
    Rpc(#[from] RPCError),

    #[error("Failed to register metrics: {0:?}")]
    Metrics(anyhow::Error),
}

pub mod env_vars {
    use std::path::PathBuf;

    use alloy::primitives::Address;

    use crate::consts::WrappedNetwork;
    use crate::env::{self, EnvError, EnvVarValue};
    use crate::settlement::SettlementStrategy;

    use super::{
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_PROMETHEUS_NAMESPACE, DEFAULT_RECOVERY_DIR,
        DEFAULT_REQUIRED_CONFIRMATIONS,
    };

    #[derive(Debug, Clone)]
    pub struct EnvVars {
        pub evm_chain: EnvVarValue<WrappedNetwork>,
        pub legacy_registry_address: EnvVarValue<Option<Address>>,
        pub current_registry_address: EnvVarValue<Option<Address>>,
        pub master_slot: EnvVarValue<Option<u64>>,

        pub confirmation_timeout_secs: EnvVarValue<u64>,
        pub required_confirmations: EnvVarValue<u64>,
        pub settlement_strategy: EnvVarValue<SettlementStrategy>,
        pub settlement_poll_interval_ms: EnvVarValue<Option<u64>>,

        pub recovery_dir: EnvVarValue<PathBuf>,
        pub metrics_textfile: EnvVarValue<Option<PathBuf>>,
        pub prometheus_namespace: EnvVarValue<String>,
        pub dry_run: EnvVarValue<Option<bool>>,
        // sensitive
        pub execution_layer_rpc: EnvVarValue<String>,
        pub private_key: EnvVarValue<String>,
    }

    impl EnvVars {
        pub fn init_from_env() -> Result<Self, EnvError> {
            Ok(Self {
                evm_chain: env::EVM_CHAIN.required()?,
                legacy_registry_address: env::LEGACY_REGISTRY_ADDRESS.optional()?,
                current_registry_address: env::CURRENT_REGISTRY_ADDRESS.optional()?,
                master_slot: env::MASTER_SLOT.optional()?,
                confirmation_timeout_secs: env::CONFIRMATION_TIMEOUT_SECS.default(DEFAULT_CONFIRMATION_TIMEOUT_SECS)?,
                required_confirmations: env::REQUIRED_CONFIRMATIONS.default(DEFAULT_REQUIRED_CONFIRMATIONS)?,
                settlement_strategy: env::SETTLEMENT_STRATEGY.default(SettlementStrategy::default())?,
                settlement_poll_interval_ms: env::SETTLEMENT_POLL_INTERVAL_MS.optional()?,
                recovery_dir: env::RECOVERY_DIR.default(PathBuf::from(DEFAULT_RECOVERY_DIR))?,
                metrics_textfile: env::METRICS_TEXTFILE.optional()?,
                prometheus_namespace: env::PROMETHEUS_NAMESPACE.default(DEFAULT_PROMETHEUS_NAMESPACE.to_owned())?,
                dry_run: env::DRY_RUN.optional()?,
                execution_layer_rpc: env::EXECUTION_LAYER_RPC.required()?,
                private_key: env::PRIVATE_KEY.required()?,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub deployment: RegistryDeployment,
    pub tx_settings: TxSettings,
    pub settlement: SettlementStrategy,
    pub recovery_dir: PathBuf,
    pub metrics_textfile: Option<PathBuf>,
    pub dry_run: bool,
}

impl MigrationSettings {
    /// Env overrides win over the network preset.
    pub fn resolve(network: &WrappedNetwork, env_vars: &env_vars::EnvVars) -> Result<Self, Error> {
        let preset = network.get_config().deployment;
        let missing = |name: &'static str| Error::MissingDeployment {
            name,
            network: network.as_str(),
        };

        let legacy_registry = env_vars
            .legacy_registry_address
            .value
            .or(preset.map(|d| d.legacy_registry))
            .ok_or_else(|| missing(crate::env::LEGACY_REGISTRY_ADDRESS.key))?;
        let current_registry = env_vars
            .current_registry_address
            .value
            .or(preset.map(|d| d.current_registry))
            .ok_or_else(|| missing(crate::env::CURRENT_REGISTRY_ADDRESS.key))?;
        let master_slot = env_vars
            .master_slot
            .value
            .map(PoolIndex)
            .or(preset.map(|d| d.master_slot))
            .ok_or_else(|| missing(crate::env::MASTER_SLOT.key))?;

        let settlement = match (env_vars.settlement_strategy.value, env_vars.settlement_poll_interval_ms.value) {
            (SettlementStrategy::Poll { .. }, Some(interval_ms)) => SettlementStrategy::Poll {
                interval: Duration::from_millis(interval_ms),
            },
            (strategy, _) => strategy,
        };

        Ok(Self {
            deployment: RegistryDeployment {
                legacy_registry,
                current_registry,
                master_slot,
            },
            tx_settings: TxSettings {
                confirmation_timeout: Duration::from_secs(env_vars.confirmation_timeout_secs.value),
                required_confirmations: env_vars.required_confirmations.value,
                preflight: true,
            },
            settlement,
            recovery_dir: env_vars.recovery_dir.value.clone(),
            metrics_textfile: env_vars.metrics_textfile.value.clone(),
            dry_run: env_vars.dry_run.value.unwrap_or(DEFAULT_DRY_RUN),
        })
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            master_slot: self.deployment.master_slot,
            settlement: self.settlement,
        }
    }
}

pub struct EthInfrastructure {
    pub network: WrappedNetwork,
    pub provider: Arc<DefaultProvider>,
    pub eth_client: EthELClient,
}

pub struct RegistryInfrastructure {
    pub legacy_registry: LegacyRegistryClient,
    pub current_registry: CurrentRegistryClient,
}

pub struct MetricsInfrastructure {
    pub prometheus_registry: Registry,
    pub metrics: Arc<Metrics>,
}

pub struct ScriptRuntime {
    pub eth_infra: EthInfrastructure,
    pub registry_infra: RegistryInfrastructure,
    pub metrics_infra: MetricsInfrastructure,
    pub settings: MigrationSettings,
    pub env_vars: Option<env_vars::EnvVars>,
}

impl ScriptRuntime {
    pub fn init(env_vars: env_vars::EnvVars) -> Result<Self, Error> {
        let network = env_vars.evm_chain.value;
        let settings = MigrationSettings::resolve(&network, &env_vars)?;
        let endpoint: Url = env_vars
            .execution_layer_rpc
            .value
            .parse()
            .map_err(|_e| Error::FailedToParseUrl(crate::env::EXECUTION_LAYER_RPC.key.to_owned()))?;

        let metrics = Arc::new(Metrics::new(&env_vars.prometheus_namespace.value));
        let prometheus_registry = Registry::new();
        metrics.register_on(&prometheus_registry).map_err(Error::Metrics)?;
        metrics
            .metadata
            .network_chain
            .with_label_values(&[network.as_str().as_str()])
            .set(network.get_config().chain_id as f64);

        let provider = Arc::new(ProviderFactory::create_provider_decode_key(
            &env_vars.private_key.value,
            endpoint,
        )?);
        let legacy_registry = LegacyRegistryContract::new(
            Arc::clone(&provider),
            settings.deployment.legacy_registry,
            settings.tx_settings,
            Arc::clone(&metrics.services.legacy_registry),
        );
        let current_registry = CurrentRegistryContract::new(
            Arc::clone(&provider),
            settings.deployment.current_registry,
            settings.tx_settings,
            Arc::clone(&metrics.services.current_registry),
        );
        let eth_client = ExecutionLayerClient::new(Arc::clone(&provider));

        tracing::info!(
            network = %network.as_str(),
            legacy_registry = %settings.deployment.legacy_registry,
            current_registry = %settings.deployment.current_registry,
            master_slot = %settings.deployment.master_slot,
            dry_run = settings.dry_run,
            "Initialized script runtime"
        );

        Ok(Self {
            eth_infra: EthInfrastructure {
                network,
                provider,
                eth_client,
            },
            registry_infra: RegistryInfrastructure {
                legacy_registry,
                current_registry,
            },
            metrics_infra: MetricsInfrastructure {
                prometheus_registry,
                metrics,
            },
            settings,
            env_vars: Some(env_vars),
        })
    }

    pub fn init_from_env() -> Result<Self, Error> {
        let env_vars = env_vars::EnvVars::init_from_env()?;
        tracing::debug!("Env vars: {:?}", env_vars);
        Self::init(env_vars)
    }

    pub fn network(&self) -> &impl NetworkInfo {
        &self.eth_infra.network
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics_infra.metrics
    }

    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    pub fn legacy_registry_address(&self) -> Address {
        self.settings.deployment.legacy_registry
    }

    pub fn current_registry_address(&self) -> Address {
        self.settings.deployment.current_registry
    }

    pub fn workflow(&self) -> MigrationWorkflow<'_, CurrentRegistryClient, LegacyRegistryClient> {
        MigrationWorkflow::new(
            &self.registry_infra.current_registry,
            &self.registry_infra.legacy_registry,
            self.settings.workflow_config(),
        )
    }

    /// Refuses to touch a chain other than the one the network preset names.
    pub async fn verify_chain_id(&self) -> Result<(), Error> {
        let expected = self.network().get_config().chain_id;
        let actual = self.eth_infra.eth_client.get_chain_id().await?;
        if actual != expected {
            tracing::error!(expected, actual, "Chain id mismatch");
            return Err(Error::ChainIdMismatch {
                network: self.network().as_str(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn flush_metrics(&self) {
        if let Some(path) = &self.settings.metrics_textfile {
            match prometheus_metrics::write_textfile(&self.metrics_infra.prometheus_registry, path) {
                Ok(()) => tracing::debug!(path = ?path, "Wrote metrics textfile"),
                Err(e) => tracing::warn!(path = ?path, "Failed to write metrics textfile: {e:?}"),
            }
        }
    }
}
