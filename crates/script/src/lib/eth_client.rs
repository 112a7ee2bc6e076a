use alloy::contract::SolCallBuilder;
use alloy::network::Ethereum;
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::fillers::RecommendedFillers;
use alloy::providers::{PendingTransactionError, Provider, ProviderBuilder, WatchTxError};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use alloy_primitives::U256;
use axo_farms_migration_shared::pool::{AllocationPoints, ConversionError, PoolEntry, PoolIndex};
use tracing::Instrument;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use LegacyMasterChef::LegacyMasterChefInstance;
use MasterChefV2::MasterChefV2Instance;

use crate::prometheus_metrics::{self, operations};
use crate::registry::{Confirmation, CurrentRegistry, LegacyRegistry, RegistryError, RegistryKind};

sol! {
    #[sol(rpc)]
    interface LegacyMasterChef {
        #[derive(Debug)]
        function poolInfo(uint256 pid) external view returns (
            address lpToken,
            uint256 allocPoint,
            uint256 lastRewardBlock,
            uint256 accAxoPerShare
        );
        function set(uint256 pid, uint256 allocPoint) external;
    }
}

// The public `poolInfo` getter skips the dynamic rewarder array of the pool struct.
sol! {
    #[sol(rpc)]
    interface MasterChefV2 {
        #[derive(Debug)]
        function poolInfo(uint256 pid) external view returns (
            address lpToken,
            uint256 accAxoPerShare,
            uint256 lastRewardTime,
            uint256 allocPoint
        );
        function poolInfoAmount() external view returns (uint256);
        function add(uint256 allocPoint, address lpToken, address[] rewarders, bool update) external;
        function set(uint256 pid, uint256 allocPoint, address[] rewarders, bool overwrite, bool update) external;
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Custom rejection: {0:#?}")]
    CustomRejection(String),

    #[error("Other alloy error {0:#?}")]
    OtherAlloyError(alloy::contract::Error),

    #[error("{0:#?}")]
    ConversionError(#[from] ConversionError),
}

impl From<alloy::contract::Error> for ContractError {
    fn from(error: alloy::contract::Error) -> Self {
        if let alloy::contract::Error::TransportError(alloy::transports::RpcError::ErrorResp(ref error_payload)) = error
        {
            if error_payload.message.contains("execution reverted") {
                ContractError::CustomRejection(error_payload.message.to_string())
            } else {
                ContractError::OtherAlloyError(error)
            }
        } else {
            ContractError::OtherAlloyError(error)
        }
    }
}

impl ContractError {
    fn into_read_failure(self, registry: RegistryKind, operation: &'static str) -> RegistryError {
        RegistryError::ReadFailure {
            registry,
            operation,
            reason: self.to_string(),
        }
    }

    fn into_submission_error(self, registry: RegistryKind, operation: &'static str) -> RegistryError {
        match self {
            ContractError::CustomRejection(reason) => RegistryError::TransactionReverted {
                registry,
                operation,
                tx_hash: None,
                reason,
            },
            other => RegistryError::SubmissionFailed {
                registry,
                operation,
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RPCError {
    #[error(transparent)]
    Error(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
}

/// How mutations are submitted and when they count as confirmed.
#[derive(Debug, Clone, Copy)]
pub struct TxSettings {
    pub confirmation_timeout: Duration,
    pub required_confirmations: u64,
    /// Simulate the call before sending so reverts surface with a reason and without gas spent.
    pub preflight: bool,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(120),
            required_confirmations: 1,
            preflight: true,
        }
    }
}

async fn submit_and_confirm<P, C>(
    registry: RegistryKind,
    operation: &'static str,
    tx_builder: SolCallBuilder<&P, C>,
    settings: &TxSettings,
) -> Result<Confirmation, RegistryError>
where
    P: Provider<Ethereum>,
    C: SolCall,
{
    if settings.preflight {
        if let Err(err) = tx_builder.call().await {
            tracing::error!(%registry, operation, "Preflight call reverted: {err:?}");
            return Err(ContractError::from(err).into_submission_error(registry, operation));
        }
    }

    tracing::info!(%registry, operation, "Submitting transaction");
    let pending = tx_builder
        .send()
        .instrument(tracing::info_span!("send_tx"))
        .await
        .inspect(|val| tracing::debug!("Submitted transaction {}", val.tx_hash()))
        .inspect_err(|err| tracing::error!("Failed to submit transaction {err:?}"))
        .map_err(|err| ContractError::from(err).into_submission_error(registry, operation))?;
    let tx_hash = *pending.tx_hash();

    tracing::info!(%registry, operation, %tx_hash, "Waiting for transaction");
    let receipt = pending
        .with_required_confirmations(settings.required_confirmations)
        .with_timeout(Some(settings.confirmation_timeout))
        .get_receipt()
        .instrument(tracing::info_span!("get_receipt"))
        .await
        .inspect(|val| {
            if val.status() {
                tracing::info!("Transaction completed {:#?}", val.transaction_hash)
            } else {
                tracing::error!("Transaction reverted {:#?}", val.transaction_hash)
            }
        })
        .inspect_err(|err| tracing::error!("Transaction failed {err:?}"))
        .map_err(|err| match err {
            PendingTransactionError::TxWatcher(WatchTxError::Timeout) => RegistryError::TransactionTimeout {
                registry,
                operation,
                tx_hash,
                timeout: settings.confirmation_timeout,
            },
            other => RegistryError::ReadFailure {
                registry,
                operation,
                reason: format!("Failed to read receipt for {tx_hash}: {other:?}"),
            },
        })?;

    if !receipt.status() {
        tracing::debug!("Receipt status=0, decoding revert for tx {}", receipt.transaction_hash);
        let reason = match tx_builder.call().await {
            Ok(_) => "Transaction reverted without reason".to_owned(),
            Err(e) => ContractError::from(e).to_string(),
        };
        return Err(RegistryError::TransactionReverted {
            registry,
            operation,
            tx_hash: Some(receipt.transaction_hash),
            reason,
        });
    }

    Ok(Confirmation {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
    })
}

pub struct LegacyRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    contract: LegacyMasterChefInstance<Arc<P>>,
    tx_settings: TxSettings,
    metric_reporter: Arc<prometheus_metrics::Service>,
}

impl<P> LegacyRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        tx_settings: TxSettings,
        metric_reporter: Arc<prometheus_metrics::Service>,
    ) -> Self {
        let contract = LegacyMasterChefInstance::new(contract_address, Arc::clone(&provider));
        Self {
            contract,
            tx_settings,
            metric_reporter,
        }
    }

    pub fn address(&self) -> &Address {
        self.contract.address()
    }

    async fn allocation_at_impl(&self, slot: PoolIndex) -> Result<AllocationPoints, RegistryError> {
        let read = async {
            let info = self.contract.poolInfo(slot.into()).call().await?;
            Ok::<_, ContractError>(AllocationPoints::try_from(info.allocPoint)?)
        };
        read.await
            .inspect(|val| tracing::debug!(slot = %slot, "Obtained legacy allocation {val}"))
            .map_err(|err| err.into_read_failure(RegistryKind::Legacy, operations::legacy::ALLOCATION_AT))
    }

    async fn set_allocation_impl(
        &self,
        slot: PoolIndex,
        allocation_points: AllocationPoints,
    ) -> Result<Confirmation, RegistryError> {
        let tx_builder = self.contract.set(slot.into(), allocation_points.into());
        submit_and_confirm(
            RegistryKind::Legacy,
            operations::legacy::SET_ALLOCATION,
            tx_builder,
            &self.tx_settings,
        )
        .await
    }
}

impl<P> LegacyRegistry for LegacyRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    async fn allocation_at(&self, slot: PoolIndex) -> Result<AllocationPoints, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::legacy::ALLOCATION_AT, || {
                self.allocation_at_impl(slot)
            })
            .await
    }

    async fn set_allocation(
        &self,
        slot: PoolIndex,
        allocation_points: AllocationPoints,
    ) -> Result<Confirmation, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::legacy::SET_ALLOCATION, || {
                self.set_allocation_impl(slot, allocation_points)
            })
            .await
    }
}

pub struct CurrentRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    contract: MasterChefV2Instance<Arc<P>>,
    tx_settings: TxSettings,
    metric_reporter: Arc<prometheus_metrics::Service>,
}

impl<P> CurrentRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(
        provider: Arc<P>,
        contract_address: Address,
        tx_settings: TxSettings,
        metric_reporter: Arc<prometheus_metrics::Service>,
    ) -> Self {
        let contract = MasterChefV2Instance::new(contract_address, Arc::clone(&provider));
        Self {
            contract,
            tx_settings,
            metric_reporter,
        }
    }

    pub fn address(&self) -> &Address {
        self.contract.address()
    }

    async fn pool_count_impl(&self) -> Result<u64, RegistryError> {
        let read = async {
            let amount: U256 = self.contract.poolInfoAmount().call().await?;
            Ok::<_, ContractError>(PoolIndex::try_from(amount)?.0)
        };
        read.await
            .inspect(|val| tracing::debug!("Obtained current pool count {val}"))
            .map_err(|err| err.into_read_failure(RegistryKind::Current, operations::current::POOL_COUNT))
    }

    async fn pool_at_impl(&self, index: PoolIndex) -> Result<PoolEntry, RegistryError> {
        let read = async {
            let info = self.contract.poolInfo(index.into()).call().await?;
            Ok::<_, ContractError>(PoolEntry {
                index,
                staked_asset: info.lpToken,
                allocation_points: AllocationPoints::try_from(info.allocPoint)?,
                auxiliary_distributors: vec![],
            })
        };
        read.await
            .map_err(|err| err.into_read_failure(RegistryKind::Current, operations::current::POOL_AT))
    }

    async fn create_pool_impl(
        &self,
        staked_asset: Address,
        auxiliary_distributors: &[Address],
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        let tx_builder = self.contract.add(
            AllocationPoints::ZERO.into(),
            staked_asset,
            auxiliary_distributors.to_vec(),
            should_mass_update,
        );
        submit_and_confirm(
            RegistryKind::Current,
            operations::current::CREATE_POOL,
            tx_builder,
            &self.tx_settings,
        )
        .await
    }

    async fn set_pool_impl(
        &self,
        index: PoolIndex,
        allocation_points: AllocationPoints,
        auxiliary_distributors: &[Address],
        overwrite: bool,
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        let tx_builder = self.contract.set(
            index.into(),
            allocation_points.into(),
            auxiliary_distributors.to_vec(),
            overwrite,
            should_mass_update,
        );
        submit_and_confirm(
            RegistryKind::Current,
            operations::current::SET_POOL,
            tx_builder,
            &self.tx_settings,
        )
        .await
    }
}

impl<P> CurrentRegistry for CurrentRegistryContract<P>
where
    P: Provider<Ethereum>,
{
    async fn pool_count(&self) -> Result<u64, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::current::POOL_COUNT, || self.pool_count_impl())
            .await
    }

    async fn pool_at(&self, index: PoolIndex) -> Result<PoolEntry, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::current::POOL_AT, || self.pool_at_impl(index))
            .await
    }

    async fn create_pool(
        &self,
        staked_asset: Address,
        auxiliary_distributors: &[Address],
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::current::CREATE_POOL, || {
                self.create_pool_impl(staked_asset, auxiliary_distributors, should_mass_update)
            })
            .await
    }

    async fn set_pool(
        &self,
        index: PoolIndex,
        allocation_points: AllocationPoints,
        auxiliary_distributors: &[Address],
        overwrite: bool,
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        self.metric_reporter
            .run_with_metrics_and_logs_async(operations::current::SET_POOL, || {
                self.set_pool_impl(
                    index,
                    allocation_points,
                    auxiliary_distributors,
                    overwrite,
                    should_mass_update,
                )
            })
            .await
    }
}

pub struct ExecutionLayerClient<P>
where
    P: Provider<Ethereum>,
{
    provider: Arc<P>,
}

impl<P> ExecutionLayerClient<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub async fn get_chain_id(&self) -> Result<u64, RPCError> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .inspect(|val| tracing::debug!("Connected to chain {val}"))?;
        Ok(chain_id)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to convert string to hex")]
    FromHexError,
    #[error("Failed to parse private key")]
    ParsePrivateKeyError,
    #[error("Failed to deserialize private key")]
    DeserializePrivateKeyError,
}

pub type DefaultProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            <Ethereum as RecommendedFillers>::RecommendedFillers,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy::providers::RootProvider,
>;

pub type LegacyRegistryClient = LegacyRegistryContract<DefaultProvider>;
pub type CurrentRegistryClient = CurrentRegistryContract<DefaultProvider>;
pub type EthELClient = ExecutionLayerClient<DefaultProvider>;

const PRIVATE_KEY_LEN: usize = 32;

pub struct ProviderFactory {}
impl ProviderFactory {
    fn decode_key(private_key_raw: &str) -> Result<k256::SecretKey, ProviderError> {
        let key_str = private_key_raw
            .split("0x")
            .last()
            .ok_or(ProviderError::ParsePrivateKeyError)?
            .trim();
        let key_hex = hex::decode(key_str).map_err(|_e| ProviderError::FromHexError)?;
        if key_hex.len() != PRIVATE_KEY_LEN {
            return Err(ProviderError::ParsePrivateKeyError);
        }
        let key = k256::SecretKey::from_slice(&key_hex).map_err(|_e| ProviderError::DeserializePrivateKeyError)?;
        Ok(key)
    }

    pub fn create_provider(key: k256::SecretKey, endpoint: Url) -> DefaultProvider {
        let signer: PrivateKeySigner = PrivateKeySigner::from(key);
        let wallet: EthereumWallet = EthereumWallet::from(signer);
        ProviderBuilder::new().wallet(wallet).connect_http(endpoint)
    }

    pub fn create_provider_decode_key(key_str: &str, endpoint: Url) -> Result<DefaultProvider, ProviderError> {
        let key = Self::decode_key(key_str)?;
        Ok(Self::create_provider(key, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;
    use hex_literal::hex;

    // First default anvil account, never holds real funds.
    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn decodes_private_key_with_and_without_prefix() {
        assert!(ProviderFactory::decode_key(ANVIL_KEY).is_ok());
        assert!(ProviderFactory::decode_key(&ANVIL_KEY[2..]).is_ok());
    }

    #[test]
    fn rejects_malformed_private_keys() {
        assert!(matches!(
            ProviderFactory::decode_key("0xnothex"),
            Err(ProviderError::FromHexError)
        ));
        assert!(matches!(
            ProviderFactory::decode_key("0xabcd"),
            Err(ProviderError::ParsePrivateKeyError)
        ));
    }

    #[test]
    fn add_call_places_zero_placeholder_first() {
        let lp_token = Address::from(hex!("4beaf010a2cf3469d26d6754d65fc5a19e8f3aa0"));
        let call = MasterChefV2::addCall {
            allocPoint: AllocationPoints::ZERO.into(),
            lpToken: lp_token,
            rewarders: vec![],
            update: false,
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], MasterChefV2::addCall::SELECTOR.as_slice());
        assert_eq!(&encoded[4..36], [0u8; 32].as_slice());
    }

    #[test]
    fn reverts_become_transaction_reverted() {
        let err = ContractError::CustomRejection("execution reverted: add: existing pool".to_owned())
            .into_submission_error(RegistryKind::Current, operations::current::CREATE_POOL);
        assert!(matches!(
            err,
            RegistryError::TransactionReverted {
                registry: RegistryKind::Current,
                tx_hash: None,
                ..
            }
        ));
    }
}
