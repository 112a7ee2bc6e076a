#![allow(dead_code)]
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{address, Address, TxHash};
use axo_farms_migration_scripts::registry::{
    Confirmation, CurrentRegistry, LegacyRegistry, RegistryError, RegistryKind,
};
use axo_farms_migration_scripts::prometheus_metrics::operations;
use axo_farms_migration_scripts::settlement::SettlementStrategy;
use axo_farms_migration_scripts::workflow::WorkflowConfig;
use axo_farms_migration_shared::migration::RawMigrationInput;
use axo_farms_migration_shared::pool::{AllocationPoints, PoolEntry, PoolIndex};
use tokio::time::Instant;

pub const MASTER_SLOT: PoolIndex = PoolIndex(25);
pub const STAKED_ASSET: Address = address!("4beAf010A2cF3469D26D6754D65Fc5a19e8F3AA0");
pub const STAKED_ASSET_STR: &str = "0x4beAf010A2cF3469D26D6754D65Fc5a19e8F3AA0";
pub const OTHER_ASSET: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
pub const REWARDER_STR: &str = "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270";

pub fn config(settlement: SettlementStrategy) -> WorkflowConfig {
    WorkflowConfig {
        master_slot: MASTER_SLOT,
        settlement,
    }
}

pub fn raw_input(allocation_points: &str, staked_asset: &str, delay_seconds: u64) -> RawMigrationInput {
    RawMigrationInput {
        allocation_points: allocation_points.to_owned(),
        staked_asset: staked_asset.to_owned(),
        auxiliary_distributors: vec![],
        should_mass_update: false,
        settlement_delay_seconds: delay_seconds,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PoolCount,
    PoolAt(PoolIndex),
    CreatePool {
        staked_asset: Address,
        auxiliary_distributors: Vec<Address>,
        should_mass_update: bool,
    },
    SetPool {
        index: PoolIndex,
        allocation_points: AllocationPoints,
        auxiliary_distributors: Vec<Address>,
        overwrite: bool,
        should_mass_update: bool,
    },
    AllocationAt(PoolIndex),
    SetAllocation {
        slot: PoolIndex,
        allocation_points: AllocationPoints,
    },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreatePool { .. } | Self::SetPool { .. } | Self::SetAllocation { .. }
        )
    }
}

/// Calls made against both registries, in order.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Mined with status 0; the mutation is not applied.
    Revert,
    /// Receipt never observed; the mutation is applied anyway.
    Timeout,
    /// Never reached the node; the mutation is not applied.
    Submission,
    Read,
}

impl Failure {
    fn applies_mutation(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    fn into_error(self, registry: RegistryKind, operation: &'static str, tx_hash: TxHash) -> RegistryError {
        match self {
            Self::Revert => RegistryError::TransactionReverted {
                registry,
                operation,
                tx_hash: Some(tx_hash),
                reason: "execution reverted".to_owned(),
            },
            Self::Timeout => RegistryError::TransactionTimeout {
                registry,
                operation,
                tx_hash,
                timeout: Duration::from_secs(120),
            },
            Self::Submission => RegistryError::SubmissionFailed {
                registry,
                operation,
                reason: "connection refused".to_owned(),
            },
            Self::Read => RegistryError::ReadFailure {
                registry,
                operation,
                reason: "connection refused".to_owned(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct Failures(Mutex<HashMap<&'static str, Failure>>);

impl Failures {
    fn inject(&self, operation: &'static str, failure: Failure) {
        self.0.lock().unwrap().insert(operation, failure);
    }

    fn take(&self, operation: &'static str) -> Option<Failure> {
        self.0.lock().unwrap().remove(operation)
    }
}

fn next_tx_hash(counter: &Mutex<u64>) -> TxHash {
    let mut counter = counter.lock().unwrap();
    *counter += 1;
    TxHash::left_padding_from(&counter.to_be_bytes())
}

fn confirmation(tx_hash: TxHash) -> Confirmation {
    Confirmation {
        tx_hash,
        block_number: Some(1),
    }
}

struct StoredPool {
    entry: PoolEntry,
    visible_at: Instant,
}

/// In-memory `MasterChefV2`.
pub struct InMemoryCurrentRegistry {
    pools: Mutex<Vec<StoredPool>>,
    journal: Journal,
    failures: Failures,
    tx_counter: Mutex<u64>,
    visibility_lag: Mutex<Duration>,
    intruder: Mutex<Option<Address>>,
}

impl InMemoryCurrentRegistry {
    pub fn new(journal: Journal, existing_pools: u64) -> Self {
        let now = Instant::now();
        let pools = (0..existing_pools)
            .map(|i| StoredPool {
                entry: PoolEntry {
                    index: PoolIndex(i),
                    staked_asset: OTHER_ASSET,
                    allocation_points: AllocationPoints(100),
                    auxiliary_distributors: vec![],
                },
                visible_at: now,
            })
            .collect();
        Self {
            pools: Mutex::new(pools),
            journal,
            failures: Failures::default(),
            tx_counter: Mutex::new(0),
            visibility_lag: Mutex::new(Duration::ZERO),
            intruder: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, operation: &'static str, failure: Failure) {
        self.failures.inject(operation, failure);
    }

    /// New pools only show up in `pool_count` after `lag`.
    pub fn set_visibility_lag(&self, lag: Duration) {
        *self.visibility_lag.lock().unwrap() = lag;
    }

    /// Someone else adds a pool for `asset` right after ours is created.
    pub fn set_intruder(&self, asset: Address) {
        *self.intruder.lock().unwrap() = Some(asset);
    }

    pub fn entry(&self, index: PoolIndex) -> Option<PoolEntry> {
        let pools = self.pools.lock().unwrap();
        pools.get(index.0 as usize).map(|stored| stored.entry.clone())
    }

    pub fn len(&self) -> u64 {
        self.pools.lock().unwrap().len() as u64
    }

    fn append(&self, staked_asset: Address, auxiliary_distributors: Vec<Address>) {
        let visible_at = Instant::now() + *self.visibility_lag.lock().unwrap();
        let mut pools = self.pools.lock().unwrap();
        let index = PoolIndex(pools.len() as u64);
        pools.push(StoredPool {
            entry: PoolEntry {
                index,
                staked_asset,
                allocation_points: AllocationPoints::ZERO,
                auxiliary_distributors,
            },
            visible_at,
        });
    }

    fn read_failure(&self, operation: &'static str) -> Result<(), RegistryError> {
        match self.failures.take(operation) {
            Some(failure) => Err(failure.into_error(RegistryKind::Current, operation, TxHash::ZERO)),
            None => Ok(()),
        }
    }
}

impl CurrentRegistry for InMemoryCurrentRegistry {
    async fn pool_count(&self) -> Result<u64, RegistryError> {
        self.journal.record(Call::PoolCount);
        self.read_failure(operations::current::POOL_COUNT)?;
        let now = Instant::now();
        let pools = self.pools.lock().unwrap();
        Ok(pools.iter().filter(|stored| stored.visible_at <= now).count() as u64)
    }

    async fn pool_at(&self, index: PoolIndex) -> Result<PoolEntry, RegistryError> {
        self.journal.record(Call::PoolAt(index));
        self.read_failure(operations::current::POOL_AT)?;
        self.entry(index).ok_or(RegistryError::ReadFailure {
            registry: RegistryKind::Current,
            operation: operations::current::POOL_AT,
            reason: format!("no pool at {index}"),
        })
    }

    async fn create_pool(
        &self,
        staked_asset: Address,
        auxiliary_distributors: &[Address],
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        self.journal.record(Call::CreatePool {
            staked_asset,
            auxiliary_distributors: auxiliary_distributors.to_vec(),
            should_mass_update,
        });
        let tx_hash = next_tx_hash(&self.tx_counter);
        let failure = self.failures.take(operations::current::CREATE_POOL);
        if failure.map_or(true, |f| f.applies_mutation()) {
            self.append(staked_asset, auxiliary_distributors.to_vec());
            let intruder = self.intruder.lock().unwrap().take();
            if let Some(intruder) = intruder {
                self.append(intruder, vec![]);
            }
        }
        match failure {
            Some(failure) => Err(failure.into_error(RegistryKind::Current, operations::current::CREATE_POOL, tx_hash)),
            None => Ok(confirmation(tx_hash)),
        }
    }

    async fn set_pool(
        &self,
        index: PoolIndex,
        allocation_points: AllocationPoints,
        auxiliary_distributors: &[Address],
        overwrite: bool,
        should_mass_update: bool,
    ) -> Result<Confirmation, RegistryError> {
        self.journal.record(Call::SetPool {
            index,
            allocation_points,
            auxiliary_distributors: auxiliary_distributors.to_vec(),
            overwrite,
            should_mass_update,
        });
        let tx_hash = next_tx_hash(&self.tx_counter);
        let failure = self.failures.take(operations::current::SET_POOL);
        if failure.map_or(true, |f| f.applies_mutation()) {
            let mut pools = self.pools.lock().unwrap();
            if let Some(stored) = pools.get_mut(index.0 as usize) {
                stored.entry.allocation_points = allocation_points;
                if overwrite {
                    stored.entry.auxiliary_distributors = auxiliary_distributors.to_vec();
                }
            }
        }
        match failure {
            Some(failure) => Err(failure.into_error(RegistryKind::Current, operations::current::SET_POOL, tx_hash)),
            None => Ok(confirmation(tx_hash)),
        }
    }
}

/// In-memory legacy `MasterChef`.
pub struct InMemoryLegacyRegistry {
    allocations: Mutex<HashMap<PoolIndex, AllocationPoints>>,
    journal: Journal,
    failures: Failures,
    tx_counter: Mutex<u64>,
}

impl InMemoryLegacyRegistry {
    pub fn new(journal: Journal, master_allocation: AllocationPoints) -> Self {
        Self {
            allocations: Mutex::new(HashMap::from([(MASTER_SLOT, master_allocation)])),
            journal,
            failures: Failures::default(),
            tx_counter: Mutex::new(1000),
        }
    }

    pub fn fail_next(&self, operation: &'static str, failure: Failure) {
        self.failures.inject(operation, failure);
    }

    pub fn allocation(&self, slot: PoolIndex) -> AllocationPoints {
        self.allocations
            .lock()
            .unwrap()
            .get(&slot)
            .copied()
            .unwrap_or(AllocationPoints::ZERO)
    }

    pub fn overwrite(&self, slot: PoolIndex, allocation_points: AllocationPoints) {
        self.allocations.lock().unwrap().insert(slot, allocation_points);
    }
}

impl LegacyRegistry for InMemoryLegacyRegistry {
    async fn allocation_at(&self, slot: PoolIndex) -> Result<AllocationPoints, RegistryError> {
        self.journal.record(Call::AllocationAt(slot));
        if let Some(failure) = self.failures.take(operations::legacy::ALLOCATION_AT) {
            return Err(failure.into_error(RegistryKind::Legacy, operations::legacy::ALLOCATION_AT, TxHash::ZERO));
        }
        Ok(self.allocation(slot))
    }

    async fn set_allocation(
        &self,
        slot: PoolIndex,
        allocation_points: AllocationPoints,
    ) -> Result<Confirmation, RegistryError> {
        self.journal.record(Call::SetAllocation {
            slot,
            allocation_points,
        });
        let tx_hash = next_tx_hash(&self.tx_counter);
        let failure = self.failures.take(operations::legacy::SET_ALLOCATION);
        if failure.map_or(true, |f| f.applies_mutation()) {
            self.overwrite(slot, allocation_points);
        }
        match failure {
            Some(failure) => Err(failure.into_error(RegistryKind::Legacy, operations::legacy::SET_ALLOCATION, tx_hash)),
            None => Ok(confirmation(tx_hash)),
        }
    }
}

pub struct TestRegistries {
    pub journal: Journal,
    pub current: InMemoryCurrentRegistry,
    pub legacy: InMemoryLegacyRegistry,
}

impl TestRegistries {
    /// `existing_pools` pools in the current registry, `master_allocation` at the master slot.
    pub fn new(existing_pools: u64, master_allocation: u64) -> Self {
        let journal = Journal::default();
        Self {
            current: InMemoryCurrentRegistry::new(journal.clone(), existing_pools),
            legacy: InMemoryLegacyRegistry::new(journal.clone(), AllocationPoints(master_allocation)),
            journal,
        }
    }
}
