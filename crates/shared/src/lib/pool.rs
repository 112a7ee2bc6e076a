use std::fmt;

use alloy_primitives::{ruint::FromUintError, Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Conversion error: failed to convert {value} to u64: {error:?}")]
    FromUint256Error { value: U256, error: FromUintError<u64> },
}

pub mod conversions {
    use super::ConversionError;
    use alloy_primitives::U256;

    pub fn uint256_to_u64(value: U256) -> Result<u64, ConversionError> {
        value
            .try_into()
            .map_err(|error| ConversionError::FromUint256Error { value, error })
    }
}

/// Position of a pool inside a registry.
///
/// The current registry assigns these monotonically on creation; the legacy registry is only
/// ever addressed through the pre-configured master slot.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug, Serialize, Deserialize)]
pub struct PoolIndex(pub u64);

impl PoolIndex {
    /// Index of the most recently appended pool in a registry holding `count` pools.
    pub fn last_of(count: u64) -> Option<Self> {
        count.checked_sub(1).map(PoolIndex)
    }
}

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<U256> for PoolIndex {
    type Error = ConversionError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        Ok(PoolIndex(conversions::uint256_to_u64(value)?))
    }
}

impl From<PoolIndex> for U256 {
    fn from(value: PoolIndex) -> Self {
        U256::from(value.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("Allocation overflow: {current} + {requested} exceeds {max}", max = u64::MAX)]
pub struct AllocationOverflow {
    pub current: AllocationPoints,
    pub requested: AllocationPoints,
}

/// Integer weight of a pool in the registry's reward budget.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug, Default, Serialize, Deserialize)]
pub struct AllocationPoints(pub u64);

impl AllocationPoints {
    pub const ZERO: AllocationPoints = AllocationPoints(0);

    pub fn checked_add(self, requested: AllocationPoints) -> Result<AllocationPoints, AllocationOverflow> {
        self.0
            .checked_add(requested.0)
            .map(AllocationPoints)
            .ok_or(AllocationOverflow {
                current: self,
                requested,
            })
    }
}

impl fmt::Display for AllocationPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<U256> for AllocationPoints {
    type Error = ConversionError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        Ok(AllocationPoints(conversions::uint256_to_u64(value)?))
    }
}

impl From<AllocationPoints> for U256 {
    fn from(value: AllocationPoints) -> Self {
        U256::from(value.0)
    }
}

/// Additive rebalance of the legacy master slot: the slot keeps everything it had and gains
/// the allocation being delegated to the new pool.
pub fn rebalanced_master_allocation(
    current: AllocationPoints,
    requested: AllocationPoints,
) -> Result<AllocationPoints, AllocationOverflow> {
    current.checked_add(requested)
}

#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct PoolEntry {
    pub index: PoolIndex,
    pub staked_asset: Address,
    pub allocation_points: AllocationPoints,
    pub auxiliary_distributors: Vec<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn last_of_empty_registry_is_none() {
        assert_eq!(PoolIndex::last_of(0), None);
        assert_eq!(PoolIndex::last_of(1), Some(PoolIndex(0)));
        assert_eq!(PoolIndex::last_of(26), Some(PoolIndex(25)));
    }

    #[test]
    fn rebalance_adds_requested() {
        let result = rebalanced_master_allocation(AllocationPoints(1000), AllocationPoints(250));
        assert_eq!(result, Ok(AllocationPoints(1250)));
    }

    #[test]
    fn rebalance_overflow_is_reported() {
        let result = rebalanced_master_allocation(AllocationPoints(u64::MAX), AllocationPoints(1));
        assert_eq!(
            result,
            Err(AllocationOverflow {
                current: AllocationPoints(u64::MAX),
                requested: AllocationPoints(1)
            })
        );
    }

    #[test]
    fn uint256_conversion_rejects_oversized_values() {
        let too_big = U256::from(u64::MAX) + U256::from(1);
        assert!(AllocationPoints::try_from(too_big).is_err());
        assert_eq!(AllocationPoints::try_from(U256::from(42)), Ok(AllocationPoints(42)));
    }

    proptest! {
        #[test]
        fn rebalance_is_exact_addition(current in any::<u64>(), requested in any::<u64>()) {
            let result = rebalanced_master_allocation(AllocationPoints(current), AllocationPoints(requested));
            match current.checked_add(requested) {
                Some(expected) => prop_assert_eq!(result, Ok(AllocationPoints(expected))),
                None => prop_assert!(result.is_err()),
            }
        }
    }
}
