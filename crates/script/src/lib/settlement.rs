use std::str::FromStr;
use std::time::Duration;

use axo_farms_migration_shared::pool::PoolIndex;
use thiserror::Error;
use tokio::time::Instant;

use crate::registry::{CurrentRegistry, RegistryError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStrategy {
    /// Sleep for the whole settlement delay and trust it.
    FixedDelay,
    /// Re-read the pool count until the new pool is visible, giving up after the settlement delay.
    Poll { interval: Duration },
}

impl Default for SettlementStrategy {
    fn default() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown settlement strategy {0:?}, expected one of: poll, fixed")]
pub struct StrategyParseError(String);

impl FromStr for SettlementStrategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "poll" => Ok(Self::default()),
            "fixed" => Ok(Self::FixedDelay),
            other => Err(StrategyParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Pool {expected_index} not observed in current registry after {waited:?} (last pool count {last_pool_count})")]
    NotObserved {
        expected_index: PoolIndex,
        last_pool_count: u64,
        waited: Duration,
    },

    #[error(transparent)]
    Read(#[from] RegistryError),
}

pub struct SettlementWaiter {
    strategy: SettlementStrategy,
}

impl SettlementWaiter {
    pub fn new(strategy: SettlementStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SettlementStrategy {
        self.strategy
    }

    /// Suspends the caller until the pool at `expected_index` is visible in `current`, or until
    /// `bound` elapses. Only the calling task is suspended.
    pub async fn wait_for_pool<C: CurrentRegistry>(
        &self,
        current: &C,
        expected_index: PoolIndex,
        bound: Duration,
    ) -> Result<(), SettlementError> {
        match self.strategy {
            SettlementStrategy::FixedDelay => {
                tracing::info!("Sleeping for {} seconds...", bound.as_secs());
                tokio::time::sleep(bound).await;
                Ok(())
            }
            SettlementStrategy::Poll { interval } => {
                let interval = interval.max(MIN_POLL_INTERVAL);
                let started = Instant::now();
                loop {
                    let pool_count = current.pool_count().await?;
                    let waited = started.elapsed();
                    if pool_count > expected_index.0 {
                        tracing::info!(
                            pool_count,
                            expected_index = %expected_index,
                            "New pool observed after {waited:?}"
                        );
                        return Ok(());
                    }
                    if waited >= bound {
                        tracing::warn!(
                            pool_count,
                            expected_index = %expected_index,
                            "New pool still not observed after {waited:?}"
                        );
                        return Err(SettlementError::NotObserved {
                            expected_index,
                            last_pool_count: pool_count,
                            waited,
                        });
                    }
                    tracing::debug!(pool_count, "Pool not yet visible, polling again");
                    tokio::time::sleep(interval.min(bound - waited)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parsing() {
        assert_eq!("poll".parse::<SettlementStrategy>(), Ok(SettlementStrategy::default()));
        assert_eq!("FIXED".parse::<SettlementStrategy>(), Ok(SettlementStrategy::FixedDelay));
        assert!("sometimes".parse::<SettlementStrategy>().is_err());
    }
}
