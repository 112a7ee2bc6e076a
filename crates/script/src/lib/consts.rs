use std::str::FromStr;

use alloy_primitives::Address;
use axo_farms_migration_shared::pool::PoolIndex;
use thiserror::Error;

pub const ANVIL_CHAIN_ID: u64 = 31337;

pub mod polygon {
    use hex_literal::hex;
    pub const LEGACY_REGISTRY: [u8; 20] = hex!("C5C24B76de65808eD1c17E411c6C5cfC78FA1A98");
    pub const CURRENT_REGISTRY: [u8; 20] = hex!("b80d90DA1231C84DD1327CcaFD9b750e03a0264E");
    pub const MASTER_SLOT: u64 = 25;
}

/// Addresses of an already deployed registry pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryDeployment {
    pub legacy_registry: Address,
    pub current_registry: Address,
    pub master_slot: PoolIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub deployment: Option<RegistryDeployment>,
}

pub trait NetworkInfo {
    fn as_str(&self) -> String;
    fn get_config(&self) -> NetworkConfig;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Polygon,
    Goerli,
}

impl NetworkInfo for Network {
    fn as_str(&self) -> String {
        let val = match self {
            Self::Polygon => "polygon",
            Self::Goerli => "goerli",
        };
        val.to_owned()
    }

    fn get_config(&self) -> NetworkConfig {
        match self {
            Self::Polygon => NetworkConfig {
                chain_id: 137,
                deployment: Some(RegistryDeployment {
                    legacy_registry: Address::from(polygon::LEGACY_REGISTRY),
                    current_registry: Address::from(polygon::CURRENT_REGISTRY),
                    master_slot: PoolIndex(polygon::MASTER_SLOT),
                }),
            },
            Self::Goerli => NetworkConfig {
                chain_id: 5,
                deployment: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrappedNetwork {
    Anvil(Network),
    Id(Network),
}

impl NetworkInfo for WrappedNetwork {
    fn as_str(&self) -> String {
        match self {
            Self::Anvil(fork) => format!("anvil-{}", fork.as_str()),
            Self::Id(network) => network.as_str(),
        }
    }

    fn get_config(&self) -> NetworkConfig {
        match self {
            Self::Id(network) => network.get_config(),
            Self::Anvil(fork) => {
                let mut fork_config = fork.get_config();
                fork_config.chain_id = ANVIL_CHAIN_ID;
                fork_config
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown network {0:?}, expected one of: polygon, goerli, anvil-polygon, anvil-goerli")]
pub struct NetworkParseError(String);

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polygon" => Ok(Self::Polygon),
            "goerli" => Ok(Self::Goerli),
            _ => Err(NetworkParseError(s.to_owned())),
        }
    }
}

impl FromStr for WrappedNetwork {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some(("anvil", fork)) => fork
                .parse::<Network>()
                .map(WrappedNetwork::Anvil)
                .map_err(|_| NetworkParseError(s.to_owned())),
            Some(_) => Err(NetworkParseError(s.to_owned())),
            None => s.parse::<Network>().map(WrappedNetwork::Id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn parses_plain_and_anvil_networks() {
        assert_eq!("polygon".parse(), Ok(WrappedNetwork::Id(Network::Polygon)));
        assert_eq!("anvil-goerli".parse(), Ok(WrappedNetwork::Anvil(Network::Goerli)));
        assert!("mainnet".parse::<WrappedNetwork>().is_err());
        assert!("anvil-mainnet".parse::<WrappedNetwork>().is_err());
        assert!("fork-polygon".parse::<WrappedNetwork>().is_err());
    }

    #[test]
    fn polygon_preset_points_at_known_registries() {
        let config = WrappedNetwork::Id(Network::Polygon).get_config();
        assert_eq!(config.chain_id, 137);
        let deployment = config.deployment.expect("Polygon has a known deployment");
        assert_eq!(
            deployment.legacy_registry,
            address!("C5C24B76de65808eD1c17E411c6C5cfC78FA1A98")
        );
        assert_eq!(
            deployment.current_registry,
            address!("b80d90DA1231C84DD1327CcaFD9b750e03a0264E")
        );
        assert_eq!(deployment.master_slot, PoolIndex(25));
    }

    #[test]
    fn anvil_fork_keeps_deployment_but_not_chain_id() {
        let config = WrappedNetwork::Anvil(Network::Polygon).get_config();
        assert_eq!(config.chain_id, ANVIL_CHAIN_ID);
        assert!(config.deployment.is_some());
        assert_eq!(WrappedNetwork::Anvil(Network::Polygon).as_str(), "anvil-polygon");
    }
}
