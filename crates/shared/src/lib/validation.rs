use std::str::FromStr;

use alloy_primitives::Address;
use thiserror::Error;

use crate::migration::{MigrationRequest, RawMigrationInput};
use crate::pool::AllocationPoints;

const ADDRESS_HEX_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRejection {
    /// Not `0x` followed by 40 hex digits.
    Format,
    /// Mixed-case input whose casing does not match EIP-55.
    Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountRejection {
    Empty,
    NotADecimalInteger,
    OutOfRange,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Invalid {field} address {input:?}: {reason:?}")]
    InvalidAddress {
        field: &'static str,
        input: String,
        reason: AddressRejection,
    },

    #[error("Invalid {field} amount {input:?}: {reason:?}")]
    InvalidAmount {
        field: &'static str,
        input: String,
        reason: AmountRejection,
    },
}

fn is_mixed_case(hex: &str) -> bool {
    hex.chars().any(|c| c.is_ascii_lowercase()) && hex.chars().any(|c| c.is_ascii_uppercase())
}

/// All-lowercase and all-uppercase hex pass unchanged, mixed case must carry a valid EIP-55
/// checksum.
pub fn validate_address(field: &'static str, raw: &str) -> Result<Address, InputError> {
    let reject = |reason| InputError::InvalidAddress {
        field,
        input: raw.to_owned(),
        reason,
    };

    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(reject(AddressRejection::Format));
    }

    let prefixed = format!("0x{hex}");
    if is_mixed_case(hex) {
        Address::parse_checksummed(&prefixed, None).map_err(|_| reject(AddressRejection::Checksum))
    } else {
        Address::from_str(&prefixed).map_err(|_| reject(AddressRejection::Format))
    }
}

pub fn validate_amount(field: &'static str, raw: &str) -> Result<AllocationPoints, InputError> {
    let reject = |reason| InputError::InvalidAmount {
        field,
        input: raw.to_owned(),
        reason,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(reject(AmountRejection::Empty));
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(reject(AmountRejection::NotADecimalInteger));
    }
    trimmed
        .parse::<u64>()
        .map(AllocationPoints)
        .map_err(|_| reject(AmountRejection::OutOfRange))
}

/// Turns raw operator input into a fresh [`MigrationRequest`]. Purely local: no I/O, no state.
pub fn validate_request(raw: &RawMigrationInput) -> Result<MigrationRequest, InputError> {
    let requested_allocation_points = validate_amount("allocation", &raw.allocation_points)?;
    let staked_asset = validate_address("staked asset", &raw.staked_asset)?;
    let auxiliary_distributors = raw
        .auxiliary_distributors
        .iter()
        .map(|distributor| validate_address("distributor", distributor))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MigrationRequest::new(
        requested_allocation_points,
        staked_asset,
        auxiliary_distributors,
        raw.should_mass_update,
        raw.settlement_delay_seconds,
    ))
}
