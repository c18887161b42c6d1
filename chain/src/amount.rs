//! Typed output amounts.
//!
//! Base units, 10^8 per coin — named `COIN` below to match the block-subsidy
//! arithmetic in the consensus crate.

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Base units per whole coin.
pub const COIN: u64 = 100_000_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount overflow")]
    Overflow,
    #[error("amount underflow")]
    Underflow,
}

/// A non-negative amount of the chain's base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub fn zero() -> Self {
        Amount(0)
    }

    pub fn from_u64(value: u64) -> Self {
        Amount(value)
    }

    pub fn base_units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(AmountError::Underflow)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BitcoinSerialize for Amount {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Amount {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Amount(u64::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_rejected() {
        let a = Amount::from_u64(u64::MAX);
        let b = Amount::from_u64(1);
        assert_eq!(a.checked_add(b), Err(AmountError::Overflow));
    }

    #[test]
    fn underflow_is_rejected() {
        let a = Amount::from_u64(0);
        let b = Amount::from_u64(1);
        assert_eq!(a.checked_sub(b), Err(AmountError::Underflow));
    }
}
