//! Compact-target ("bits") encoding, as used by `BlockHeader::bits`.
//!
//! `target = coefficient * 256^(exponent - 3)`, with `exponent = bits >> 24`
//! and `coefficient = bits & 0xFFFFFF`. Decode/encode round-trip for all
//! well-formed `bits`; the proof-of-work comparison and retarget arithmetic
//! built on top of this type live in the `consensus` crate.

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::io;

/// A 32-bit compact encoding of a 256-bit target threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

impl CompactDifficulty {
    /// Decode to a 256-bit target. Returns `None` for the "negative"
    /// encoding (coefficient's top bit set) which is never valid for a real
    /// target.
    pub fn to_target(self) -> Option<U256> {
        let exponent = (self.0 >> 24) as u32;
        let coefficient = self.0 & 0x007F_FFFF;
        let negative = self.0 & 0x0080_0000 != 0;
        if negative {
            return None;
        }
        let coefficient = U256::from(self.0 & 0x00FF_FFFF);
        if exponent <= 3 {
            Some(coefficient >> (8 * (3 - exponent)))
        } else {
            let shift = 8 * (exponent - 3);
            if shift >= 256 {
                None
            } else {
                Some(coefficient << shift)
            }
        }
    }

    /// Encode a 256-bit target to its compact form, shifting right
    /// (incrementing the exponent) whenever the coefficient's high bit would
    /// otherwise be set, to keep the sign bit clear.
    pub fn from_target(target: U256) -> CompactDifficulty {
        if target.is_zero() {
            return CompactDifficulty(0);
        }
        let mut bytes = [0u8; 32];
        target.to_big_endian(&mut bytes);
        let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap();
        let mut size = (32 - first_nonzero) as u32;
        let mut coefficient: u32 = 0;
        let take = |bytes: &[u8], start: usize| -> u32 {
            let mut c = [0u8; 4];
            for (i, b) in bytes.iter().skip(start).take(3).enumerate() {
                c[1 + i] = *b;
            }
            u32::from_be_bytes(c)
        };
        coefficient = take(&bytes, first_nonzero);
        if coefficient & 0x0080_0000 != 0 {
            coefficient >>= 8;
            size += 1;
        }
        CompactDifficulty((size << 24) | (coefficient & 0x007F_FFFF))
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_genesis_bits() {
        // Litecoin-style genesis difficulty used by this network.
        let bits = CompactDifficulty(0x1f09_9996);
        let target = bits.to_target().unwrap();
        let back = CompactDifficulty::from_target(target);
        assert_eq!(bits, back);
    }

    #[test]
    fn roundtrip_bitcoin_max_bits() {
        let bits = CompactDifficulty(0x1d00_ffff);
        let target = bits.to_target().unwrap();
        let back = CompactDifficulty::from_target(target);
        assert_eq!(bits, back);
    }

    #[test]
    fn negative_encoding_has_no_target() {
        let bits = CompactDifficulty(0x01_80_00_00 | 0x0080_0000);
        assert!(bits.to_target().is_none());
    }
}
