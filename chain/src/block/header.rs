use std::io::Write as _;

use bytes::Buf;
use chrono::{DateTime, Duration, Utc};
#[cfg(test)]
use chrono::TimeZone;
use thiserror::Error;

use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    cached::Cached, serialization::sha256d, work::difficulty::CompactDifficulty,
    BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

use super::Hash;

/// A block header: 80 bytes, fields serialized little-endian in declaration
/// order. Chains are linked backward through `previous_block_hash`, all the
/// way to the hardcoded genesis block.
#[derive(
    Clone, Copy, Debug, PartialEq, Serialize, Deserialize, BtcSerialize, BtcDeserialize,
)]
pub struct Header {
    pub version: u32,
    pub previous_block_hash: Hash,
    /// The root of the transaction Merkle tree, binding this header to the
    /// block's transactions. A duplicate-transaction-hash attack
    /// (CVE-2012-2459) can make two distinct transaction sets share a root;
    /// block validation separately rejects duplicate transaction hashes.
    pub merkle_root: Hash,
    pub time: DateTime<Utc>,
    /// The compact-encoded PoW target this header's `pow_hash` must not
    /// exceed.
    pub difficulty_threshold: CompactDifficulty,
    pub nonce: u32,

    /// Cached canonical hash, not part of the wire format.
    hash: Cached<Hash>,
    /// BIP 34 block height, recovered from the coinbase transaction's first
    /// input when deserializing a full block. Not part of the header's own
    /// wire format; `Header` alone has no way to populate it.
    reported_height: Cached<u32>,
}

#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("invalid time {0:?} in header: more than 2 hours in the future ({1:?})")]
    InvalidBlockTime(DateTime<Utc>, DateTime<Utc>),
}

impl Header {
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: Hash,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
            reported_height: Cached::new(),
        }
    }

    /// The header's canonical hash, recomputing it if it wasn't cached by a
    /// zero-copy parse.
    pub fn hash(&self) -> Hash {
        self.hash.value().unwrap_or_else(|| Hash::from(self))
    }

    /// The BIP 34 coinbase height cached on this header during block
    /// deserialization, if any. A bare `Header` never has this populated;
    /// only `Block::deserialize_from_buf` fills it in from the coinbase
    /// transaction.
    pub fn reported_height(&self) -> Option<u32> {
        self.reported_height.value()
    }

    pub(crate) fn set_reported_height(&mut self, height: u32) {
        self.reported_height = Cached::from(height);
    }

    pub fn time_is_valid_at(&self, now: DateTime<Utc>) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::InvalidBlockTime(
                self.time,
                two_hours_in_the_future,
            ))
        }
    }

    /// Deserializes a header from a `Buf`, hashing the raw bytes as they are
    /// consumed so the canonical hash comes for free instead of requiring a
    /// second serialize-then-hash pass.
    pub fn deserialize_from_buf<B: Buf>(mut src: B) -> Result<Self, SerializationError> {
        if src.remaining() < Header::len() {
            return Err(SerializationError::Parse(
                "not enough bytes for a block header",
            ));
        }
        let raw = src.copy_to_bytes(Header::len());
        let mut hash_writer = sha256d::Writer::default();
        hash_writer.write_all(&raw[..])?;
        let own_hash = Hash(hash_writer.finish());

        let mut cursor = std::io::Cursor::new(raw);
        Ok(Header {
            version: u32::bitcoin_deserialize(&mut cursor)?,
            previous_block_hash: Hash::bitcoin_deserialize(&mut cursor)?,
            merkle_root: Hash::bitcoin_deserialize(&mut cursor)?,
            time: <DateTime<Utc>>::bitcoin_deserialize(&mut cursor)?,
            difficulty_threshold: CompactDifficulty::bitcoin_deserialize(&mut cursor)?,
            nonce: u32::bitcoin_deserialize(&mut cursor)?,
            hash: Cached::from(own_hash),
            reported_height: Cached::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header::new(
            1,
            Hash([0u8; 32]),
            Hash([1u8; 32]),
            Utc.timestamp(1_231_006_505, 0),
            CompactDifficulty(0x1f09_9996),
            2_083_236_893,
        )
    }

    #[test]
    fn serialize_is_80_bytes() {
        let bytes = sample().bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), Header::len());
    }

    #[test]
    fn deserialize_from_buf_caches_the_same_hash_as_from_header() {
        let h = sample();
        let bytes = h.bitcoin_serialize_to_vec().unwrap();
        let parsed = Header::deserialize_from_buf(bytes::Bytes::from(bytes)).unwrap();
        assert_eq!(parsed.hash(), Hash::from(&h));
    }
}
