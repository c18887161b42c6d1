//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

use std::{convert::TryInto, fmt, io::Read, iter::FromIterator, sync::Arc};

use crate::compactint::CompactInt;
use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use bitcoin_serde_derive::BtcSerialize;
use bytes::{Buf, BytesMut};
pub use hash::Hash;
pub use header::{BlockTimeError, Header};
pub use height::Height;

use serde::{Deserialize, Serialize};

use crate::{fmt::DisplayToDebug, transaction::Transaction, transparent};

use self::serialize::MAX_BLOCK_BYTES;

/// A Bitcoin block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<std::sync::Arc<Transaction>>,
}

/// Don't ever use this in production. Seriously.
///
/// Having this method makes testing easier. That's it.
#[cfg(any(test, feature = "proptest-impl"))]
impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        eprintln!("Using Block::bitcoin_deserialize is not safe! It can result in silent data corruption. Seriously, don't.");
        let mut src = reader.bytes().map(|result| match result {
            // For real. Look at this. Don't use this in production. Ever.
            Err(e) => panic!("Error deserializing block! {}", e),
            Ok(byte) => byte,
        });
        let mut src = BytesMut::from_iter(&mut src);
        Block::deserialize_from_buf(&mut src)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }

        fmter.field("hash", &DisplayToDebug(self.hash())).finish()
    }
}

impl Block {
    /// Return the block height reported in the coinbase transaction, if any.
    /// Invariant: This method assumes that the height is pre-cached by some early construction/deserialization function.
    /// TODO: this invariant is not upheld by the implementation of bitcoin_deserialize for transparent::Input
    /// Instead, it needs to be delegated to a higher-level function which is aware of the status of BIP34 activation.
    pub fn coinbase_height(&self) -> Option<Height> {
        if let Some(height) = self.header.reported_height() {
            return Some(Height(height as u32));
        }
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref height, .. } => match height {
                    Some(cached_height) => cached_height.value(),
                    None => None,
                },
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(self)
    }

    /// Deserializes a block, making the following structurally invalid
    /// states unrepresentable:
    /// 1. The block contains at least one transaction, and the first one is
    ///    a coinbase.
    /// 1. The transactions merkle-ize to the root named in the header.
    pub fn deserialize_from_buf(src: &mut BytesMut) -> Result<Self, SerializationError> {
        let mut header = Header::deserialize_from_buf(src.split_to(Header::len()))?;

        let mut src = src.reader().take(MAX_BLOCK_BYTES - Header::len() as u64);
        let tx_count = {
            let tx_count = CompactInt::bitcoin_deserialize(&mut src)?;
            tx_count.value()
        };

        if tx_count == 0 {
            return Err(SerializationError::Parse("block contains no transactions"));
        }
        // Sanity check number of transactions to prevent DOS attacks
        if tx_count > MAX_BLOCK_BYTES / (36 * 4) {
            return Err(SerializationError::Parse(
                "Block contained too many transactions for each to have at least one input",
            ));
        }
        let mut transactions: Vec<Arc<Transaction>> = Vec::with_capacity(
            tx_count
                .try_into()
                .expect("usize::min must be greater than MAX_BLOCK_BYTES / (36 * 4)"),
        );

        // Parse and validate remaining transactions
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::bitcoin_deserialize(&mut src)?);
        }

        if !transactions[0].is_coinbase() {
            return Err(SerializationError::Parse(
                "the first transaction in a block must be a coinbase",
            ));
        }
        if transactions[1..].iter().any(|tx| tx.contains_coinbase_input()) {
            return Err(SerializationError::Parse(
                "coinbase input found outside the first transaction",
            ));
        }

        let actual_merkle_root: merkle::Root = transactions
            .iter()
            .map(|tx| tx.hash())
            .collect::<merkle::Root>();
        if Hash::from(actual_merkle_root) != header.merkle_root {
            return Err(SerializationError::Parse(
                "transactions do not merkle-ize to the header's merkle root",
            ));
        }

        if let transparent::Input::Coinbase {
            height: Some(cached_height),
            ..
        } = &transactions[0].inputs[0]
        {
            if let Some(height) = cached_height.value() {
                header.set_reported_height(height.0);
            }
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
