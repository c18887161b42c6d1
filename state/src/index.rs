//! The sled-backed block index: height/hash mapping for the active chain,
//! hash/location/status lookups for every known block (active or
//! sidechain), and locator support.
//!
//! Adapted from the reference node's `FinalizedState`: we keep its tree
//! layout for the chain index, but instead of storing whole serialized
//! blocks in sled (`block_by_height`), we store a [`BlockLocation`] that
//! points into the flat-file [`crate::BlockStore`]. Blocks are bulk,
//! immutable, append-only data; sled is reserved for the indices that need
//! point lookups and ordered iteration.

use byteorder::{BigEndian, ByteOrder};

use chain::{block, transaction};

use crate::{blockstore::BlockLocation, StateError};

/// A block stored in the index but not (yet) part of the active chain:
/// persisted to disk and indexed, but its height is not part of the
/// `height -> hash` mapping `tip()`/`block_locator()` read from.
pub const STATUS_SIDECHAIN: u8 = 2;
/// A block that is part of the active chain.
pub const STATUS_ACTIVE: u8 = 3;

/// Heights a `getblocks`-style locator should name, gallop-spaced back from
/// the tip: the most recent 10 heights, then doubling gaps, down to genesis.
fn block_locator_heights(tip: block::Height) -> Vec<block::Height> {
    let mut heights = Vec::new();
    let mut step = 1u32;
    let mut height = tip.0;
    loop {
        heights.push(block::Height(height));
        if height == 0 {
            break;
        }
        if heights.len() >= 10 {
            step = step.saturating_mul(2);
        }
        height = height.saturating_sub(step);
    }
    heights
}

fn height_key(height: block::Height) -> [u8; 4] {
    let mut key = [0u8; 4];
    BigEndian::write_u32(&mut key, height.0);
    key
}

fn encode_location(location: BlockLocation) -> [u8; 16] {
    let mut buf = [0u8; 16];
    BigEndian::write_u32(&mut buf[0..4], location.file_num);
    BigEndian::write_u64(&mut buf[4..12], location.offset);
    BigEndian::write_u32(&mut buf[12..16], location.length);
    buf
}

fn decode_location(bytes: &[u8]) -> BlockLocation {
    BlockLocation {
        file_num: BigEndian::read_u32(&bytes[0..4]),
        offset: BigEndian::read_u64(&bytes[4..12]),
        length: BigEndian::read_u32(&bytes[12..16]),
    }
}

pub struct Index {
    /// `height -> hash`, populated only for [`STATUS_ACTIVE`] blocks.
    hash_by_height: sled::Tree,
    /// `hash -> height`, populated for every known block.
    height_by_hash: sled::Tree,
    /// `hash -> (file_num, offset, length)`, populated for every known block.
    location_by_hash: sled::Tree,
    /// `hash -> status` ([`STATUS_SIDECHAIN`] or [`STATUS_ACTIVE`]).
    status_by_hash: sled::Tree,
    /// `transaction hash -> containing block hash`, populated for every
    /// transaction in every known block. Lets Disconnect recover a spent
    /// output's original block (and from there its height and
    /// coinbase-ness) once the output itself has been removed from the
    /// UTXO set.
    block_by_transaction: sled::Tree,
}

impl Index {
    pub fn new(db: &sled::Db) -> Result<Self, StateError> {
        Ok(Index {
            hash_by_height: db.open_tree(b"hash_by_height")?,
            height_by_hash: db.open_tree(b"height_by_hash")?,
            location_by_hash: db.open_tree(b"location_by_hash")?,
            status_by_hash: db.open_tree(b"status_by_hash")?,
            block_by_transaction: db.open_tree(b"block_by_transaction")?,
        })
    }

    /// Record that `hash` was committed at `height`, with its bytes living
    /// at `location` in the block store, at the given `status`.
    pub fn commit_block(
        &self,
        height: block::Height,
        hash: block::Hash,
        location: BlockLocation,
        status: u8,
    ) -> Result<(), StateError> {
        self.height_by_hash.insert(&hash.0[..], &height_key(height)[..])?;
        self.location_by_hash
            .insert(&hash.0[..], &encode_location(location)[..])?;
        self.status_by_hash.insert(&hash.0[..], &[status])?;
        if status == STATUS_ACTIVE {
            self.hash_by_height.insert(height_key(height), &hash.0[..])?;
        }
        Ok(())
    }

    /// Mark an already-indexed block as part of the active chain, adding it
    /// to the `height -> hash` mapping. Used when Connect succeeds for a
    /// block that was previously only stored as a sidechain block.
    pub fn promote_to_active(&self, height: block::Height, hash: block::Hash) -> Result<(), StateError> {
        self.status_by_hash.insert(&hash.0[..], &[STATUS_ACTIVE])?;
        self.hash_by_height.insert(height_key(height), &hash.0[..])?;
        Ok(())
    }

    /// Mark an active block as a sidechain block again, removing it from
    /// the `height -> hash` mapping. Used by Disconnect.
    pub fn demote_from_active(&self, height: block::Height, hash: block::Hash) -> Result<(), StateError> {
        self.status_by_hash.insert(&hash.0[..], &[STATUS_SIDECHAIN])?;
        self.hash_by_height.remove(height_key(height))?;
        Ok(())
    }

    pub fn status(&self, hash: block::Hash) -> Result<Option<u8>, StateError> {
        Ok(self.status_by_hash.get(&hash.0[..])?.map(|bytes| bytes[0]))
    }

    /// Record that every hash in `transactions` was included in the block
    /// named by `block_hash`. Called once per newly connected block so
    /// Disconnect can later recover a spent output's origin.
    pub fn record_transactions(
        &self,
        block_hash: block::Hash,
        transactions: impl IntoIterator<Item = transaction::Hash>,
    ) -> Result<(), StateError> {
        for tx_hash in transactions {
            self.block_by_transaction
                .insert(&tx_hash.0[..], &block_hash.0[..])?;
        }
        Ok(())
    }

    /// The hash of the block that contains the transaction named by
    /// `tx_hash`, if known.
    pub fn block_for_transaction(
        &self,
        tx_hash: transaction::Hash,
    ) -> Result<Option<block::Hash>, StateError> {
        Ok(self
            .block_by_transaction
            .get(&tx_hash.0[..])?
            .map(|bytes| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                block::Hash(hash)
            }))
    }

    pub fn height_for_hash(&self, hash: block::Hash) -> Result<Option<block::Height>, StateError> {
        Ok(self
            .height_by_hash
            .get(&hash.0[..])?
            .map(|bytes| block::Height(BigEndian::read_u32(&bytes))))
    }

    pub fn hash_for_height(&self, height: block::Height) -> Result<Option<block::Hash>, StateError> {
        Ok(self
            .hash_by_height
            .get(height_key(height))?
            .map(|bytes| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                block::Hash(hash)
            }))
    }

    pub fn location_for_hash(&self, hash: block::Hash) -> Result<Option<BlockLocation>, StateError> {
        Ok(self
            .location_by_hash
            .get(&hash.0[..])?
            .map(|bytes| decode_location(&bytes)))
    }

    /// The current tip: the highest active-chain `(height, hash)` pair.
    pub fn tip(&self) -> Result<Option<(block::Height, block::Hash)>, StateError> {
        match self.hash_by_height.iter().next_back().transpose()? {
            Some((height_bytes, hash_bytes)) => {
                let height = block::Height(BigEndian::read_u32(&height_bytes));
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&hash_bytes);
                Ok(Some((height, block::Hash(hash))))
            }
            None => Ok(None),
        }
    }

    /// How many blocks separate `hash` from the current tip, or `None` if
    /// `hash` is not in the index.
    pub fn depth(&self, hash: block::Hash) -> Result<Option<u32>, StateError> {
        let height = match self.height_for_hash(hash)? {
            Some(height) => height,
            None => return Ok(None),
        };
        let (tip_height, _) = self.tip()?.expect("hash was found, so the tip exists");
        Ok(Some(tip_height.0 - height.0))
    }

    /// A sparse list of block hashes, galloping back from the tip, suitable
    /// for a `getblocks` locator.
    pub fn block_locator(&self) -> Result<Vec<block::Hash>, StateError> {
        let (tip_height, _) = match self.tip()? {
            Some(pair) => pair,
            None => return Ok(Vec::new()),
        };
        let mut hashes = Vec::new();
        for height in block_locator_heights(tip_height) {
            if let Some(hash) = self.hash_for_height(height)? {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    #[test]
    fn tip_is_none_when_empty() {
        let index = Index::new(&ephemeral_db()).unwrap();
        assert_eq!(index.tip().unwrap(), None);
    }

    #[test]
    fn commit_then_lookup_round_trips() {
        let index = Index::new(&ephemeral_db()).unwrap();
        let hash = block::Hash([9u8; 32]);
        let location = BlockLocation {
            file_num: 2,
            offset: 4096,
            length: 512,
        };
        index
            .commit_block(block::Height(7), hash, location, STATUS_ACTIVE)
            .unwrap();

        assert_eq!(index.height_for_hash(hash).unwrap(), Some(block::Height(7)));
        assert_eq!(index.hash_for_height(block::Height(7)).unwrap(), Some(hash));
        assert_eq!(index.location_for_hash(hash).unwrap(), Some(location));
        assert_eq!(index.status(hash).unwrap(), Some(STATUS_ACTIVE));
        assert_eq!(index.tip().unwrap(), Some((block::Height(7), hash)));
        assert_eq!(index.depth(hash).unwrap(), Some(0));
    }

    #[test]
    fn sidechain_blocks_are_not_part_of_the_height_map() {
        let index = Index::new(&ephemeral_db()).unwrap();
        let hash = block::Hash([4u8; 32]);
        let location = BlockLocation {
            file_num: 0,
            offset: 0,
            length: 10,
        };
        index
            .commit_block(block::Height(3), hash, location, STATUS_SIDECHAIN)
            .unwrap();
        assert_eq!(index.tip().unwrap(), None);
        assert_eq!(index.hash_for_height(block::Height(3)).unwrap(), None);
        assert_eq!(index.height_for_hash(hash).unwrap(), Some(block::Height(3)));
    }

    #[test]
    fn promote_adds_the_block_to_the_active_chain() {
        let index = Index::new(&ephemeral_db()).unwrap();
        let hash = block::Hash([4u8; 32]);
        let location = BlockLocation {
            file_num: 0,
            offset: 0,
            length: 10,
        };
        index
            .commit_block(block::Height(3), hash, location, STATUS_SIDECHAIN)
            .unwrap();
        index.promote_to_active(block::Height(3), hash).unwrap();
        assert_eq!(index.tip().unwrap(), Some((block::Height(3), hash)));
        assert_eq!(index.status(hash).unwrap(), Some(STATUS_ACTIVE));
    }

    #[test]
    fn demote_removes_the_block_from_the_active_chain() {
        let index = Index::new(&ephemeral_db()).unwrap();
        let hash = block::Hash([4u8; 32]);
        let location = BlockLocation {
            file_num: 0,
            offset: 0,
            length: 10,
        };
        index
            .commit_block(block::Height(3), hash, location, STATUS_ACTIVE)
            .unwrap();
        index.demote_from_active(block::Height(3), hash).unwrap();
        assert_eq!(index.tip().unwrap(), None);
        assert_eq!(index.status(hash).unwrap(), Some(STATUS_SIDECHAIN));
    }

    #[test]
    fn transactions_are_looked_up_by_their_containing_block() {
        let index = Index::new(&ephemeral_db()).unwrap();
        let block_hash = block::Hash([5u8; 32]);
        let tx_hash = transaction::Hash([6u8; 32]);
        index
            .record_transactions(block_hash, [tx_hash])
            .unwrap();
        assert_eq!(
            index.block_for_transaction(tx_hash).unwrap(),
            Some(block_hash)
        );
        assert_eq!(
            index.block_for_transaction(transaction::Hash([7u8; 32])).unwrap(),
            None
        );
    }

    #[test]
    fn locator_gallops_back_from_the_tip() {
        let index = Index::new(&ephemeral_db()).unwrap();
        for height in 0..25u32 {
            let mut hash_bytes = [0u8; 32];
            hash_bytes[0..4].copy_from_slice(&height.to_be_bytes());
            let hash = block::Hash(hash_bytes);
            let location = BlockLocation {
                file_num: 0,
                offset: height as u64 * 100,
                length: 100,
            };
            index
                .commit_block(block::Height(height), hash, location, STATUS_ACTIVE)
                .unwrap();
        }
        let locator = index.block_locator().unwrap();
        assert!(!locator.is_empty());
        assert_eq!(locator[0], index.hash_for_height(block::Height(24)).unwrap().unwrap());
        assert_eq!(*locator.last().unwrap(), index.hash_for_height(block::Height(0)).unwrap().unwrap());
    }
}
