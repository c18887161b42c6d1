//! Persistent chain state: append-only block storage, the height/hash
//! index, and the UTXO set.

mod blockstore;
mod config;
mod index;
mod utxo;

pub use blockstore::{BlockLocation, BlockStore};
pub use config::Config;
pub use index::{Index, STATUS_ACTIVE, STATUS_SIDECHAIN};
pub use utxo::{Utxo, UtxoStore};

use chain::BitcoinSerialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] chain::SerializationError),
    #[error("block {0:?} not found")]
    BlockNotFound(chain::block::Hash),
}

/// The full on-disk chain state: committed blocks, the height/hash index,
/// and the current UTXO set. Combines the three stores the same way the
/// reference node's `chainstate` directory does, just split across a
/// flat-file store (for bulk immutable block bytes) and two sled trees (for
/// the indices that need point lookups).
pub struct State {
    pub blocks: BlockStore,
    pub index: Index,
    pub utxos: UtxoStore,
}

impl State {
    pub fn new(config: &Config) -> Result<Self, StateError> {
        let db = config.open_sled()?;
        Ok(State {
            blocks: BlockStore::new(&config.block_dir())?,
            index: Index::new(&db)?,
            utxos: UtxoStore::new(&db)?,
        })
    }

    /// Serialize `block`, append it to the block store, and index it at
    /// `height` with the given status. Returns where it landed.
    pub fn store_block(
        &mut self,
        block: &chain::block::Block,
        height: chain::block::Height,
        status: u8,
    ) -> Result<BlockLocation, StateError> {
        let bytes = block.bitcoin_serialize_to_vec()?;
        let location = self.blocks.write_block(&bytes)?;
        self.index.commit_block(height, block.hash(), location, status)?;
        Ok(location)
    }

    /// Load a previously stored block by hash.
    pub fn load_block(&self, hash: chain::block::Hash) -> Result<chain::block::Block, StateError> {
        let location = self
            .index
            .location_for_hash(hash)?
            .ok_or(StateError::BlockNotFound(hash))?;
        let bytes = self.blocks.read_block(location)?;
        let mut buf = bytes::BytesMut::from(&bytes[..]);
        Ok(chain::block::Block::deserialize_from_buf(&mut buf)?)
    }
}
