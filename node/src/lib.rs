//! The chain manager: the node's single authority over chain state
//! transitions (genesis bootstrap, block ingestion, reorg, the orphan
//! pool) and the one place mutations to the block store, block index,
//! UTXO store, and mempool are serialized through.

mod chain;

pub use chain::{Chain, ChainError, IngestResult};
