use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use chain::{
    amount::Amount,
    block::{self, Block, Height},
    parameters::{genesis, Network},
    transparent::{Input, OutPoint},
};
use consensus::ConsensusError;
use mempool::Mempool;
use state::{State, Utxo, STATUS_ACTIVE, STATUS_SIDECHAIN};

/// Cap on the number of blocks held in the orphan pool, keyed by the
/// parent hash they are waiting on.
const MAX_ORPHANS: usize = 500;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)]
    State(#[from] state::StateError),
    #[error(transparent)]
    Mempool(#[from] mempool::MempoolError),
    #[error("referenced previous output was not found")]
    MissingInput,
    #[error("block spends a coinbase output before it has matured")]
    ImmatureCoinbaseSpend,
    #[error("a reorg's Connect step failed and could not be rolled back: {0}")]
    ReorgIrrecoverable(ConsensusError),
    #[error("the chain state is marked inconsistent; refusing further writes until an integrity scan completes")]
    IntegrityDirty,
}

/// The outcome of [`Chain::ingest`].
#[derive(Debug)]
pub enum IngestResult {
    /// The block's hash was already indexed; nothing was done.
    AlreadyKnown,
    /// The block failed context-free or context-dependent validation, and
    /// was not stored.
    Invalid(String),
    /// The block's parent is not yet known; it was queued in the orphan
    /// pool.
    Orphan,
    /// The block extended the active chain to `height`.
    ExtendedMain { height: Height },
    /// The block was stored on a sidechain, not (yet) the active tip.
    SideStored { height: Height },
    /// A reorg moved the active tip to this block.
    Reorganized { height: Height },
}

/// A block discovered where the whole chain is wrong: where `divergence`
/// is the first byte offset at which the 80-byte on-disk header does not
/// match a fresh `double_sha256`.
#[derive(Debug, PartialEq, Eq)]
pub enum IntegrityReport {
    Ok,
    Corrupt { hash: block::Hash, height: Height },
}

/// The chain manager. Owns every piece of state a block ingestion needs
/// to mutate: the block store / index / UTXO set, the mempool, and the
/// in-memory orphan pool. Callers are expected to hold this behind a
/// single exclusive lock for the duration of [`Chain::ingest`], per the
/// node's mutation discipline: no reader ever observes a partially
/// applied block.
pub struct Chain {
    state: State,
    mempool: Mempool,
    orphans: HashMap<block::Hash, Vec<Block>>,
    network: Network,
    integrity_dirty: bool,
}

impl Chain {
    pub fn open(config: &state::Config, mempool_path: impl AsRef<std::path::Path>, network: Network) -> Result<Self, ChainError> {
        let mut state = State::new(config)?;
        let mempool = Mempool::load(mempool_path)?;

        if state.index.tip()?.is_none() {
            let genesis = genesis::genesis_block(network);
            info!(hash = %genesis.hash(), "bootstrapping genesis block");
            state.store_block(&genesis, Height(0), STATUS_ACTIVE)?;
        }

        Ok(Chain {
            state,
            mempool,
            orphans: HashMap::new(),
            network,
            integrity_dirty: false,
        })
    }

    pub fn tip_height(&self) -> Result<Height, ChainError> {
        Ok(self
            .state
            .index
            .tip()?
            .map(|(height, _)| height)
            .expect("genesis is always bootstrapped"))
    }

    pub fn tip_hash(&self) -> Result<block::Hash, ChainError> {
        Ok(self
            .state
            .index
            .tip()?
            .map(|(_, hash)| hash)
            .expect("genesis is always bootstrapped"))
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn mempool_mut(&mut self) -> &mut Mempool {
        &mut self.mempool
    }

    /// Admit `tx` to the mempool against the current UTXO view and tip
    /// height. A combined entry point over `mempool_mut()`/`utxos()`,
    /// since both borrow `self` and admission needs both at once.
    pub fn admit_to_mempool(
        &mut self,
        tx: chain::transaction::Transaction,
    ) -> Result<chain::transaction::Hash, ChainError> {
        let tip_height = self.tip_height()?;
        Ok(self.mempool.admit(tx, &self.state.utxos, tip_height)?)
    }

    pub fn utxos(&self) -> &state::UtxoStore {
        &self.state.utxos
    }

    pub fn block(&self, hash: block::Hash) -> Result<Option<Block>, ChainError> {
        match self.state.index.location_for_hash(hash)? {
            Some(_) => Ok(Some(self.state.load_block(hash)?)),
            None => Ok(None),
        }
    }

    pub fn block_locator(&self) -> Result<Vec<block::Hash>, ChainError> {
        Ok(self.state.index.block_locator()?)
    }

    /// The active-main hash stored at `height`, if any. Used to answer a
    /// peer's `getblocks` by walking forward from the first common
    /// ancestor in its locator.
    pub fn hash_at_height(&self, height: Height) -> Result<Option<block::Hash>, ChainError> {
        Ok(self.state.index.hash_for_height(height)?)
    }

    /// The height a given (indexed, any status) block sits at, if known.
    pub fn height_for_hash(&self, hash: block::Hash) -> Result<Option<Height>, ChainError> {
        Ok(self.state.index.height_for_hash(hash)?)
    }

    /// Ingest a block that arrived from a peer or the miner's own
    /// submission. See `spec.md` §4.4 for the state machine this
    /// implements.
    pub fn ingest(&mut self, block: Block, now: DateTime<Utc>) -> Result<IngestResult, ChainError> {
        if self.integrity_dirty {
            return Err(ChainError::IntegrityDirty);
        }

        let hash = block.hash();
        if self.state.index.height_for_hash(hash)?.is_some() {
            return Ok(IngestResult::AlreadyKnown);
        }

        if let Err(err) = context_free_checks(&block, now) {
            return Ok(IngestResult::Invalid(err.to_string()));
        }

        let parent_hash = block.header.previous_block_hash;
        let parent_height = match self.state.index.height_for_hash(parent_hash)? {
            Some(height) => height,
            None => {
                self.queue_orphan(block);
                return Ok(IngestResult::Orphan);
            }
        };

        let new_height = Height(parent_height.0 + 1);
        let (tip_height, tip_hash) = self
            .state
            .index
            .tip()?
            .expect("genesis is always bootstrapped");

        if parent_hash == tip_hash {
            match self.connect(&block, new_height, now) {
                Ok(()) => {
                    self.resolve_orphans(hash, now)?;
                    Ok(IngestResult::ExtendedMain { height: new_height })
                }
                Err(ChainError::MissingInput) => Ok(IngestResult::Invalid(
                    "referenced previous output was not found".into(),
                )),
                Err(ChainError::ImmatureCoinbaseSpend) => Ok(IngestResult::Invalid(
                    "block spends a coinbase output before it has matured".into(),
                )),
                Err(e) => Err(e),
            }
        } else if new_height.0 <= tip_height.0 {
            self.state.store_block(&block, new_height, STATUS_SIDECHAIN)?;
            self.resolve_orphans(hash, now)?;
            Ok(IngestResult::SideStored { height: new_height })
        } else {
            self.reorg(block, new_height, now)
        }
    }

    /// Look up the UTXOs an incoming block's non-coinbase inputs spend,
    /// validate the block against them, apply its effects to the UTXO
    /// store, and persist+index it as active.
    fn connect(&mut self, block: &Block, height: Height, now: DateTime<Utc>) -> Result<(), ChainError> {
        let mut previous: Vec<Vec<Utxo>> = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let mut spent = Vec::new();
            for input in &tx.inputs {
                if let Input::PrevOut { outpoint, .. } = input {
                    let utxo = self
                        .state
                        .utxos
                        .get(outpoint)?
                        .ok_or(ChainError::MissingInput)?;
                    if consensus::transaction::check::coinbase_spend_is_mature(
                        Height(utxo.height),
                        height,
                    )
                    .is_err()
                        && utxo.is_coinbase
                    {
                        self.reject(block.hash(), "immature coinbase spend");
                        return Err(ChainError::ImmatureCoinbaseSpend);
                    }
                    spent.push(utxo);
                }
            }
            previous.push(spent);
        }

        let mut total_fees = Amount::zero();
        for (tx, spent) in block.transactions.iter().zip(&previous) {
            if tx.is_coinbase() {
                continue;
            }
            let input_total = spent.iter().try_fold(Amount::zero(), |acc, u| {
                acc.checked_add(u.output.value)
            });
            let output_total = consensus::transaction::check::output_total(&tx.outputs);
            let (input_total, output_total) = match (input_total, output_total) {
                (Ok(i), Ok(o)) => (i, o),
                _ => return Err(ChainError::MissingInput),
            };
            let fee = input_total
                .checked_sub(output_total)
                .map_err(|_| ChainError::MissingInput)?;
            total_fees = total_fees
                .checked_add(fee)
                .map_err(|_| ChainError::MissingInput)?;
        }

        consensus::block::check::check_block(block, height, total_fees, now)
            .map_err(|_| ChainError::MissingInput)?;

        for (tx, prevouts) in block.transactions.iter().zip(&previous) {
            let outputs: Vec<_> = prevouts.iter().map(|u| u.output.clone()).collect();
            consensus::transaction::check::scripts_are_valid(tx, &outputs)
                .map_err(|_| ChainError::MissingInput)?;
        }

        for tx in &block.transactions {
            let tx_hash = tx.hash();
            for input in &tx.inputs {
                if let Input::PrevOut { outpoint, .. } = input {
                    self.state.utxos.remove(outpoint)?;
                }
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint {
                    hash: tx_hash,
                    index: index as u32,
                };
                let utxo = Utxo {
                    output: output.clone(),
                    height: height.0,
                    is_coinbase: tx.is_coinbase(),
                };
                self.state.utxos.insert(outpoint, &utxo)?;
            }
        }

        match self.state.index.location_for_hash(block.hash())? {
            Some(_) => self.state.index.promote_to_active(height, block.hash())?,
            None => {
                self.state.store_block(block, height, STATUS_ACTIVE)?;
            }
        }
        self.state
            .index
            .record_transactions(block.hash(), block.transactions.iter().map(|tx| tx.hash()))?;

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                self.mempool.evict(&tx.hash())?;
            }
        }

        Ok(())
    }

    fn reject(&self, hash: block::Hash, reason: &str) {
        warn!(%hash, reason, "rejected block");
    }

    /// Reverse a previously connected block's effects on the UTXO store,
    /// restoring every spent input from its originating transaction's
    /// block, and demote it back to sidechain status.
    fn disconnect(&mut self, hash: block::Hash) -> Result<Block, ChainError> {
        let height = self
            .state
            .index
            .height_for_hash(hash)?
            .expect("disconnected block must be indexed");
        let block = self.state.load_block(hash)?;

        for tx in block.transactions.iter().rev() {
            let tx_hash = tx.hash();
            for (index, _) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint {
                    hash: tx_hash,
                    index: index as u32,
                };
                self.state.utxos.remove(&outpoint)?;
            }
            for input in &tx.inputs {
                if let Input::PrevOut { outpoint, .. } = input {
                    let source = self.locate_source_output(*outpoint)?;
                    self.state.utxos.insert(*outpoint, &source)?;
                }
            }
        }

        self.state.index.demote_from_active(height, hash)?;
        Ok(block)
    }

    /// Reconstruct the UTXO a spent `outpoint` used to be, by looking up
    /// the block that contains its creating transaction (via the
    /// transaction-hash index populated in [`Chain::connect`]) and reading
    /// the output and the block's height/coinbase-ness back out of it.
    fn locate_source_output(&self, outpoint: OutPoint) -> Result<Utxo, ChainError> {
        let source_block_hash = self
            .state
            .index
            .block_for_transaction(outpoint.hash)?
            .ok_or(ChainError::MissingInput)?;
        let source_height = self
            .state
            .index
            .height_for_hash(source_block_hash)?
            .ok_or(ChainError::MissingInput)?;
        let source_block = self.state.load_block(source_block_hash)?;
        let tx = source_block
            .transactions
            .iter()
            .find(|tx| tx.hash() == outpoint.hash)
            .ok_or(ChainError::MissingInput)?;
        let output = tx
            .outputs
            .get(outpoint.index as usize)
            .ok_or(ChainError::MissingInput)?;
        Ok(Utxo {
            output: output.clone(),
            height: source_height.0,
            is_coinbase: tx.is_coinbase(),
        })
    }

    fn reorg(&mut self, new_tip: Block, new_height: Height, now: DateTime<Utc>) -> Result<IngestResult, ChainError> {
        // Walk backward from the new tip's ancestors to find the fork
        // point: the most recent ancestor already active.
        let mut to_connect = vec![new_tip.clone()];
        let mut cursor = new_tip.header.previous_block_hash;
        let fork_point = loop {
            match self.state.index.status(cursor)? {
                Some(status) if status == STATUS_ACTIVE => break cursor,
                Some(_) => {
                    let block = self.state.load_block(cursor)?;
                    cursor = block.header.previous_block_hash;
                    to_connect.push(block);
                }
                None => return Ok(IngestResult::Orphan),
            }
        };
        to_connect.reverse();

        let (old_tip_height, old_tip_hash) = self
            .state
            .index
            .tip()?
            .expect("genesis is always bootstrapped");
        let fork_height = self
            .state
            .index
            .height_for_hash(fork_point)?
            .expect("fork point is indexed");

        let mut disconnected = Vec::new();
        let mut cursor = old_tip_hash;
        while cursor != fork_point {
            let block = self.disconnect(cursor)?;
            let prev = block.header.previous_block_hash;
            disconnected.push((cursor, block));
            cursor = prev;
        }
        let _ = old_tip_height;

        let mut height = fork_height;
        for (i, block) in to_connect.into_iter().enumerate() {
            height = Height(fork_height.0 + i as u32 + 1);
            if let Err(err) = self.connect(&block, height, now) {
                warn!(%err, "reorg connect step failed, rolling back");
                // Best-effort rollback: reconnect everything we disconnected.
                for (hash, block) in disconnected.into_iter().rev() {
                    let h = self.state.index.height_for_hash(hash)?.unwrap_or(Height(0));
                    let _ = self.connect(&block, h, now);
                }
                return Err(err);
            }
        }

        Ok(IngestResult::Reorganized { height: new_height })
    }

    fn queue_orphan(&mut self, block: Block) {
        let parent = block.header.previous_block_hash;
        let bucket = self.orphans.entry(parent).or_insert_with(Vec::new);
        bucket.push(block);
        let total: usize = self.orphans.values().map(Vec::len).sum();
        if total > MAX_ORPHANS {
            warn!(cap = MAX_ORPHANS, "orphan pool over capacity, dropping oldest entries");
            if let Some((&oldest_key, _)) = self.orphans.iter().next().map(|(k, v)| (k, v)) {
                self.orphans.remove(&oldest_key);
            }
        }
    }

    fn resolve_orphans(&mut self, parent: block::Hash, now: DateTime<Utc>) -> Result<(), ChainError> {
        let mut worklist = self.orphans.remove(&parent).unwrap_or_default();
        while let Some(orphan) = worklist.pop() {
            let hash = orphan.hash();
            match self.ingest(orphan, now)? {
                IngestResult::ExtendedMain { .. } | IngestResult::SideStored { .. } => {
                    if let Some(mut children) = self.orphans.remove(&hash) {
                        worklist.append(&mut children);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Iterate the index in `(file, offset)` order, re-reading each
    /// block's 80-byte header from disk and checking its
    /// `double_sha256` against the indexed hash. Returns the first
    /// divergence found, if any, and sets `integrity_dirty` so further
    /// ingestion is refused until the scan reports clean.
    pub fn integrity_scan(&mut self) -> Result<IntegrityReport, ChainError> {
        let mut height = Height(0);
        loop {
            let hash = match self.state.index.hash_for_height(height)? {
                Some(hash) => hash,
                None => break,
            };
            let block = self.state.load_block(hash)?;
            if block.hash() != hash {
                self.integrity_dirty = true;
                return Ok(IntegrityReport::Corrupt { hash, height });
            }
            height = Height(height.0 + 1);
        }
        self.integrity_dirty = false;
        Ok(IntegrityReport::Ok)
    }

    /// Estimate the network hashrate from the last `window` blocks'
    /// worth of headers, per `spec.md` §4.4.
    pub fn estimate_hashrate(&self, window: u32) -> Result<f64, ChainError> {
        let tip_height = self.tip_height()?;
        if tip_height.0 < window {
            return Ok(0.0);
        }
        let start_height = Height(tip_height.0 - window);
        let tip_hash = self.tip_hash()?;
        let start_hash = self
            .state
            .index
            .hash_for_height(start_height)?
            .expect("start height must be indexed");

        let tip_block = self.state.load_block(tip_hash)?;
        let start_block = self.state.load_block(start_hash)?;

        let elapsed = (tip_block.header.time - start_block.header.time).num_seconds();
        if elapsed <= 0 {
            return Ok(0.0);
        }

        let difficulty = consensus::work::relative_difficulty(tip_block.header.difficulty_threshold);
        Ok(difficulty * 2f64.powi(32) / elapsed as f64)
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

fn context_free_checks(block: &Block, now: DateTime<Utc>) -> Result<(), ConsensusError> {
    consensus::block::check::coinbase_is_first(block)?;
    consensus::block::check::merkle_root_validity(block)?;
    consensus::block::check::proof_of_work_is_valid(block)?;
    consensus::block::check::time_is_valid_at(block, now)?;
    Ok(())
}
