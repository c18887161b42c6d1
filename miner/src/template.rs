//! Block template assembly and submission, per `spec.md` §4.7.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use chain::{
    amount::Amount,
    block::{self, Block, Header, Height},
    parameters::genesis::genesis_block,
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Input, OutPoint, Output},
    work::CompactDifficulty,
    Cached, SerializationError,
};
use consensus::{block::subsidy::general::block_subsidy, work::RETARGET_INTERVAL};
use node::{Chain, ChainError, IngestResult};

#[derive(Error, Debug)]
pub enum MinerError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("height {0} is not yet indexed")]
    MissingHeight(Height),
    #[error("block {0} is indexed but could not be loaded")]
    MissingBlock(block::Hash),
    #[error("submitted block is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
    #[error("submitted block did not parse: {0}")]
    BadBlock(SerializationError),
}

/// A work assignment for a miner: the header fields to hash against, plus
/// the ordered transaction list (coinbase first) that must accompany a
/// solved header on submission.
#[derive(Debug)]
pub struct BlockTemplate {
    pub version: i32,
    pub previous_block_hash: block::Hash,
    pub height: Height,
    pub curtime: DateTime<Utc>,
    pub bits: CompactDifficulty,
    /// The 256-bit target `bits` decodes to, as 64 hex digits.
    pub target: String,
    pub merkle_root: block::Hash,
    pub transactions: Vec<Arc<Transaction>>,
}

impl BlockTemplate {
    /// Assemble the (unmined) header this template describes. The miner
    /// searches over `nonce` (and, if that space is exhausted, `curtime`)
    /// until `consensus::work::meets_difficulty_target` passes.
    pub fn header(&self, nonce: u32) -> Header {
        Header::new(
            self.version as u32,
            self.previous_block_hash,
            self.merkle_root,
            self.curtime,
            self.bits,
            nonce,
        )
    }
}

/// The difficulty bits due at `next_height`, per the retarget cadence in
/// `consensus::work`: unchanged within an interval, recomputed from the
/// interval's first and last block headers every `RETARGET_INTERVAL`
/// blocks, and the network's genesis bits before the first interval
/// completes.
pub fn compute_next_bits(chain: &Chain, next_height: Height) -> Result<CompactDifficulty, MinerError> {
    if next_height.0 < RETARGET_INTERVAL {
        return Ok(genesis_block(chain.network()).header.difficulty_threshold);
    }

    let previous_height = Height(next_height.0 - 1);
    let previous_block = load_at_height(chain, previous_height)?;

    if next_height.0 % RETARGET_INTERVAL != 0 {
        return Ok(previous_block.header.difficulty_threshold);
    }

    let interval_start = load_at_height(chain, Height(next_height.0 - RETARGET_INTERVAL))?;
    Ok(consensus::work::next_difficulty(
        previous_block.header.difficulty_threshold,
        interval_start.header.time,
        previous_block.header.time,
    ))
}

fn load_at_height(chain: &Chain, height: Height) -> Result<Block, MinerError> {
    let hash = chain
        .hash_at_height(height)?
        .ok_or(MinerError::MissingHeight(height))?;
    chain.block(hash)?.ok_or(MinerError::MissingBlock(hash))
}

/// Assemble a template for the block that would extend the current tip,
/// with the coinbase paying `pay_to_hash` (a P2PKH pubkey hash).
///
/// Non-coinbase transactions are selected from the mempool in index order,
/// skipping any whose inputs conflict with a transaction already selected
/// for this template -- the mempool itself never holds two transactions
/// that conflict with each other, but a later transaction in iteration
/// order can still spend an output a not-yet-selected transaction also
/// spends if both arrived before either was evicted.
pub fn build_template(chain: &Chain, pay_to_hash: [u8; 20]) -> Result<BlockTemplate, MinerError> {
    let tip_hash = chain.tip_hash()?;
    let height = Height(chain.tip_height()?.0 + 1);
    let bits = compute_next_bits(chain, height)?;
    let target = bits.to_target().unwrap_or_default();
    let mut target_bytes = [0u8; 32];
    target.to_big_endian(&mut target_bytes);

    let (selected, fees) = select_mempool_transactions(chain);
    let subsidy = block_subsidy(height)
        .checked_add(fees)
        .unwrap_or_else(|_| block_subsidy(height));

    let coinbase = Arc::new(Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Some(Cached::from(height)),
            data: CoinbaseData::new(Vec::new()),
            sequence: 0xffff_ffff,
        }],
        vec![Output {
            value: subsidy,
            lock_script: script::p2pkh_lock_script(pay_to_hash),
        }],
        LockTime::unlocked(),
    ));

    let mut transactions = Vec::with_capacity(1 + selected.len());
    transactions.push(coinbase);
    transactions.extend(selected);

    let merkle_root: block::Hash = transactions
        .iter()
        .map(|tx| tx.hash())
        .collect::<block::merkle::Root>()
        .into();

    Ok(BlockTemplate {
        version: 1,
        previous_block_hash: tip_hash,
        height,
        curtime: Utc::now(),
        bits,
        target: hex::encode(target_bytes),
        merkle_root,
        transactions,
    })
}

/// Greedily walk the mempool, keeping every transaction whose inputs don't
/// touch an outpoint a previously-kept transaction also spends, and return
/// the kept set alongside the fees they pay.
fn select_mempool_transactions(chain: &Chain) -> (Vec<Arc<Transaction>>, Amount) {
    let mut selected = Vec::new();
    let mut spent: HashSet<OutPoint> = HashSet::new();
    let mut fees = Amount::zero();

    for tx in chain.mempool().transactions() {
        let conflicts = tx.inputs.iter().any(|input| match input {
            Input::PrevOut { outpoint, .. } => spent.contains(outpoint),
            Input::Coinbase { .. } => false,
        });
        if conflicts {
            continue;
        }

        let fee = match transaction_fee(chain, tx) {
            Some(fee) => fee,
            // A transaction whose inputs can no longer be priced (already
            // spent by a block that landed since it was admitted) is
            // stale; the next mempool sweep will evict it.
            None => continue,
        };

        for input in &tx.inputs {
            if let Input::PrevOut { outpoint, .. } = input {
                spent.insert(*outpoint);
            }
        }
        fees = fees.checked_add(fee).unwrap_or(fees);
        selected.push(tx.clone());
    }

    (selected, fees)
}

fn transaction_fee(chain: &Chain, tx: &Transaction) -> Option<Amount> {
    let mut input_total = Amount::zero();
    for input in &tx.inputs {
        if let Input::PrevOut { outpoint, .. } = input {
            let utxo = chain.utxos().get(outpoint).ok()??;
            input_total = input_total.checked_add(utxo.output.value).ok()?;
        }
    }
    let output_total = tx
        .outputs
        .iter()
        .try_fold(Amount::zero(), |acc, output| acc.checked_add(output.value))
        .ok()?;
    input_total.checked_sub(output_total).ok()
}

/// Decode a hex-encoded solved block and hand it to the chain manager.
/// Mirrors the `submitblock` RPC's job: on success, the block's
/// transactions are already evicted from the mempool by
/// `Chain::connect`.
pub fn submit_block(chain: &mut Chain, block_hex: &str) -> Result<IngestResult, MinerError> {
    let bytes = hex::decode(block_hex)?;
    let mut buf = bytes::BytesMut::from(&bytes[..]);
    let block = Block::deserialize_from_buf(&mut buf).map_err(MinerError::BadBlock)?;
    Ok(chain.ingest(block, Utc::now())?)
}
