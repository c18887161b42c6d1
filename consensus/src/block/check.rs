//! Structural and consensus checks on a full block.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use chain::block::{Block, Hash};

use crate::{block::subsidy::general::block_subsidy, work::meets_difficulty_target, ConsensusError};

/// Check that the coinbase transaction is first and the only one, per the
/// structural guarantee `Block::deserialize_from_buf` already enforces at
/// parse time. Re-checked here for blocks built in-process (e.g. by the
/// miner) rather than deserialized off the wire.
pub fn coinbase_is_first(block: &Block) -> Result<(), ConsensusError> {
    let hash = block.hash();
    let first = block
        .transactions
        .get(0)
        .ok_or(ConsensusError::EmptyBlock(hash))?;
    if !first.is_coinbase() {
        return Err(ConsensusError::MissingCoinbase(hash));
    }
    if block.transactions[1..]
        .iter()
        .any(|tx| tx.contains_coinbase_input())
    {
        return Err(ConsensusError::DuplicateCoinbase(hash));
    }
    Ok(())
}

/// Check that the header's scrypt proof-of-work hash meets its own declared
/// target.
pub fn proof_of_work_is_valid(block: &Block) -> Result<(), ConsensusError> {
    if meets_difficulty_target(&block.header) {
        Ok(())
    } else {
        Err(ConsensusError::InvalidProofOfWork(block.hash()))
    }
}

/// Check that the coinbase transaction's total output value does not exceed
/// the subsidy due at `height` plus the fees collected from the rest of the
/// block (`total_fees`).
pub fn subsidy_is_valid(
    block: &Block,
    height: chain::block::Height,
    total_fees: chain::amount::Amount,
) -> Result<(), ConsensusError> {
    let coinbase = &block.transactions[0];
    let claimed: u64 = coinbase.outputs.iter().map(|o| o.value.base_units()).sum();
    let allowed = block_subsidy(height)
        .checked_add(total_fees)
        .unwrap_or_else(|_| chain::amount::Amount::from_u64(u64::MAX));
    if claimed > allowed.base_units() {
        return Err(ConsensusError::InvalidSubsidy(
            block.hash(),
            claimed,
            allowed.base_units(),
        ));
    }
    Ok(())
}

/// Check `header.time` is no more than two hours ahead of `now`.
pub fn time_is_valid_at(block: &Block, now: DateTime<Utc>) -> Result<(), ConsensusError> {
    block.header.time_is_valid_at(now).map_err(Into::into)
}

/// Recompute the block's transaction Merkle root and compare it to the one
/// claimed in the header; also reject duplicate transaction hashes
/// (CVE-2012-2459) even when they happen to merkle-ize to the same root.
pub fn merkle_root_validity(block: &Block) -> Result<(), ConsensusError> {
    let hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
    let actual: Hash = hashes.iter().cloned().collect::<chain::block::merkle::Root>().into();
    if actual != block.header.merkle_root {
        return Err(ConsensusError::BadMerkleRoot(block.hash()));
    }
    if hashes.len() != hashes.iter().collect::<HashSet<_>>().len() {
        return Err(ConsensusError::DuplicateTransaction(block.hash()));
    }
    Ok(())
}

/// Run every context-free structural and consensus check on `block`. Checks
/// that require chain context (previous block's header, cumulative work,
/// UTXO availability) are left to the caller.
pub fn check_block(
    block: &Block,
    height: chain::block::Height,
    total_fees: chain::amount::Amount,
    now: DateTime<Utc>,
) -> Result<(), ConsensusError> {
    coinbase_is_first(block)?;
    merkle_root_validity(block)?;
    proof_of_work_is_valid(block)?;
    time_is_valid_at(block, now)?;
    subsidy_is_valid(block, height, total_fees)?;
    Ok(())
}
