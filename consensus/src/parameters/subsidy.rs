//! Block subsidy constants.

use chain::{amount::COIN, block::Height};

/// The block subsidy before the first halving.
pub const MAX_BLOCK_SUBSIDY: u64 = 50 * COIN;

/// Number of blocks between each subsidy halving.
pub const HALVING_INTERVAL: Height = Height(210_000);
