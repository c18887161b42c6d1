//! The hardcoded genesis block.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lazy_static::lazy_static;

use crate::{
    amount::Amount,
    block::{self, Block, Header},
    parameters::Network,
    transaction::{LockTime, Transaction},
    transparent::{self, CoinbaseData, Output, Script},
    work::CompactDifficulty,
};

/// The previous block hash for the genesis block: Bitcoin's conventional
/// all-zero "null" parent.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

const GENESIS_MESSAGE: &[u8] =
    b"iCSI_COIN is a wholly owned Subsidiary of BeckCoin. Trademark: Beckmeister Industries.";

fn build_genesis_block() -> Block {
    let coinbase_tx = Arc::new(Transaction::new(
        1,
        vec![transparent::Input::Coinbase {
            height: None,
            data: CoinbaseData::new(GENESIS_MESSAGE.to_vec()),
            sequence: 0xffff_ffff,
        }],
        vec![Output {
            value: Amount::from_u64(50 * crate::amount::COIN),
            lock_script: Script(vec![0u8; 25]),
        }],
        LockTime::unlocked(),
    ));
    let merkle_root = coinbase_tx.hash();

    let header = Header::new(
        1,
        GENESIS_PREVIOUS_BLOCK_HASH,
        block::Hash(merkle_root.0),
        Utc.timestamp(1_231_006_505, 0),
        CompactDifficulty(0x1f09_9996),
        2_083_236_893,
    );

    Block {
        header,
        transactions: vec![coinbase_tx],
    }
}

lazy_static! {
    static ref GENESIS_BLOCK: Block = build_genesis_block();
}

/// The network's single genesis block. Mainnet and testnet currently share
/// the same genesis parameters; they're distinguished by magic bytes and
/// default port instead.
pub fn genesis_block(_network: Network) -> Block {
    GENESIS_BLOCK.clone()
}

/// The hash of the genesis block.
pub fn genesis_hash(network: Network) -> block::Hash {
    genesis_block(network).hash()
}
