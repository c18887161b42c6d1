use chain::block;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("block {0:?} does not meet its own proof-of-work target")]
    InvalidProofOfWork(block::Hash),
    #[error("block {0:?} bits field does not match the expected retarget value")]
    InvalidDifficulty(block::Hash),
    #[error("block time is invalid: {0}")]
    InvalidTime(#[from] block::BlockTimeError),
    #[error("block {0:?} claims coinbase subsidy {1}, which exceeds the allowed maximum {2}")]
    InvalidSubsidy(block::Hash, u64, u64),
    #[error("block {0:?} has no transactions")]
    EmptyBlock(block::Hash),
    #[error("block {0:?}'s first transaction is not a coinbase")]
    MissingCoinbase(block::Hash),
    #[error("block {0:?} contains more than one coinbase transaction")]
    DuplicateCoinbase(block::Hash),
    #[error("block {0:?} contains a duplicate transaction hash")]
    DuplicateTransaction(block::Hash),
    #[error("block {0:?}'s transactions do not merkle-ize to its header's merkle root")]
    BadMerkleRoot(block::Hash),
    #[error("block {0:?} previous-block-hash does not match the current tip")]
    NonSequentialBlock(block::Hash),
    #[error(transparent)]
    Transaction(#[from] crate::transaction::TransactionError),
}
