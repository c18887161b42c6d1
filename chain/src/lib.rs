//! Core chain data structures: serialization, hashing, amounts, blocks,
//! transactions, and the transparent (Bitcoin-style) input/output model.

pub mod amount;
pub mod block;
mod cached;
pub mod compactint;
pub mod hashing;
mod fmt;
pub mod parameters;
mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{
    sha256d, BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError,
};
