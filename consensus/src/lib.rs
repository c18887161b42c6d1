//! Full consensus validation: proof-of-work, difficulty retargeting,
//! block structure, subsidy, and transaction checks.

pub mod block;
pub mod error;
pub mod parameters;
pub mod transaction;
pub mod work;

pub use error::ConsensusError;
