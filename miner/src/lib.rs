//! The work service (`spec.md` §4.7): assembles block templates for
//! miners, builds the coinbase that pays a requested address, and accepts
//! solved blocks back into the chain.

mod template;

pub use template::{build_template, compute_next_bits, submit_block, BlockTemplate, MinerError};
