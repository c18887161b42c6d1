//! Mapping from this node's internal errors to JSON-RPC error objects.

use jsonrpc_core::{Error, ErrorCode};

use miner::MinerError;
use node::ChainError;

/// Turns a caller-facing failure into a JSON-RPC error response. Consensus
/// and resource errors are never swallowed: every branch here carries the
/// underlying reason into the `message` field, per spec.md §7's "never
/// swallowed silently" rule for those two categories.
pub fn chain_error(err: ChainError) -> Error {
    Error {
        code: ErrorCode::ServerError(-32000),
        message: err.to_string(),
        data: None,
    }
}

pub fn miner_error(err: MinerError) -> Error {
    Error {
        code: ErrorCode::ServerError(-32002),
        message: err.to_string(),
        data: None,
    }
}

pub fn invalid_params(message: impl Into<String>) -> Error {
    Error {
        code: ErrorCode::InvalidParams,
        message: message.into(),
        data: None,
    }
}

pub fn internal(message: impl Into<String>) -> Error {
    Error {
        code: ErrorCode::ServerError(-32001),
        message: message.into(),
        data: None,
    }
}
