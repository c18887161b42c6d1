//! The trimmed message set the peer protocol actually speaks: enough to
//! handshake, gossip addresses, announce and fetch inventory, and move
//! blocks and transactions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use chain::{block, transaction::Transaction};

use super::command::Command;
use super::inv::InventoryHash;
use super::types::Nonce;
use crate::meta_addr::MetaAddr;

mod version;
pub use version::Version;

/// A message on the peer wire.
///
/// `Version`/`Verack`/`Ping`/`Pong`/`GetAddr`/`Addr` use the handshake and
/// gossip binary layouts; `Inv`/`GetData`/`GetBlocks`/`Block`/`Tx`/`Reject`
/// carry a JSON object payload instead, per the hybrid codec.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Version(Version),
    Verack,
    Ping(Nonce),
    Pong(Nonce),
    GetAddr,
    Addr(Vec<MetaAddr>),
    GetBlocks {
        /// Block locator hashes, newest to oldest.
        locator: Vec<block::Hash>,
        /// Stop at this hash, if given.
        stop: Option<block::Hash>,
    },
    Inv(Vec<InventoryHash>),
    GetData(Vec<InventoryHash>),
    Block(Arc<block::Block>),
    Tx(Arc<Transaction>),
    Reject {
        message: String,
        reason: String,
    },
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping(_) => Command::Ping,
            Message::Pong(_) => Command::Pong,
            Message::GetAddr => Command::GetAddr,
            Message::Addr(_) => Command::Addr,
            Message::GetBlocks { .. } => Command::GetBlocks,
            Message::Inv(_) => Command::Inv,
            Message::GetData(_) => Command::GetData,
            Message::Block(_) => Command::Block,
            Message::Tx(_) => Command::Tx,
            Message::Reject { .. } => Command::Reject,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::GetBlocks { .. } => "getblocks",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::Reject { .. } => "reject",
        })
    }
}

/// The JSON envelope shared by every non-binary command. `type` mirrors
/// the command name so the payload is self-describing even if it were
/// ever logged or inspected independent of the frame header.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum JsonPayload {
    Inv { items: Vec<InventoryHash> },
    GetData { items: Vec<InventoryHash> },
    GetBlocks { locator: Vec<String>, stop: Option<String> },
    Block { payload: String },
    Tx { payload: String },
    Reject { message: String, reason: String },
}
