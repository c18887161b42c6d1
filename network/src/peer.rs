//! Per-connection peer state: the `Dialing -> Greeted -> Acked -> Active`
//! handshake, and the read/write halves a connected peer is driven
//! through.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};

use chain::block;

use crate::protocol::external::Message;

/// A peer connection's handshake progress.
///
/// Transitions strictly forward except into `Closed`, which is reachable
/// from any state on a protocol error or disconnect.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PeerState {
    /// The TCP connection is established but no `version` has been sent
    /// or received yet.
    Dialing,
    /// We've sent our `version` and are waiting on the peer's.
    Greeted,
    /// Both sides have exchanged `version`; waiting on `verack`.
    Acked,
    /// The handshake is complete; normal message flow proceeds.
    Active,
    /// The connection is gone or has been torn down for a protocol
    /// violation.
    Closed,
}

/// What the manager knows about a connected peer.
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub state: PeerState,
    /// The peer's self-reported chain tip height, from its `version`.
    pub height: u32,
    pub user_agent: String,
    /// Updated on every message received from this peer.
    pub last_heard: DateTime<Utc>,
    /// The last hash we requested `getblocks` against, and when, used to
    /// decide whether a fresh locator request is due.
    pub last_locator_request: DateTime<Utc>,
    pub blocks_since_locator: u32,
    /// Blocks requested via `getdata` from this peer that have not yet
    /// been delivered; used to notice when a download batch has drained
    /// and a fresh `getblocks` is due.
    pub pending_blocks: HashSet<block::Hash>,
    /// Send a message to this peer's write half.
    pub outbound: mpsc::UnboundedSender<Message>,
    /// Signaled to ask the connection's task to close, e.g. from the
    /// stall watchdog or a keepalive timeout.
    pub close: Arc<Notify>,
    /// Whether this connection was established by us (affects the
    /// handshake's initiating side, nothing else).
    pub outbound_initiated: bool,
}

/// A read-only copy of a [`PeerInfo`] entry, safe to hand out past the
/// registry lock -- used by `getpeerinfo` and by `addnode`'s "already
/// connected" check.
#[derive(Clone, Debug)]
pub struct PeerSnapshot {
    pub addr: SocketAddr,
    pub height: u32,
    pub user_agent: String,
    pub state: PeerState,
    pub outbound_initiated: bool,
    pub last_heard: DateTime<Utc>,
    pub is_sync_peer: bool,
}

impl PeerInfo {
    pub fn new(
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Message>,
        close: Arc<Notify>,
        outbound_initiated: bool,
    ) -> PeerInfo {
        let now = Utc::now();
        PeerInfo {
            addr,
            state: PeerState::Dialing,
            height: 0,
            user_agent: String::new(),
            last_heard: now,
            last_locator_request: now,
            blocks_since_locator: 0,
            pending_blocks: HashSet::new(),
            outbound,
            close,
            outbound_initiated,
        }
    }

    pub fn touch(&mut self) {
        self.last_heard = Utc::now();
    }

    pub fn send(&self, message: Message) {
        // The receive half may already be gone if the connection's write
        // task has exited; dropping the message is the right response,
        // the peer will be reaped by the next keepalive sweep.
        let _ = self.outbound.send(message);
    }
}
