//! Protocol-level constants: magic bytes, version numbers, message size
//! caps, and the timing constants the peer manager runs its supervisory
//! tasks against.

use chain::parameters::Network;

use crate::protocol::external::types::{Magic, ProtocolVersion};

/// Our own protocol version.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70015);

/// The maximum size of a message payload, in bytes.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// The maximum number of addresses in a single `addr` message.
pub const MAX_ADDRS_IN_MESSAGE: usize = 1000;

/// The maximum number of hashes in a single `inv`/`getdata` payload.
pub const MAX_INV_IN_MESSAGE: usize = 500;

/// The maximum number of locator hashes before the genesis hash is
/// appended unconditionally.
pub const MAX_LOCATOR_ENTRIES: usize = 32;

/// Magic bytes distinguishing one network from another on the wire.
pub fn magic_for(network: Network) -> Magic {
    Magic(network.magic())
}

/// A node is considered to be doing initial block download (and therefore
/// only acts on its elected sync peer's inventory) while its tip is more
/// than this many blocks behind the sync peer's reported height.
pub const INITIAL_BLOCK_DOWNLOAD_LAG: u32 = 100;

/// A challenger must exceed the incumbent sync peer's height by this many
/// blocks before it is re-elected, to avoid flapping between near-equal
/// peers.
pub const SYNC_PEER_HYSTERESIS: u32 = 10;

/// Re-issue `getblocks` to the sync peer after this many connected blocks
/// since the last locator request, even without an explicit prompt.
pub const GETBLOCKS_BATCH_SIZE: u32 = 350;

/// Mempool transactions are re-announced to every peer on this interval.
pub const REBROADCAST_INTERVAL_SECS: u64 = 60;

/// `ping` is sent to every active peer on this interval.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// A peer that has not been heard from in this long is evicted.
pub const PEER_TIMEOUT_SECS: i64 = 120;

/// The stall watchdog nudges the sync peer with a fresh `getblocks` if no
/// block has connected in this long while a peer claims a higher height.
pub const STALL_NUDGE_SECS: i64 = 20;

/// The stall watchdog force-disconnects the sync peer if silence exceeds
/// this long.
pub const STALL_DISCONNECT_SECS: i64 = 45;

/// A peer that racks up three disconnects within this window is banned.
pub const BAN_WINDOW_SECS: i64 = 10;

/// Ban duration once a peer trips the disconnect-flood threshold.
pub const BAN_DURATION_SECS: i64 = 60;

/// Disconnects within [`BAN_WINDOW_SECS`] that trigger a ban.
pub const BAN_DISCONNECT_THRESHOLD: u32 = 3;

/// A root-orphan `getdata` request for the same parent is suppressed for
/// this long after the first attempt.
pub const ORPHAN_REQUEST_DEBOUNCE_SECS: i64 = 5;

/// Bounded capacity of the in-memory orphan pool, shared with
/// [`node::Chain`]'s own notion of the same cap.
pub const MAX_ORPHANS: usize = 500;
