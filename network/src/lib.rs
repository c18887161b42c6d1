//! The peer-to-peer networking stack: wire framing, the per-connection
//! handshake, and the manager that drives peer selection, propagation,
//! and the supervisory maintenance loops.

pub mod constants;
pub mod manager;
pub mod meta_addr;
pub mod peer;
pub mod protocol;

pub use manager::Manager;
pub use meta_addr::MetaAddr;
pub use peer::{PeerInfo, PeerSnapshot, PeerState};
