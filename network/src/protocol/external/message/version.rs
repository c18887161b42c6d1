use std::net::SocketAddr;

use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use chrono::{TimeZone, Utc};

use chain::block;

use super::super::types::{Nonce, PeerServices, ProtocolVersion};

/// A `version` message: the handshake's `ClientHello` analogue.
#[derive(Clone, PartialEq, Eq, Debug, BtcSerialize, BtcDeserialize)]
pub struct Version {
    /// The protocol version supported by the sender.
    pub version: ProtocolVersion,
    /// Services advertised by the sender.
    pub services: PeerServices,
    /// When the message was sent.
    pub timestamp: chrono::DateTime<Utc>,
    /// The address of the node receiving this message, and its advertised
    /// services (as known to the sender).
    pub address_recv: (PeerServices, SocketAddr),
    /// The address of the node sending this message, and its own
    /// advertised services.
    pub address_from: (PeerServices, SocketAddr),
    /// Detects self-connections.
    pub nonce: Nonce,
    /// The sender's user agent string.
    pub user_agent: String,
    /// The sender's current chain tip height.
    pub start_height: block::Height,
    /// Whether the receiver should announce relayed transactions.
    pub relay: bool,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: ProtocolVersion,
        their_addr: SocketAddr,
        their_services: PeerServices,
        our_services: PeerServices,
        our_addr: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        start_height: block::Height,
        relay: bool,
    ) -> Version {
        // Truncate to the nearest 5 minutes, to stay within the range most
        // peers tolerate for clock skew.
        let now = Utc::now().timestamp();
        let timestamp = Utc.timestamp(now - now.rem_euclid(5 * 60), 0);
        Version {
            version,
            services: our_services,
            timestamp,
            address_recv: (their_services, their_addr),
            address_from: (our_services, our_addr),
            nonce,
            user_agent,
            start_height,
            relay,
        }
    }
}
