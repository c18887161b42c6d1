//! Newtype wrappers for primitive wire values shared across messages.

use std::io::{self, Read, Write};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The network magic bytes that begin every frame.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Magic(pub [u8; 4]);

/// A protocol version number, as sent in a `version` message and used to
/// gate version-dependent decoding.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u32);

impl BitcoinSerialize for ProtocolVersion {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for ProtocolVersion {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::bitcoin_deserialize(&mut reader)?))
    }
}

/// A nonce used to identify `version`/`ping`/`pong` messages and to
/// detect self-connections.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Nonce(pub u64);

impl BitcoinSerialize for Nonce {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Nonce {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::bitcoin_deserialize(&mut reader)?))
    }
}

impl Nonce {
    /// A fresh, randomly generated nonce.
    pub fn random() -> Nonce {
        Nonce(rand::random())
    }
}

bitflags! {
    /// Flags advertising the services a peer supports, carried in
    /// `version` and `addr` payloads.
    #[derive(Serialize, Deserialize)]
    pub struct PeerServices: u64 {
        /// The peer can serve the full block chain.
        const NODE_NETWORK = 0x1;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.bits().bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(PeerServices::from_bits_truncate(u64::bitcoin_deserialize(
            &mut reader,
        )?))
    }
}
