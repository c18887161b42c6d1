use std::io;

use serde::{Deserialize, Serialize};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A block's position in the chain, counted up from the genesis block at
/// height zero.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Height(pub u32);

impl std::fmt::Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BitcoinSerialize for Height {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for Height {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::bitcoin_deserialize(reader)?))
    }
}
