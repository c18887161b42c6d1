//! Base58Check P2PKH addresses.

use std::{fmt, io};

use secp256k1::PublicKey;

use crate::{
    hashing::hash160,
    parameters::Network,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// Version bytes identifying which network a P2PKH address belongs to.
mod magics {
    pub const MAINNET: [u8; 1] = [0x00];
    pub const TESTNET: [u8; 1] = [0x6f];
}

/// A pay-to-public-key-hash address: a single version byte identifying the
/// network, followed by the 20-byte hash160 of a public key, Base58Check
/// encoded.
///
/// <https://en.bitcoin.it/wiki/Base58Check_encoding>
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Address {
    pub network: Network,
    pub pub_key_hash: [u8; 20],
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Address")
            .field("network", &self.network)
            .field("pub_key_hash", &hex::encode(self.pub_key_hash))
            .finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.bitcoin_serialize(&mut bytes);
        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| SerializationError::Parse("address checksum/base58 decoding error"))?;
        Self::bitcoin_deserialize(&bytes[..])
    }
}

impl BitcoinSerialize for Address {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self.network {
            Network::Mainnet => writer.write_all(&magics::MAINNET[..])?,
            Network::Testnet => writer.write_all(&magics::TESTNET[..])?,
        }
        writer.write_all(&self.pub_key_hash)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Address {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0; 1];
        reader.read_exact(&mut version_bytes)?;

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;

        let network = match version_bytes {
            magics::MAINNET => Network::Mainnet,
            magics::TESTNET => Network::Testnet,
            _ => return Err(SerializationError::Parse("bad address version byte")),
        };
        Ok(Address {
            network,
            pub_key_hash: hash_bytes,
        })
    }
}

impl Address {
    pub fn from_public_key(public_key: &PublicKey, network: Network) -> Address {
        Address {
            network,
            pub_key_hash: hash160(&public_key.serialize()[..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_mainnet() {
        let pub_key = PublicKey::from_slice(&[
            2, 80, 134, 58, 214, 74, 135, 174, 138, 47, 232, 60, 26, 241, 168, 64, 60, 181, 63,
            83, 228, 134, 216, 81, 29, 173, 138, 4, 136, 126, 91, 35, 82,
        ])
        .expect("a valid compressed public key");

        let addr = Address::from_public_key(&pub_key, Network::Mainnet);
        let back: Address = format!("{}", addr).parse().unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn roundtrips_through_display_and_fromstr() {
        let addr = Address {
            network: Network::Testnet,
            pub_key_hash: [9u8; 20],
        };
        let s = format!("{}", addr);
        let back: Address = s.parse().unwrap();
        assert_eq!(addr, back);
    }
}
