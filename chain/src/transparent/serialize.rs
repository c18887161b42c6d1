use std::io;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    block,
    cached::Cached,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

use super::{CoinbaseData, Input, OutPoint, Script};

/// The all-ones, all-ones coinbase outpoint: `hash = 0x00..00`, `index = 0xFFFFFFFF`.
const COINBASE_INDEX: u32 = 0xFFFF_FFFF;

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                writer.write_u32::<LittleEndian>(*sequence)?;
            }
            Input::Coinbase {
                data, sequence, ..
            } => {
                // Coinbase inputs reuse the outpoint encoding with an all-zero
                // hash and an all-ones index, matching every other node on
                // the network.
                crate::transaction::Hash([0; 32]).bitcoin_serialize(&mut writer)?;
                writer.write_u32::<LittleEndian>(COINBASE_INDEX)?;
                data.bitcoin_serialize(&mut writer)?;
                writer.write_u32::<LittleEndian>(*sequence)?;
            }
        }
        Ok(())
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        if outpoint.hash == crate::transaction::Hash([0; 32]) && outpoint.index == COINBASE_INDEX
        {
            let data = CoinbaseData::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            let height = coinbase_height_from_script(data.as_ref());
            Ok(Input::Coinbase {
                height: height.map(|h| Cached::from(block::Height(h))),
                data,
                sequence,
            })
        } else {
            let unlock_script = Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            })
        }
    }
}

/// Recover the BIP 34 block height pushed as the first item of the coinbase
/// script, if the data starts with a minimally-encoded little-endian push.
fn coinbase_height_from_script(data: &[u8]) -> Option<u32> {
    let push_len = *data.first()? as usize;
    if push_len == 0 || push_len > 4 {
        return None;
    }
    let bytes = data.get(1..1 + push_len)?;
    let mut buf = [0u8; 4];
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(u32::from_le_bytes(buf))
}
