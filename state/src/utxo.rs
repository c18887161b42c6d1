//! The sled-backed UTXO set: `utxo_by_outpoint`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use chain::{
    transparent::{OutPoint, Output},
    BitcoinDeserialize, BitcoinSerialize,
};

use crate::StateError;

/// An unspent output plus the metadata needed to check coinbase maturity
/// and to restore it on a Disconnect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub output: Output,
    pub height: u32,
    pub is_coinbase: bool,
}

fn encode(utxo: &Utxo) -> Result<Vec<u8>, StateError> {
    let mut bytes = Vec::new();
    bytes.write_u32::<LittleEndian>(utxo.height)?;
    bytes.write_u8(utxo.is_coinbase as u8)?;
    utxo.output.bitcoin_serialize(&mut bytes)?;
    Ok(bytes)
}

fn decode(mut bytes: &[u8]) -> Result<Utxo, StateError> {
    let height = bytes.read_u32::<LittleEndian>()?;
    let is_coinbase = bytes.read_u8()? != 0;
    let output = Output::bitcoin_deserialize(&mut bytes)?;
    Ok(Utxo {
        output,
        height,
        is_coinbase,
    })
}

pub struct UtxoStore {
    utxo_by_outpoint: sled::Tree,
}

impl UtxoStore {
    pub fn new(db: &sled::Db) -> Result<Self, StateError> {
        Ok(UtxoStore {
            utxo_by_outpoint: db.open_tree(b"utxo_by_outpoint")?,
        })
    }

    /// Record `utxo` as spendable at `outpoint`. Called once per output
    /// when its creating transaction is connected.
    pub fn insert(&self, outpoint: OutPoint, utxo: &Utxo) -> Result<(), StateError> {
        let key = outpoint.bitcoin_serialize_to_vec()?;
        self.utxo_by_outpoint.insert(key, encode(utxo)?)?;
        Ok(())
    }

    /// Look up the entry at `outpoint`, if it is still unspent.
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<Utxo>, StateError> {
        let key = outpoint.bitcoin_serialize_to_vec()?;
        match self.utxo_by_outpoint.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove the entry at `outpoint` because it has just been spent.
    /// Returns the removed entry, if any, so a Disconnect can restore it.
    pub fn remove(&self, outpoint: &OutPoint) -> Result<Option<Utxo>, StateError> {
        let key = outpoint.bitcoin_serialize_to_vec()?;
        match self.utxo_by_outpoint.remove(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, outpoint: &OutPoint) -> Result<bool, StateError> {
        let key = outpoint.bitcoin_serialize_to_vec()?;
        Ok(self.utxo_by_outpoint.contains_key(key)?)
    }

    /// Every unspent output whose lock script matches one of `scripts`,
    /// used by `getbalance`.
    pub fn matching(
        &self,
        scripts: &[chain::transparent::Script],
    ) -> Result<Vec<Utxo>, StateError> {
        let mut matches = Vec::new();
        for entry in self.utxo_by_outpoint.iter() {
            let (_, value) = entry?;
            let utxo = decode(&value)?;
            if scripts.contains(&utxo.output.lock_script) {
                matches.push(utxo);
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::{amount::Amount, transaction, transparent::Script};

    fn ephemeral_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn outpoint(index: u32) -> OutPoint {
        OutPoint {
            hash: transaction::Hash([3u8; 32]),
            index,
        }
    }

    fn utxo(value: u64) -> Utxo {
        Utxo {
            output: Output {
                value: Amount::from_u64(value),
                lock_script: Script(vec![0u8; 25]),
            },
            height: 10,
            is_coinbase: false,
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let utxos = UtxoStore::new(&ephemeral_db()).unwrap();
        let entry = utxo(5000);
        utxos.insert(outpoint(0), &entry).unwrap();
        assert_eq!(utxos.get(&outpoint(0)).unwrap(), Some(entry));
        assert!(utxos.contains(&outpoint(0)).unwrap());
    }

    #[test]
    fn remove_takes_the_utxo_out_of_the_set() {
        let utxos = UtxoStore::new(&ephemeral_db()).unwrap();
        let entry = utxo(1);
        utxos.insert(outpoint(1), &entry).unwrap();
        assert_eq!(utxos.remove(&outpoint(1)).unwrap(), Some(entry));
        assert!(!utxos.contains(&outpoint(1)).unwrap());
    }

    #[test]
    fn missing_outpoint_is_none() {
        let utxos = UtxoStore::new(&ephemeral_db()).unwrap();
        assert_eq!(utxos.get(&outpoint(9)).unwrap(), None);
    }

    #[test]
    fn matching_filters_by_lock_script() {
        let utxos = UtxoStore::new(&ephemeral_db()).unwrap();
        let mut mine = utxo(10);
        mine.output.lock_script = Script(vec![1u8; 25]);
        let mut theirs = utxo(20);
        theirs.output.lock_script = Script(vec![2u8; 25]);
        utxos.insert(outpoint(0), &mine).unwrap();
        utxos.insert(outpoint(1), &theirs).unwrap();

        let found = utxos.matching(&[Script(vec![1u8; 25])]).unwrap();
        assert_eq!(found, vec![mine]);
    }
}
