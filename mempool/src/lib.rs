//! The unconfirmed transaction pool.
//!
//! Holds transactions that have passed standalone validation and whose
//! inputs do not conflict with each other or with the confirmed UTXO set,
//! pending inclusion in a block. Zero-conf chaining is supported: a
//! transaction may spend an output created by another transaction that is
//! itself still only in the mempool.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use chain::{
    transaction::{self, Transaction},
    transparent::OutPoint,
    BitcoinDeserializeInto, BitcoinSerialize,
};
use state::{Utxo, UtxoStore};

#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("transaction {0:?} is already in the mempool")]
    AlreadyKnown(transaction::Hash),
    #[error("transaction conflicts with an input already spent in the mempool")]
    Conflict,
    #[error("transaction spends an output that is neither confirmed nor in the mempool")]
    MissingInput,
    #[error("a spent coinbase output has not yet reached maturity")]
    CoinbaseImmature,
    #[error(transparent)]
    State(#[from] state::StateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The unconfirmed transaction pool, indexed by transaction hash.
pub struct Mempool {
    snapshot_path: PathBuf,
    transactions: HashMap<transaction::Hash, Arc<Transaction>>,
    /// Every outpoint currently spent by a mempool transaction, so a
    /// second spend of the same output can be rejected before it is
    /// admitted.
    spent_by: HashMap<OutPoint, transaction::Hash>,
}

impl Mempool {
    /// Open a mempool backed by a hex-list snapshot file at `snapshot_path`,
    /// loading any transactions already recorded there. Lines that fail to
    /// decode are skipped with a warning, per the rest of the node's
    /// tolerant-startup policy.
    pub fn load(snapshot_path: impl AsRef<Path>) -> Result<Self, MempoolError> {
        let snapshot_path = snapshot_path.as_ref().to_owned();
        let mut mempool = Mempool {
            snapshot_path,
            transactions: HashMap::new(),
            spent_by: HashMap::new(),
        };

        let contents = match std::fs::read_to_string(&mempool.snapshot_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(mempool),
            Err(err) => return Err(err.into()),
        };

        for line in contents.lines().filter(|line| !line.is_empty()) {
            match decode_transaction(line) {
                Ok(tx) => {
                    let hash = tx.hash();
                    for input in &tx.inputs {
                        if let chain::transparent::Input::PrevOut { outpoint, .. } = input {
                            mempool.spent_by.insert(*outpoint, hash);
                        }
                    }
                    mempool.transactions.insert(hash, Arc::new(tx));
                }
                Err(err) => warn!(%err, "skipping undecodable mempool snapshot entry"),
            }
        }

        Ok(mempool)
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<Arc<Transaction>> {
        self.transactions.get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Arc<Transaction>> {
        self.transactions.values()
    }

    /// Look up an output a mempool transaction spends, whether it is a
    /// confirmed UTXO or one created by another still-unconfirmed mempool
    /// transaction (zero-conf chaining). A confirmed coinbase output that
    /// has not yet reached maturity at `tip_height` is rejected rather than
    /// treated as spendable.
    fn resolve_input(
        &self,
        outpoint: &OutPoint,
        utxos: &UtxoStore,
        tip_height: chain::block::Height,
    ) -> Result<bool, MempoolError> {
        if let Some(utxo) = utxos.get(outpoint)? {
            if utxo.is_coinbase
                && consensus::transaction::check::coinbase_spend_is_mature(
                    chain::block::Height(utxo.height),
                    chain::block::Height(tip_height.0 + 1),
                )
                .is_err()
            {
                return Err(MempoolError::CoinbaseImmature);
            }
            return Ok(true);
        }
        if let Some(tx) = self.transactions.get(&outpoint.hash) {
            return Ok(tx.outputs.len() > outpoint.index as usize);
        }
        Ok(false)
    }

    /// Admit `tx` to the mempool: reject if already present, reject on
    /// input conflict with another mempool transaction, and reject if any
    /// input is unresolvable (or, for a confirmed coinbase, still immature)
    /// against the confirmed UTXO set plus the mempool itself. `tip_height`
    /// is the current active-chain tip, used for coinbase maturity checks
    /// against the height the admitted transaction would actually spend at.
    /// On success, persists the updated snapshot to disk.
    pub fn admit(
        &mut self,
        tx: Transaction,
        utxos: &UtxoStore,
        tip_height: chain::block::Height,
    ) -> Result<transaction::Hash, MempoolError> {
        let hash = tx.hash();
        if self.transactions.contains_key(&hash) {
            return Err(MempoolError::AlreadyKnown(hash));
        }

        let mut spent = Vec::new();
        for input in &tx.inputs {
            if let chain::transparent::Input::PrevOut { outpoint, .. } = input {
                if self.spent_by.contains_key(outpoint) {
                    return Err(MempoolError::Conflict);
                }
                if !self.resolve_input(outpoint, utxos, tip_height)? {
                    return Err(MempoolError::MissingInput);
                }
                spent.push(*outpoint);
            }
        }

        for outpoint in spent {
            self.spent_by.insert(outpoint, hash);
        }
        self.transactions.insert(hash, Arc::new(tx));
        self.persist()?;
        Ok(hash)
    }

    /// Remove `hash` from the mempool, if present, and persist the
    /// resulting snapshot.
    pub fn evict(&mut self, hash: &transaction::Hash) -> Result<(), MempoolError> {
        if let Some(tx) = self.transactions.remove(hash) {
            self.spent_by.retain(|_, spender| spender != hash);
            let _ = tx;
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), MempoolError> {
        let file = std::fs::File::create(&self.snapshot_path)?;
        let mut writer = BufWriter::new(file);
        for tx in self.transactions.values() {
            let bytes = tx
                .bitcoin_serialize_to_vec()
                .expect("in-memory serialization is infallible");
            writeln!(writer, "{}", hex::encode(bytes))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn decode_transaction(hex_line: &str) -> Result<Transaction, Box<dyn std::error::Error>> {
    let bytes = hex::decode(hex_line.trim())?;
    Ok(bytes.as_slice().bitcoin_deserialize_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::{amount::Amount, transaction::LockTime, transparent::{CoinbaseData, Input, Output, Script}};

    fn ephemeral_utxos() -> (sled::Db, UtxoStore) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let utxos = UtxoStore::new(&db).unwrap();
        (db, utxos)
    }

    fn coinbase_like_tx(nonce: u8) -> Transaction {
        Transaction::new(
            1,
            vec![Input::Coinbase {
                height: None,
                data: CoinbaseData::new(vec![nonce]),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(100),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        )
    }

    #[test]
    fn fresh_mempool_loads_empty_when_snapshot_missing() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let mempool = Mempool::load(dir.path().join("mempool.dat")).unwrap();
        assert!(mempool.is_empty());
    }

    #[test]
    fn admitting_the_same_transaction_twice_is_rejected() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let (_db, utxos) = ephemeral_utxos();
        let mut mempool = Mempool::load(dir.path().join("mempool.dat")).unwrap();

        let funding = Utxo {
            output: Output {
                value: Amount::from_u64(500),
                lock_script: Script(vec![0u8; 25]),
            },
            height: 1,
            is_coinbase: false,
        };
        let funding_outpoint = OutPoint {
            hash: transaction::Hash([1u8; 32]),
            index: 0,
        };
        utxos.insert(funding_outpoint, &funding).unwrap();

        let spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: funding_outpoint,
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(400),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        );

        mempool.admit(spend.clone(), &utxos, chain::block::Height(10)).unwrap();
        assert_eq!(
            mempool
                .admit(spend, &utxos, chain::block::Height(10))
                .unwrap_err()
                .to_string()
                .contains("already"),
            true
        );
    }

    #[test]
    fn admitting_a_tx_with_an_unknown_input_is_rejected() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let (_db, utxos) = ephemeral_utxos();
        let mut mempool = Mempool::load(dir.path().join("mempool.dat")).unwrap();

        let spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: transaction::Hash([9u8; 32]),
                    index: 0,
                },
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(1),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        );

        assert!(matches!(
            mempool.admit(spend, &utxos, chain::block::Height(10)),
            Err(MempoolError::MissingInput)
        ));
    }

    #[test]
    fn evicting_an_admitted_tx_persists_the_removal() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let (_db, utxos) = ephemeral_utxos();
        let snapshot_path = dir.path().join("mempool.dat");
        let mut mempool = Mempool::load(&snapshot_path).unwrap();

        let funding = Utxo {
            output: Output {
                value: Amount::from_u64(500),
                lock_script: Script(vec![0u8; 25]),
            },
            height: 1,
            is_coinbase: false,
        };
        let funding_outpoint = OutPoint {
            hash: transaction::Hash([2u8; 32]),
            index: 0,
        };
        utxos.insert(funding_outpoint, &funding).unwrap();

        let spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: funding_outpoint,
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(400),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        );
        let hash = mempool.admit(spend, &utxos, chain::block::Height(10)).unwrap();
        mempool.evict(&hash).unwrap();
        assert!(!mempool.contains(&hash));

        let reloaded = Mempool::load(&snapshot_path).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn zero_conf_chaining_resolves_against_a_mempool_output() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let (_db, utxos) = ephemeral_utxos();
        let mut mempool = Mempool::load(dir.path().join("mempool.dat")).unwrap();

        let parent = coinbase_like_tx(1);
        let parent_hash = parent.hash();
        mempool.transactions.insert(parent_hash, Arc::new(parent));

        let child = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: parent_hash,
                    index: 0,
                },
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(50),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        );

        mempool.admit(child, &utxos, chain::block::Height(10)).unwrap();
    }

    #[test]
    fn spending_an_immature_coinbase_is_rejected_until_it_matures() {
        let dir = tempdir::TempDir::new("mempool").unwrap();
        let (_db, utxos) = ephemeral_utxos();
        let mut mempool = Mempool::load(dir.path().join("mempool.dat")).unwrap();

        let coinbase = Utxo {
            output: Output {
                value: Amount::from_u64(50 * 100_000_000),
                lock_script: Script(vec![0u8; 25]),
            },
            height: 1,
            is_coinbase: true,
        };
        let coinbase_outpoint = OutPoint {
            hash: transaction::Hash([3u8; 32]),
            index: 0,
        };
        utxos.insert(coinbase_outpoint, &coinbase).unwrap();

        let spend = Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: coinbase_outpoint,
                unlock_script: Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: Amount::from_u64(1),
                lock_script: Script(vec![0u8; 25]),
            }],
            LockTime::unlocked(),
        );

        assert!(matches!(
            mempool.admit(spend.clone(), &utxos, chain::block::Height(1)),
            Err(MempoolError::CoinbaseImmature)
        ));
        mempool
            .admit(spend, &utxos, chain::block::Height(100))
            .unwrap();
    }
}
