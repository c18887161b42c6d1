//! Inventory items for the peer protocol's `inv`/`getdata` families.
//!
//! Per the hybrid wire scheme, these travel inside a JSON payload rather
//! than a raw binary vector, so they round-trip through `serde` with
//! hashes written in the conventional byte-reversed hex form rather than
//! a length-prefixed byte array.

use serde::{Deserialize, Serialize};

use chain::{block, transaction};

/// A typed hash referring to some advertised or requested piece of data.
///
/// Bitcoin calls this an "inventory vector", but it's just a typed hash,
/// not a container, so we avoid that term to dodge confusion with `Vec<T>`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    Tx(transaction::Hash),
    Block(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(tx: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(tx)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

/// The JSON shape of an [`InventoryHash`]: `{"kind": "tx"|"block", "hash": "<hex>"}`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum InventoryHashJson {
    Tx { hash: String },
    Block { hash: String },
}

impl Serialize for InventoryHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let json = match self {
            InventoryHash::Tx(hash) => InventoryHashJson::Tx {
                hash: hash.to_string(),
            },
            InventoryHash::Block(hash) => InventoryHashJson::Block {
                hash: hash.to_string(),
            },
        };
        json.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InventoryHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        match InventoryHashJson::deserialize(deserializer)? {
            InventoryHashJson::Tx { hash } => hash
                .parse()
                .map(InventoryHash::Tx)
                .map_err(|_| D::Error::custom("invalid tx hash hex")),
            InventoryHashJson::Block { hash } => hash
                .parse()
                .map(InventoryHash::Block)
                .map_err(|_| D::Error::custom("invalid block hash hex")),
        }
    }
}
