use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use chain::parameters::Network;

/// On-disk layout configuration for the [`crate::State`].
///
/// Mirrors the way the reference node lays out its data directory: a
/// `blocks/` subdirectory holding the flat `blk*.dat` files and a `db/`
/// subdirectory holding the sled database for the height/hash index and
/// UTXO set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// The root data directory. Defaults to the platform cache dir under
    /// a `scryptd` subdirectory.
    pub cache_dir: PathBuf,

    /// Whether to open sled in-memory rather than persisting to disk.
    /// Used by tests.
    pub ephemeral: bool,
}

impl Config {
    pub fn block_dir(&self) -> PathBuf {
        self.network_dir().join("blocks")
    }

    pub fn sled_dir(&self) -> PathBuf {
        self.network_dir().join("db")
    }

    fn network_dir(&self) -> PathBuf {
        self.cache_dir.join(Network::default().to_string())
    }

    pub(crate) fn open_sled(&self) -> Result<sled::Db, sled::Error> {
        if self.ephemeral {
            sled::Config::new().temporary(true).open()
        } else {
            std::fs::create_dir_all(self.sled_dir()).map_err(sled::Error::Io)?;
            sled::open(self.sled_dir())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scryptd");
        Self {
            cache_dir,
            ephemeral: false,
        }
    }
}
