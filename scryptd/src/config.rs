//! Node configuration: built-in defaults, an optional TOML file, and CLI
//! overrides, in that order of increasing precedence.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use chain::parameters::Network;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root data directory: block files, the sled index, and the mempool
    /// snapshot all live under here, per spec.md §6.
    pub datadir: PathBuf,

    pub testnet: bool,

    /// P2P listen address. Spec.md §6 names 9333 as the default port.
    pub listen_addr: SocketAddr,

    /// Peers to dial immediately on startup, in addition to whatever the
    /// address-gossip loop discovers.
    pub connect: Vec<SocketAddr>,

    pub rpc_listen_addr: SocketAddr,

    pub rpc_threads: usize,

    pub user_agent: String,
}

impl Config {
    pub fn network(&self) -> Network {
        if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    pub fn state_config(&self) -> state::Config {
        state::Config {
            cache_dir: self.datadir.clone(),
            ephemeral: false,
        }
    }

    pub fn mempool_path(&self) -> PathBuf {
        self.datadir.join(self.network().to_string()).join("mempool.dat")
    }

    /// Load a config file if one is present at `path`, falling back to
    /// defaults entirely when it is not -- a missing config file is not an
    /// error, matching the `dirs`-derived default datadir's own
    /// create-on-first-run behavior.
    pub fn load(path: Option<&PathBuf>) -> color_eyre::Result<Config> {
        let path = match path {
            Some(path) => path.clone(),
            None => default_config_path(),
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scryptd")
        .join("scryptd.toml")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            datadir: dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("scryptd"),
            testnet: false,
            listen_addr: "0.0.0.0:9333".parse().expect("static address parses"),
            connect: Vec::new(),
            rpc_listen_addr: "127.0.0.1:9332".parse().expect("static address parses"),
            rpc_threads: 4,
            user_agent: format!("/scryptd:{}/", env!("CARGO_PKG_VERSION")),
        }
    }
}
