//! An ephemeral, in-process keystore backing `getnewaddress`/`getbalance`.
//!
//! `spec.md` §1 names "ECDSA key vault and address bookkeeping" as an
//! external collaborator out of this system's scope, and the Python
//! reference's own wallet (`wallet/wallet.py`) persists keys to a
//! `wallet.dat` outside the core this crate is built from. This wallet
//! exists only so the RPC surface stays complete without reimplementing
//! that vault: keys are generated in memory and never survive a restart.

use std::sync::Mutex;

use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tracing::warn;

use chain::parameters::Network;
use chain::transparent::{Address, Script};

pub struct Wallet {
    network: Network,
    keys: Mutex<Vec<PublicKey>>,
}

impl Wallet {
    pub fn new(network: Network) -> Wallet {
        Wallet {
            network,
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Generate a new keypair and return its address. The private key is
    /// held only for the lifetime of this process and is never written to
    /// disk.
    pub fn new_address(&self) -> Address {
        let secp = Secp256k1::signing_only();
        let mut rng = rand::thread_rng();
        let sk = loop {
            let mut scalar = [0u8; 32];
            rng.fill_bytes(&mut scalar);
            if let Ok(sk) = SecretKey::from_slice(&scalar) {
                break sk;
            }
        };
        let pk = PublicKey::from_secret_key(&secp, &sk);
        let address = Address::from_public_key(&pk, self.network);
        self.keys.lock().unwrap().push(pk);
        warn!(%address, "generated a new address with an in-memory key; this node does not persist wallet keys across restarts");
        address
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .map(|pk| Address::from_public_key(pk, self.network))
            .collect()
    }

    /// The P2PKH scripts every address this wallet has generated pays to,
    /// i.e. the set `getbalance` sums `state::UtxoStore::matching` over.
    pub fn lock_scripts(&self) -> Vec<Script> {
        self.addresses()
            .iter()
            .map(|address| script::p2pkh_lock_script(address.pub_key_hash))
            .collect()
    }
}
