//! The handles every registered RPC method reads or mutates through.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify};

use chain::parameters::Network;
use network::Manager;
use node::Chain;

use crate::wallet::Wallet;

/// Shared across every method [`crate::build_handler`] registers. One
/// instance is built by the node supervisor and handed to the RPC server;
/// methods reach it through the `Arc` `jsonrpc-core` clones into each
/// closure.
pub struct RpcState {
    pub(crate) chain: Arc<Mutex<Chain>>,
    /// `None` when this node is running with networking disabled --
    /// `getpeerinfo`/`addnode` degrade to empty/error rather than panic,
    /// and `submitblock` skips the inv broadcast.
    pub(crate) manager: Option<Arc<Manager>>,
    pub(crate) wallet: Wallet,
    pub(crate) network: Network,
    /// The handle of the runtime `chain`/`manager`'s locks were built on.
    /// `jsonrpc-http-server`'s methods run synchronously on its own worker
    /// pool, off that runtime, so they need this to block on the async
    /// locks the rest of the node also takes.
    pub(crate) runtime: Handle,
    pub(crate) shutdown: Arc<Notify>,
}

impl RpcState {
    pub fn new(
        chain: Arc<Mutex<Chain>>,
        manager: Option<Arc<Manager>>,
        network: Network,
        runtime: Handle,
        shutdown: Arc<Notify>,
    ) -> RpcState {
        RpcState {
            chain,
            manager,
            wallet: Wallet::new(network),
            network,
            runtime,
            shutdown,
        }
    }
}
