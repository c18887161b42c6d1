//! The HTTP transport `spec.md` §6 names for the JSON-RPC surface.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpc_http_server::{AccessControlAllowOrigin, DomainsValidation, Server, ServerBuilder};

use crate::methods::build_handler;
use crate::state::RpcState;

pub struct RpcServerConfig {
    pub listen_addr: SocketAddr,
    pub threads: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        RpcServerConfig {
            listen_addr: "127.0.0.1:9332".parse().expect("static address parses"),
            threads: 4,
        }
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, state: Arc<RpcState>) -> RpcServer {
        RpcServer { config, state }
    }

    /// Bind and start serving. Blocks the calling thread only long enough
    /// to bind the listener; the returned [`Server`] runs its own worker
    /// pool and is dropped (closing the listener) when the caller drops it.
    pub fn start(self) -> Result<Server, std::io::Error> {
        let handler = build_handler(self.state);
        ServerBuilder::new(handler)
            .threads(self.config.threads)
            .cors(DomainsValidation::AllowOnly(vec![AccessControlAllowOrigin::Any]))
            .start_http(&self.config.listen_addr)
    }
}
