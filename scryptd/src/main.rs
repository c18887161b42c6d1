//! The node supervisor (`spec.md` §4's C13): loads configuration, opens
//! the chain, wires the peer engine and the RPC surface to it, and drives
//! graceful shutdown.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{App, Arg};
use tracing::{info, warn};

use config::Config;

fn cli_overrides(config: &mut Config) {
    let matches = App::new("scryptd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A peer-to-peer scrypt-proof-of-work full node")
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("path to a TOML config file"),
        )
        .arg(
            Arg::with_name("datadir")
                .long("datadir")
                .takes_value(true)
                .help("root data directory"),
        )
        .arg(
            Arg::with_name("testnet")
                .long("testnet")
                .help("run on the test network instead of mainnet"),
        )
        .arg(
            Arg::with_name("listen")
                .long("listen")
                .takes_value(true)
                .help("P2P listen address, e.g. 0.0.0.0:9333"),
        )
        .arg(
            Arg::with_name("connect")
                .long("connect")
                .takes_value(true)
                .multiple(true)
                .help("peer address to dial on startup; may be repeated"),
        )
        .arg(
            Arg::with_name("rpc-listen")
                .long("rpc-listen")
                .takes_value(true)
                .help("JSON-RPC listen address, e.g. 127.0.0.1:9332"),
        )
        .get_matches();

    if let Some(datadir) = matches.value_of("datadir") {
        config.datadir = PathBuf::from(datadir);
    }
    if matches.is_present("testnet") {
        config.testnet = true;
    }
    if let Some(listen) = matches.value_of("listen") {
        match listen.parse() {
            Ok(addr) => config.listen_addr = addr,
            Err(_) => warn!(%listen, "ignoring unparsable --listen address"),
        }
    }
    if let Some(peers) = matches.values_of("connect") {
        for peer in peers {
            match peer.parse() {
                Ok(addr) => config.connect.push(addr),
                Err(_) => warn!(peer, "ignoring unparsable --connect address"),
            }
        }
    }
    if let Some(rpc_listen) = matches.value_of("rpc-listen") {
        match rpc_listen.parse() {
            Ok(addr) => config.rpc_listen_addr = addr,
            Err(_) => warn!(%rpc_listen, "ignoring unparsable --rpc-listen address"),
        }
    }
}

fn config_path_arg() -> Option<PathBuf> {
    std::env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|pair| pair[0] == "--config")
        .map(|pair| PathBuf::from(&pair[1]))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = Config::load(config_path_arg().as_ref())?;
    cli_overrides(&mut config);

    let network = config.network();
    info!(%network, datadir = %config.datadir.display(), "starting scryptd");

    std::fs::create_dir_all(&config.datadir)?;
    let chain = node::Chain::open(&config.state_config(), config.mempool_path(), network)?;
    info!(height = chain.tip_height()?.0, "chain opened");

    let manager = network::Manager::new(chain, network, config.listen_addr, config.user_agent.clone());
    manager.spawn_supervisors();

    {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.listen().await {
                warn!(%err, "peer listener exited");
            }
        });
    }
    for peer in &config.connect {
        let manager = manager.clone();
        let peer = *peer;
        tokio::spawn(async move {
            if let Err(err) = manager.connect(peer).await {
                warn!(%peer, %err, "failed to dial configured peer");
            }
        });
    }

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let rpc_state = Arc::new(rpc::RpcState::new(
        manager.chain(),
        Some(manager.clone()),
        network,
        tokio::runtime::Handle::current(),
        shutdown.clone(),
    ));
    let rpc_server = rpc::RpcServer::new(
        rpc::RpcServerConfig {
            listen_addr: config.rpc_listen_addr,
            threads: config.rpc_threads,
        },
        rpc_state,
    );
    let rpc_handle = rpc_server.start()?;
    info!(addr = %config.rpc_listen_addr, "RPC server listening");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        _ = shutdown.notified() => {
            info!("shutdown requested via RPC stop");
        }
    }

    rpc_handle.close();
    info!("scryptd stopped");
    Ok(())
}
