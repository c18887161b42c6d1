//! The ten JSON-RPC methods `spec.md` §6 names, registered on a single
//! [`jsonrpc_core::IoHandler`]. Every method runs on
//! `jsonrpc-http-server`'s own worker threads, so reaching into the async
//! `Chain`/`Manager` locks goes through `state.runtime.block_on`.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use jsonrpc_core::{Error, IoHandler, Params, Value};
use serde::Deserialize;
use serde_json::json;

use chain::block::Block;
use chain::parameters::Network;
use chain::transparent::Address;
use chain::BitcoinSerialize;
use node::IngestResult;

use crate::error::{chain_error, internal, invalid_params, miner_error};
use crate::state::RpcState;

pub fn build_handler(state: Arc<RpcState>) -> IoHandler {
    let mut io = IoHandler::new();

    register_getinfo(&mut io, state.clone());
    register_getblockcount(&mut io, state.clone());
    register_getbestblockhash(&mut io, state.clone());
    register_getblocktemplate(&mut io, state.clone());
    register_submitblock(&mut io, state.clone());
    register_getnewaddress(&mut io, state.clone());
    register_getbalance(&mut io, state.clone());
    register_addnode(&mut io, state.clone());
    register_getpeerinfo(&mut io, state.clone());
    register_stop(&mut io, state);

    io
}

fn register_getinfo(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getinfo", move |_params: Params| {
        let chain = state.runtime.block_on(state.chain.lock());
        let height = chain.tip_height().map_err(chain_error)?;
        let tip_hash = chain.tip_hash().map_err(chain_error)?;
        let tip = chain
            .block(tip_hash)
            .map_err(chain_error)?
            .ok_or_else(|| internal("indexed tip block is missing from the block store"))?;
        let difficulty = consensus::work::relative_difficulty(tip.header.difficulty_threshold);
        drop(chain);

        let connections = match &state.manager {
            Some(manager) => state.runtime.block_on(manager.peer_snapshots()).len(),
            None => 0,
        };

        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "protocolversion": network::constants::CURRENT_VERSION.0,
            "blocks": height.0,
            "connections": connections,
            "proxy": "",
            "difficulty": difficulty,
            "testnet": matches!(state.network, Network::Testnet),
            "errors": "",
        }))
    });
}

fn register_getblockcount(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getblockcount", move |_params: Params| {
        let chain = state.runtime.block_on(state.chain.lock());
        let height = chain.tip_height().map_err(chain_error)?;
        Ok(json!(height.0))
    });
}

fn register_getbestblockhash(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getbestblockhash", move |_params: Params| {
        let chain = state.runtime.block_on(state.chain.lock());
        let hash = chain.tip_hash().map_err(chain_error)?;
        Ok(json!(hash.to_string()))
    });
}

/// `getblocktemplate`'s only recognized parameter. Unlike bitcoind's real
/// template request object, this node has no notion of capabilities or
/// long-polling -- `mining_address` is the one knob spec.md §6 names.
#[derive(Deserialize, Default)]
struct TemplateParams {
    #[serde(default)]
    mining_address: Option<String>,
}

fn parse_template_params(params: Params) -> Result<TemplateParams, Error> {
    match params {
        Params::None => Ok(TemplateParams::default()),
        Params::Array(mut items) => {
            if items.is_empty() || items[0].is_null() {
                return Ok(TemplateParams::default());
            }
            serde_json::from_value(items.remove(0)).map_err(|e| invalid_params(e.to_string()))
        }
        Params::Map(map) => {
            serde_json::from_value(Value::Object(map)).map_err(|e| invalid_params(e.to_string()))
        }
    }
}

/// Resolve the address a template's coinbase should pay: the caller's
/// explicit `mining_address`, or -- so `getblocktemplate` is usable with
/// no setup -- the first address this node's ephemeral wallet has ever
/// handed out, minting one if it has none yet.
fn resolve_pay_to_hash(state: &RpcState, requested: Option<String>) -> Result<[u8; 20], Error> {
    if let Some(address_str) = requested {
        let address = Address::from_str(&address_str)
            .map_err(|_| invalid_params("mining_address is not a valid address"))?;
        return Ok(address.pub_key_hash);
    }
    let address = state
        .wallet
        .addresses()
        .into_iter()
        .next()
        .unwrap_or_else(|| state.wallet.new_address());
    Ok(address.pub_key_hash)
}

fn register_getblocktemplate(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getblocktemplate", move |params: Params| {
        let parsed = parse_template_params(params)?;
        let pay_to_hash = resolve_pay_to_hash(&state, parsed.mining_address)?;

        let chain = state.runtime.block_on(state.chain.lock());
        let template = miner::build_template(&chain, pay_to_hash).map_err(miner_error)?;
        drop(chain);

        let transactions: Result<Vec<String>, Error> = template
            .transactions
            .iter()
            .map(|tx| {
                tx.bitcoin_serialize_to_vec()
                    .map(hex::encode)
                    .map_err(|e| internal(e.to_string()))
            })
            .collect();

        Ok(json!({
            "version": template.version,
            "previousblockhash": template.previous_block_hash.to_string(),
            "height": template.height.0,
            "curtime": template.curtime.timestamp(),
            "bits": format!("{:08x}", template.bits.0),
            "target": template.target,
            "merkleroot": template.merkle_root.to_string(),
            "transactions": transactions?,
        }))
    });
}

fn ingest_result_to_value(result: IngestResult) -> Value {
    match result {
        IngestResult::ExtendedMain { .. }
        | IngestResult::SideStored { .. }
        | IngestResult::Reorganized { .. } => Value::Null,
        IngestResult::AlreadyKnown => Value::String("duplicate".into()),
        IngestResult::Orphan => Value::String("inconclusive-not-best-prevblk".into()),
        IngestResult::Invalid(reason) => Value::String(reason),
    }
}

fn register_submitblock(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("submitblock", move |params: Params| {
        let (block_hex,): (String,) = params.parse()?;
        let bytes = hex::decode(&block_hex).map_err(|e| invalid_params(e.to_string()))?;
        let mut buf = bytes::BytesMut::from(&bytes[..]);
        let block = Block::deserialize_from_buf(&mut buf).map_err(|e| invalid_params(e.to_string()))?;

        let result = match &state.manager {
            Some(manager) => state
                .runtime
                .block_on(manager.submit_local_block(block))
                .map_err(chain_error)?,
            None => {
                let mut chain = state.runtime.block_on(state.chain.lock());
                chain.ingest(block, Utc::now()).map_err(chain_error)?
            }
        };

        Ok(ingest_result_to_value(result))
    });
}

fn register_getnewaddress(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getnewaddress", move |_params: Params| {
        Ok(json!(state.wallet.new_address().to_string()))
    });
}

fn register_getbalance(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getbalance", move |_params: Params| {
        let scripts = state.wallet.lock_scripts();
        let chain = state.runtime.block_on(state.chain.lock());
        let utxos = chain.utxos().matching(&scripts).map_err(|e| internal(e.to_string()))?;
        drop(chain);

        let total = utxos
            .iter()
            .try_fold(chain::amount::Amount::zero(), |acc, utxo| acc.checked_add(utxo.output.value))
            .map_err(|e| internal(e.to_string()))?;

        Ok(json!(total.base_units()))
    });
}

fn register_addnode(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("addnode", move |params: Params| {
        let (node_addr,): (String,) = params.parse()?;
        let addr: SocketAddr = node_addr
            .parse()
            .map_err(|_| invalid_params("node must be an ip:port pair"))?;

        match &state.manager {
            Some(manager) => {
                state
                    .runtime
                    .block_on(manager.clone().connect(addr))
                    .map_err(|e| internal(e.to_string()))?;
                Ok(Value::Null)
            }
            None => Err(internal("this node is running with networking disabled")),
        }
    });
}

fn register_getpeerinfo(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("getpeerinfo", move |_params: Params| {
        let peers = match &state.manager {
            Some(manager) => state.runtime.block_on(manager.peer_snapshots()),
            None => Vec::new(),
        };

        let peers: Vec<Value> = peers
            .iter()
            .map(|peer| {
                json!({
                    "addr": peer.addr.to_string(),
                    "startingheight": peer.height,
                    "subver": peer.user_agent,
                    "inbound": !peer.outbound_initiated,
                    "lastrecv": peer.last_heard.timestamp(),
                    "syncnode": peer.is_sync_peer,
                })
            })
            .collect();

        Ok(Value::Array(peers))
    });
}

fn register_stop(io: &mut IoHandler, state: Arc<RpcState>) {
    io.add_sync_method("stop", move |_params: Params| {
        state.shutdown.notify_one();
        Ok(json!("scryptd stopping"))
    });
}
