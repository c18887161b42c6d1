//! The network manager: connection lifecycle, peer registry, sync-peer
//! election, and the supervisory tasks (rebroadcast, keepalive, stall
//! watchdog) that keep the peer set healthy.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use chain::{
    block::{self, Height},
    parameters::Network,
    transaction::Transaction,
};
use mempool::MempoolError;
use node::{Chain, ChainError, IngestResult};

use crate::constants;
use crate::meta_addr::MetaAddr;
use crate::peer::{PeerInfo, PeerSnapshot, PeerState};
use crate::protocol::external::types::{Nonce, PeerServices};
use crate::protocol::external::{Codec, InventoryHash, Message, Version};

/// Tracks an address's recent disconnects for the ban policy.
struct BanRecord {
    recent_disconnects: Vec<chrono::DateTime<Utc>>,
    banned_until: Option<chrono::DateTime<Utc>>,
}

/// Owns the peer set and the single chain lock every connection task and
/// supervisory task shares. Constructed once by the supervisor and handed
/// out as an `Arc`.
pub struct Manager {
    chain: Arc<Mutex<Chain>>,
    peers: Arc<Mutex<HashMap<SocketAddr, PeerInfo>>>,
    sync_peer: Arc<Mutex<Option<SocketAddr>>>,
    bans: Arc<Mutex<HashMap<IpAddr, BanRecord>>>,
    address_book: Arc<Mutex<HashMap<SocketAddr, MetaAddr>>>,
    /// Orphan blocks we've seen recently, keyed by their own hash, used
    /// to walk `prev` pointers to find a root orphan's missing parent.
    recent_orphans: Arc<Mutex<HashMap<block::Hash, Arc<block::Block>>>>,
    /// Last time a `getdata` was sent for a given missing parent, for
    /// the orphan-request debounce.
    orphan_requests: Arc<Mutex<HashMap<block::Hash, chrono::DateTime<Utc>>>>,
    last_block_connected: Arc<Mutex<chrono::DateTime<Utc>>>,
    network: Network,
    listen_addr: SocketAddr,
    nonce: Nonce,
    user_agent: String,
    services: PeerServices,
}

impl Manager {
    pub fn new(chain: Chain, network: Network, listen_addr: SocketAddr, user_agent: String) -> Arc<Manager> {
        Arc::new(Manager {
            chain: Arc::new(Mutex::new(chain)),
            peers: Arc::new(Mutex::new(HashMap::new())),
            sync_peer: Arc::new(Mutex::new(None)),
            bans: Arc::new(Mutex::new(HashMap::new())),
            address_book: Arc::new(Mutex::new(HashMap::new())),
            recent_orphans: Arc::new(Mutex::new(HashMap::new())),
            orphan_requests: Arc::new(Mutex::new(HashMap::new())),
            last_block_connected: Arc::new(Mutex::new(Utc::now())),
            network,
            listen_addr,
            nonce: Nonce::random(),
            user_agent,
            services: PeerServices::NODE_NETWORK,
        })
    }

    pub fn chain(&self) -> Arc<Mutex<Chain>> {
        self.chain.clone()
    }

    /// A point-in-time copy of every connected peer's registry entry, for
    /// `getpeerinfo`.
    pub async fn peer_snapshots(&self) -> Vec<PeerSnapshot> {
        let peers = self.peers.lock().await;
        let sync_peer = *self.sync_peer.lock().await;
        peers
            .values()
            .map(|p| PeerSnapshot {
                addr: p.addr,
                height: p.height,
                user_agent: p.user_agent.clone(),
                state: p.state,
                outbound_initiated: p.outbound_initiated,
                last_heard: p.last_heard,
                is_sync_peer: sync_peer == Some(p.addr),
            })
            .collect()
    }

    /// Bind the listener and accept inbound connections until the
    /// process is asked to shut down. Each accepted socket is handed to
    /// its own connection task.
    pub async fn listen(self: Arc<Self>) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "listening for peers");
        loop {
            let (stream, addr) = listener.accept().await?;
            if self.is_banned(addr.ip()).await {
                debug!(%addr, "refusing connection from a banned address");
                continue;
            }
            let manager = self.clone();
            tokio::spawn(async move {
                manager.run_connection(stream, addr, false).await;
            });
        }
    }

    /// Dial an outbound peer. A dial target equal to our own listen
    /// address is refused per the self-filter rule.
    pub async fn connect(self: Arc<Self>, addr: SocketAddr) -> Result<(), std::io::Error> {
        if self.is_self(addr) {
            debug!(%addr, "refusing to dial our own listen address");
            return Ok(());
        }
        if self.is_banned(addr.ip()).await {
            return Ok(());
        }
        let pre_probe = tokio::time::timeout(Duration::from_millis(1500), TcpStream::connect(addr)).await;
        let stream = match pre_probe {
            Ok(Ok(stream)) => stream,
            _ => tokio::time::timeout(Duration::from_secs(10), TcpStream::connect(addr)).await??,
        };
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_connection(stream, addr, true).await;
        });
        Ok(())
    }

    fn is_self(&self, addr: SocketAddr) -> bool {
        addr == self.listen_addr || addr.port() == self.listen_addr.port() && addr.ip().is_loopback()
    }

    /// Spawn the supervisory tasks: rebroadcast, keepalive, stall
    /// watchdog. Call once after construction.
    pub fn spawn_supervisors(self: &Arc<Self>) {
        self.clone().spawn_rebroadcast();
        self.clone().spawn_keepalive();
        self.clone().spawn_stall_watchdog();
    }

    async fn run_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr, outbound_initiated: bool) {
        let codec = Codec::builder()
            .for_network(self.network)
            .with_metrics_label(addr.to_string())
            .finish();
        let framed = Framed::new(stream, codec);
        let (mut sink, mut stream) = framed.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let close = Arc::new(Notify::new());

        {
            let mut peers = self.peers.lock().await;
            peers.insert(addr, PeerInfo::new(addr, tx, close.clone(), outbound_initiated));
        }

        match self.handshake(addr, &mut sink, &mut stream, outbound_initiated).await {
            Ok((height, user_agent)) => {
                let mut peers = self.peers.lock().await;
                if let Some(info) = peers.get_mut(&addr) {
                    info.state = PeerState::Active;
                    info.height = height;
                    info.user_agent = user_agent;
                    info.touch();
                }
            }
            Err(err) => {
                warn!(%addr, %err, "handshake failed");
                self.drop_peer(addr).await;
                return;
            }
        }

        self.on_peer_active(addr).await;

        loop {
            tokio::select! {
                _ = close.notified() => {
                    break;
                }
                maybe_msg = stream.next() => {
                    match maybe_msg {
                        Some(Ok(message)) => {
                            {
                                let mut peers = self.peers.lock().await;
                                if let Some(info) = peers.get_mut(&addr) {
                                    info.touch();
                                }
                            }
                            if let Err(err) = self.handle_message(addr, message).await {
                                warn!(%addr, %err, "protocol error, closing peer");
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(%addr, %err, "decode error, closing peer");
                            break;
                        }
                        None => {
                            debug!(%addr, "peer closed the connection");
                            break;
                        }
                    }
                }
                Some(out) = rx.recv() => {
                    if sink.send(out).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.drop_peer(addr).await;
    }

    async fn handshake(
        &self,
        addr: SocketAddr,
        sink: &mut (impl futures::Sink<Message, Error = std::io::Error> + Unpin),
        stream: &mut (impl futures::Stream<Item = Result<Message, std::io::Error>> + Unpin),
        outbound_initiated: bool,
    ) -> Result<(u32, String), std::io::Error> {
        let step = Duration::from_secs(10);
        let tip_height = {
            let chain = self.chain.lock().await;
            chain.tip_height().map(|h| h.0).unwrap_or(0)
        };
        let our_version = self.make_version(addr, tip_height);

        if outbound_initiated {
            send_within(sink, Message::Version(our_version.clone()), step).await?;
        }

        let their_version = match tokio::time::timeout(step, stream.next()).await {
            Ok(Some(Ok(Message::Version(v)))) => v,
            Ok(Some(Ok(_))) => return Err(protocol_error("expected version as the first message")),
            Ok(Some(Err(err))) => return Err(err),
            Ok(None) => return Err(protocol_error("connection closed during handshake")),
            Err(_) => return Err(protocol_error("handshake timed out awaiting version")),
        };

        if their_version.nonce == our_version.nonce {
            return Err(protocol_error("self-connection detected"));
        }

        if !outbound_initiated {
            send_within(sink, Message::Version(our_version), step).await?;
        }

        send_within(sink, Message::Verack, step).await?;

        match tokio::time::timeout(step, stream.next()).await {
            Ok(Some(Ok(Message::Verack))) => {}
            Ok(Some(Ok(_))) => return Err(protocol_error("expected verack to complete the handshake")),
            Ok(Some(Err(err))) => return Err(err),
            Ok(None) => return Err(protocol_error("connection closed during handshake")),
            Err(_) => return Err(protocol_error("handshake timed out awaiting verack")),
        }

        Ok((their_version.start_height.0, their_version.user_agent))
    }

    fn make_version(&self, their_addr: SocketAddr, tip_height: u32) -> Version {
        Version::new(
            constants::CURRENT_VERSION,
            their_addr,
            PeerServices::NODE_NETWORK,
            self.services,
            self.listen_addr,
            self.nonce,
            self.user_agent.clone(),
            Height(tip_height),
            true,
        )
    }

    async fn on_peer_active(&self, addr: SocketAddr) {
        let locator = {
            let chain = self.chain.lock().await;
            chain.block_locator().unwrap_or_default()
        };
        self.send_to(addr, Message::GetAddr).await;
        self.send_to(addr, Message::GetBlocks { locator, stop: None }).await;
        self.elect_sync_peer().await;
    }

    async fn handle_message(&self, addr: SocketAddr, message: Message) -> Result<(), std::io::Error> {
        match message {
            Message::Version(_) => Err(protocol_error("duplicate version after handshake")),
            Message::Verack => Ok(()),
            Message::Ping(nonce) => {
                self.send_to(addr, Message::Pong(nonce)).await;
                Ok(())
            }
            Message::Pong(_) => Ok(()),
            Message::GetAddr => {
                let addrs: Vec<MetaAddr> = {
                    let book = self.address_book.lock().await;
                    book.values().take(constants::MAX_ADDRS_IN_MESSAGE).copied().collect()
                };
                self.send_to(addr, Message::Addr(addrs)).await;
                Ok(())
            }
            Message::Addr(addrs) => {
                self.learn_addrs(addrs).await;
                Ok(())
            }
            Message::GetBlocks { locator, stop } => {
                self.respond_getblocks(addr, locator, stop).await;
                Ok(())
            }
            Message::Inv(items) => {
                self.handle_inv(addr, items).await;
                Ok(())
            }
            Message::GetData(items) => {
                self.handle_getdata(addr, items).await;
                Ok(())
            }
            Message::Block(block) => {
                self.handle_block(addr, block).await;
                Ok(())
            }
            Message::Tx(tx) => {
                self.handle_tx(addr, tx).await;
                Ok(())
            }
            Message::Reject { message, reason } => {
                debug!(%addr, %message, %reason, "peer rejected a message we sent");
                Ok(())
            }
        }
    }

    async fn learn_addrs(&self, addrs: Vec<MetaAddr>) {
        let mut book = self.address_book.lock().await;
        for addr in addrs.into_iter().take(constants::MAX_ADDRS_IN_MESSAGE) {
            book.entry(addr.addr)
                .and_modify(|existing| {
                    if addr.last_seen > existing.last_seen {
                        *existing = addr;
                    }
                })
                .or_insert(addr);
        }
    }

    async fn respond_getblocks(&self, addr: SocketAddr, locator: Vec<block::Hash>, stop: Option<block::Hash>) {
        let chain = self.chain.lock().await;
        let mut start_height = None;
        for hash in &locator {
            if let Ok(Some(height)) = chain.height_for_hash(*hash) {
                start_height = Some(Height(height.0 + 1));
                break;
            }
        }
        let tip_height = match chain.tip_height() {
            Ok(h) => h,
            Err(_) => return,
        };
        let mut height = start_height.unwrap_or(Height(0));
        let mut items = Vec::new();
        while height.0 <= tip_height.0 && items.len() < constants::MAX_INV_IN_MESSAGE {
            match chain.hash_at_height(height) {
                Ok(Some(hash)) => {
                    items.push(InventoryHash::Block(hash));
                    if Some(hash) == stop {
                        break;
                    }
                }
                _ => break,
            }
            height = Height(height.0 + 1);
        }
        drop(chain);
        if !items.is_empty() {
            self.send_to(addr, Message::Inv(items)).await;
        }
    }

    async fn handle_inv(&self, addr: SocketAddr, items: Vec<InventoryHash>) {
        if self.in_initial_block_download().await && !self.is_sync_peer(addr).await {
            debug!(%addr, "ignoring inv from a non-sync peer during initial block download");
            return;
        }

        let mut wanted = Vec::new();
        let mut wanted_blocks = Vec::new();
        {
            let chain = self.chain.lock().await;
            for item in items {
                match item {
                    InventoryHash::Block(hash) => {
                        if chain.block(hash).ok().flatten().is_none() {
                            wanted.push(InventoryHash::Block(hash));
                            wanted_blocks.push(hash);
                        }
                    }
                    InventoryHash::Tx(hash) => {
                        if !chain.mempool().contains(&hash) {
                            wanted.push(InventoryHash::Tx(hash));
                        }
                    }
                }
            }
        }

        if wanted.is_empty() {
            return;
        }

        {
            let mut peers = self.peers.lock().await;
            if let Some(info) = peers.get_mut(&addr) {
                info.pending_blocks.extend(wanted_blocks);
            }
        }

        self.send_to(addr, Message::GetData(wanted)).await;
    }

    async fn handle_getdata(&self, addr: SocketAddr, items: Vec<InventoryHash>) {
        for item in items {
            match item {
                InventoryHash::Block(hash) => {
                    let found = {
                        let chain = self.chain.lock().await;
                        chain.block(hash).ok().flatten()
                    };
                    if let Some(block) = found {
                        self.send_to(addr, Message::Block(Arc::new(block))).await;
                    }
                }
                InventoryHash::Tx(hash) => {
                    let found = {
                        let chain = self.chain.lock().await;
                        chain.mempool().get(&hash)
                    };
                    if let Some(tx) = found {
                        self.send_to(addr, Message::Tx(tx)).await;
                    }
                }
            }
        }
    }

    async fn handle_block(&self, addr: SocketAddr, block: Arc<block::Block>) {
        let hash = block.hash();
        let result = {
            let mut chain = self.chain.lock().await;
            chain.ingest((*block).clone(), Utc::now())
        };

        match result {
            Ok(IngestResult::ExtendedMain { height }) | Ok(IngestResult::Reorganized { height }) => {
                info!(%hash, height = height.0, %addr, "connected block");
                self.evict_block_txs(&block).await;
                self.broadcast_except(addr, Message::Inv(vec![InventoryHash::Block(hash)])).await;
                *self.last_block_connected.lock().await = Utc::now();
                self.clear_orphan_wait(hash).await;
                self.note_block_delivered(addr, hash).await;
            }
            Ok(IngestResult::SideStored { height }) => {
                debug!(%hash, height = height.0, "stored block on a sidechain");
                self.clear_orphan_wait(hash).await;
                self.note_block_delivered(addr, hash).await;
            }
            Ok(IngestResult::AlreadyKnown) => {
                self.note_block_delivered(addr, hash).await;
            }
            Ok(IngestResult::Orphan) => {
                debug!(%hash, %addr, "block is an orphan, queued pending its parent");
                self.remember_orphan(block).await;
                self.request_orphan_root(hash).await;
            }
            Ok(IngestResult::Invalid(reason)) => {
                warn!(%hash, %addr, %reason, "rejected invalid block");
            }
            Err(err) => {
                warn!(%hash, %addr, %err, "chain manager error ingesting block");
            }
        }
    }

    /// Ingest a block obtained from outside the peer protocol (the
    /// `submitblock` RPC) and, on success, broadcast it to every connected
    /// peer the way [`Manager::handle_block`] would for a peer-delivered
    /// block -- there is no originating peer to exclude from the fan-out.
    pub async fn submit_local_block(&self, block: block::Block) -> Result<IngestResult, ChainError> {
        let hash = block.hash();
        let result = {
            let mut chain = self.chain.lock().await;
            chain.ingest(block, Utc::now())?
        };
        if matches!(result, IngestResult::ExtendedMain { .. } | IngestResult::Reorganized { .. }) {
            info!(%hash, "connected a locally submitted block");
            self.broadcast_all(Message::Inv(vec![InventoryHash::Block(hash)])).await;
            *self.last_block_connected.lock().await = Utc::now();
            self.clear_orphan_wait(hash).await;
        }
        Ok(result)
    }

    /// Record that a requested block arrived, and if that was the last
    /// one outstanding for this peer, the download batch has drained and
    /// a fresh `getblocks` is due.
    async fn note_block_delivered(&self, addr: SocketAddr, hash: block::Hash) {
        let mut reissue = false;
        {
            let mut peers = self.peers.lock().await;
            if let Some(info) = peers.get_mut(&addr) {
                info.pending_blocks.remove(&hash);
                info.blocks_since_locator += 1;
                if info.pending_blocks.is_empty() || info.blocks_since_locator >= constants::GETBLOCKS_BATCH_SIZE {
                    reissue = true;
                }
            }
        }
        if reissue {
            self.reissue_getblocks(addr).await;
        }
    }

    async fn reissue_getblocks(&self, addr: SocketAddr) {
        let locator = {
            let chain = self.chain.lock().await;
            chain.block_locator().unwrap_or_default()
        };
        self.send_to(addr, Message::GetBlocks { locator, stop: None }).await;
        let mut peers = self.peers.lock().await;
        if let Some(info) = peers.get_mut(&addr) {
            info.blocks_since_locator = 0;
            info.last_locator_request = Utc::now();
        }
    }

    async fn evict_block_txs(&self, block: &block::Block) {
        let mut chain = self.chain.lock().await;
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                let _ = chain.mempool_mut().evict(&tx.hash());
            }
        }
    }

    async fn handle_tx(&self, addr: SocketAddr, tx: Arc<Transaction>) {
        let hash = tx.hash();
        let result = {
            let mut chain = self.chain.lock().await;
            chain.admit_to_mempool((*tx).clone())
        };
        match result {
            Ok(_) => {
                debug!(%hash, %addr, "admitted transaction to mempool");
                self.broadcast_except(addr, Message::Inv(vec![InventoryHash::Tx(hash)])).await;
            }
            Err(ChainError::Mempool(MempoolError::AlreadyKnown(_))) => {}
            Err(err) => {
                debug!(%hash, %addr, %err, "rejected transaction");
            }
        }
    }

    async fn remember_orphan(&self, block: Arc<block::Block>) {
        let mut orphans = self.recent_orphans.lock().await;
        if orphans.len() >= constants::MAX_ORPHANS {
            if let Some(&oldest) = orphans.keys().next() {
                orphans.remove(&oldest);
            }
        }
        orphans.insert(block.hash(), block);
    }

    async fn clear_orphan_wait(&self, hash: block::Hash) {
        self.recent_orphans.lock().await.remove(&hash);
        self.orphan_requests.lock().await.remove(&hash);
    }

    /// Walk `prev` pointers from `hash` through the locally tracked
    /// orphans to find the root orphan's missing parent, then request it
    /// from the sync peer, debounced per-parent.
    async fn request_orphan_root(&self, hash: block::Hash) {
        let orphans = self.recent_orphans.lock().await;
        let mut cursor = hash;
        let mut steps = 0;
        let root_parent = loop {
            steps += 1;
            let block = match orphans.get(&cursor) {
                Some(block) => block,
                None => break cursor,
            };
            let parent = block.header.previous_block_hash;
            if steps > 100 || !orphans.contains_key(&parent) {
                break parent;
            }
            cursor = parent;
        };
        drop(orphans);

        let now = Utc::now();
        let due = {
            let requests = self.orphan_requests.lock().await;
            requests
                .get(&root_parent)
                .map(|last| (now - *last).num_seconds() >= constants::ORPHAN_REQUEST_DEBOUNCE_SECS)
                .unwrap_or(true)
        };
        if !due {
            return;
        }
        self.orphan_requests.lock().await.insert(root_parent, now);

        if let Some(sync_peer) = *self.sync_peer.lock().await {
            self.send_to(sync_peer, Message::GetData(vec![InventoryHash::Block(root_parent)])).await;
        }
    }

    async fn in_initial_block_download(&self) -> bool {
        let our_height = {
            let chain = self.chain.lock().await;
            chain.tip_height().map(|h| h.0).unwrap_or(0)
        };
        let best_peer_height = {
            let peers = self.peers.lock().await;
            peers.values().map(|p| p.height).max().unwrap_or(0)
        };
        best_peer_height.saturating_sub(our_height) > constants::INITIAL_BLOCK_DOWNLOAD_LAG
    }

    async fn is_sync_peer(&self, addr: SocketAddr) -> bool {
        *self.sync_peer.lock().await == Some(addr)
    }

    /// Elect the highest-height active peer as sync peer. The incumbent
    /// is kept unless it has disconnected or a challenger exceeds it by
    /// the hysteresis margin.
    async fn elect_sync_peer(&self) {
        let peers = self.peers.lock().await;
        let best = peers
            .values()
            .filter(|p| p.state == PeerState::Active)
            .max_by_key(|p| p.height)
            .map(|p| (p.addr, p.height));

        let (best_addr, best_height) = match best {
            Some(pair) => pair,
            None => {
                *self.sync_peer.lock().await = None;
                return;
            }
        };

        let mut sync_peer = self.sync_peer.lock().await;
        let should_elect = match *sync_peer {
            None => true,
            Some(current) if current == best_addr => false,
            Some(current) => match peers.get(&current) {
                None => true,
                Some(info) => best_height >= info.height + constants::SYNC_PEER_HYSTERESIS,
            },
        };

        if should_elect {
            info!(addr = %best_addr, height = best_height, "elected new sync peer");
            *sync_peer = Some(best_addr);
        }
    }

    async fn send_to(&self, addr: SocketAddr, message: Message) {
        let peers = self.peers.lock().await;
        if let Some(info) = peers.get(&addr) {
            info.send(message);
        }
    }

    async fn broadcast_all(&self, message: Message) {
        let peers = self.peers.lock().await;
        for info in peers.values() {
            info.send(message.clone());
        }
    }

    async fn broadcast_except(&self, exclude: SocketAddr, message: Message) {
        let peers = self.peers.lock().await;
        for info in peers.values().filter(|info| info.addr != exclude) {
            info.send(message.clone());
        }
    }

    async fn record_disconnect(&self, ip: IpAddr) {
        let now = Utc::now();
        let mut bans = self.bans.lock().await;
        let entry = bans.entry(ip).or_insert_with(|| BanRecord {
            recent_disconnects: Vec::new(),
            banned_until: None,
        });
        entry
            .recent_disconnects
            .retain(|t| (now - *t).num_seconds() < constants::BAN_WINDOW_SECS);
        entry.recent_disconnects.push(now);
        if entry.recent_disconnects.len() as u32 >= constants::BAN_DISCONNECT_THRESHOLD {
            entry.banned_until = Some(now + chrono::Duration::seconds(constants::BAN_DURATION_SECS));
            warn!(%ip, "banning address after repeated disconnects");
        }
    }

    async fn is_banned(&self, ip: IpAddr) -> bool {
        let bans = self.bans.lock().await;
        match bans.get(&ip).and_then(|record| record.banned_until) {
            Some(until) => Utc::now() < until,
            None => false,
        }
    }

    async fn drop_peer(&self, addr: SocketAddr) {
        let removed = self.peers.lock().await.remove(&addr);
        if let Some(info) = removed {
            info.close.notify_one();
        }
        self.record_disconnect(addr.ip()).await;
        {
            let mut sync_peer = self.sync_peer.lock().await;
            if *sync_peer == Some(addr) {
                *sync_peer = None;
            }
        }
        self.elect_sync_peer().await;
    }

    fn spawn_rebroadcast(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(constants::REBROADCAST_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.rebroadcast_mempool().await;
            }
        });
    }

    async fn rebroadcast_mempool(&self) {
        let items: Vec<InventoryHash> = {
            let chain = self.chain.lock().await;
            chain.mempool().transactions().map(|tx| InventoryHash::Tx(tx.hash())).collect()
        };
        if items.is_empty() {
            return;
        }
        self.broadcast_all(Message::Inv(items)).await;
    }

    fn spawn_keepalive(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(constants::KEEPALIVE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.keepalive_sweep().await;
            }
        });
    }

    async fn keepalive_sweep(&self) {
        let now = Utc::now();
        let mut stale = Vec::new();
        {
            let peers = self.peers.lock().await;
            for info in peers.values() {
                if (now - info.last_heard).num_seconds() > constants::PEER_TIMEOUT_SECS {
                    stale.push(info.addr);
                } else {
                    info.send(Message::Ping(Nonce::random()));
                }
            }
        }
        for addr in stale {
            warn!(%addr, "evicting peer after keepalive timeout");
            self.drop_peer(addr).await;
        }
    }

    fn spawn_stall_watchdog(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                self.stall_check().await;
            }
        });
    }

    async fn stall_check(&self) {
        let now = Utc::now();
        let since_block = (now - *self.last_block_connected.lock().await).num_seconds();

        let higher_peer_exists = {
            let our_height = {
                let chain = self.chain.lock().await;
                chain.tip_height().map(|h| h.0).unwrap_or(0)
            };
            let peers = self.peers.lock().await;
            peers.values().any(|p| p.height > our_height)
        };
        if !higher_peer_exists {
            return;
        }

        let sync_peer = match *self.sync_peer.lock().await {
            Some(addr) => addr,
            None => return,
        };

        if since_block > constants::STALL_DISCONNECT_SECS {
            warn!(addr = %sync_peer, "stall watchdog force-disconnecting unresponsive sync peer");
            self.drop_peer(sync_peer).await;
        } else if since_block > constants::STALL_NUDGE_SECS {
            debug!(addr = %sync_peer, "stall watchdog re-issuing getblocks");
            self.reissue_getblocks(sync_peer).await;
        }
    }
}

async fn send_within(
    sink: &mut (impl futures::Sink<Message, Error = std::io::Error> + Unpin),
    message: Message,
    timeout: Duration,
) -> Result<(), std::io::Error> {
    tokio::time::timeout(timeout, sink.send(message))
        .await
        .map_err(|_| protocol_error("timed out writing a handshake message"))?
}

fn protocol_error(reason: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, reason.to_string())
}
