//! The P2P engine: accepts and dials TCP connections, performs the HELLO
//! handshake, dispatches framed messages, and runs the background peer
//! discovery / maintenance / seen-id GC loops.
//!
//! Mining runs on its own dedicated thread (see `crate::miner`); this
//! module only ever touches the shared `ChainState` from async tasks, each
//! holding the single chain-state lock for the duration of one validate-
//! and-append call, never across a network read/write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fractalchain_core::chain::ChainState;
use fractalchain_core::consensus::{self, FractalConfig};
use fractalchain_core::error::FractalChainError;
use fractalchain_core::types::{Block, Transaction};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::config::{is_protocol_compatible, NetworkConfig, PROTOCOL_VERSION};
use crate::error::{NetworkError, NodeError, NodeResult};
use crate::network::message::{read_message, write_message, MessageType, NetworkMessage};
use crate::network::peer::{now_secs, PeerHandle, PeerInfo, PeerTable};
use crate::network::rate_limit::RateLimiter;
use crate::network::seen::SeenSet;
use crate::storage::SledStore;

/// Snapshot of network-layer activity, exposed through `Node::get_network_stats`.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub connected_peers: usize,
    pub known_peers: usize,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped_rate_limited: u64,
}

struct Shared {
    node_id: String,
    listen_addr: String,
    config: NetworkConfig,
    fractal_config: FractalConfig,
    chain: Arc<Mutex<ChainState>>,
    store: Arc<SledStore>,
    peers: Mutex<PeerTable>,
    seen: Mutex<SeenSet>,
    rate_limiters: Mutex<HashMap<String, RateLimiter>>,
    stats: Mutex<NetworkStats>,
}

impl Shared {
    async fn broadcast(&self, message: NetworkMessage, exclude: Option<&str>) {
        let mut peers = self.peers.lock().await;
        let ids = peers.connected_ids();
        for id in ids {
            if Some(id.as_str()) == exclude {
                continue;
            }
            if let Some(handle) = peers.get_mut(&id) {
                let _ = handle.sender.send(message.clone()).await;
            }
        }
        self.stats.lock().await.messages_sent += 1;
    }

    async fn send_to(&self, node_id: &str, message: NetworkMessage) -> NodeResult<()> {
        let mut peers = self.peers.lock().await;
        match peers.get_mut(node_id) {
            Some(handle) => {
                handle
                    .sender
                    .send(message)
                    .await
                    .map_err(|_| NetworkError::PeerNotConnected(node_id.to_string()))?;
                Ok(())
            }
            None => Err(NetworkError::PeerNotConnected(node_id.to_string()).into()),
        }
    }
}

/// A clonable, cheap-to-share reference to a running [`P2pServer`], used by
/// the `Node` facade and the miner to announce locally produced blocks and
/// transactions without depending on the server's own task lifetime.
#[derive(Clone)]
pub struct NetworkHandle {
    shared: Arc<Shared>,
}

impl NetworkHandle {
    pub async fn broadcast_block(&self, block: &Block) {
        let payload = serde_json::json!({ "block": block });
        let message = self.new_message(MessageType::NewBlock, payload);
        self.shared.broadcast(message, None).await;
    }

    pub async fn broadcast_transaction(&self, transaction: &Transaction) {
        let payload = serde_json::json!({ "transaction": transaction });
        let message = self.new_message(MessageType::NewTransaction, payload);
        self.shared.broadcast(message, None).await;
    }

    pub async fn peer_infos(&self) -> Vec<PeerInfo> {
        self.shared.peers.lock().await.peer_infos()
    }

    pub async fn stats(&self) -> NetworkStats {
        let mut stats = self.shared.stats.lock().await.clone();
        let peers = self.shared.peers.lock().await;
        stats.connected_peers = peers.len();
        stats.known_peers = peers.known_addresses().len();
        stats
    }

    /// Dials `addr` and, on a successful handshake, folds the connection
    /// into the same peer table the accept loop populates.
    pub async fn connect(&self, addr: &str) -> NodeResult<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| NetworkError::ConnectFailed(addr.to_string(), e.to_string()))?;
        spawn_connection(Arc::clone(&self.shared), stream, addr.to_string(), true);
        Ok(())
    }

    fn new_message(&self, msg_type: MessageType, payload: serde_json::Value) -> NetworkMessage {
        NetworkMessage::new(
            msg_type,
            payload,
            Uuid::new_v4().to_string(),
            now_secs(),
            self.shared.node_id.clone(),
        )
    }
}

/// Owns the listening socket and the background tasks; `run` never returns
/// under normal operation.
pub struct P2pServer {
    shared: Arc<Shared>,
}

impl P2pServer {
    pub fn new(
        node_id: String,
        listen_addr: String,
        config: NetworkConfig,
        fractal_config: FractalConfig,
        chain: Arc<Mutex<ChainState>>,
        store: Arc<SledStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                node_id,
                listen_addr,
                config,
                fractal_config,
                chain,
                store,
                peers: Mutex::new(PeerTable::new()),
                seen: Mutex::new(SeenSet::new()),
                rate_limiters: Mutex::new(HashMap::new()),
                stats: Mutex::new(NetworkStats::default()),
            }),
        }
    }

    pub fn handle(&self) -> NetworkHandle {
        NetworkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Binds the listener, spawns the background maintenance tasks, and
    /// accepts connections until the listener itself fails.
    pub async fn run(self) -> NodeResult<()> {
        let listener = TcpListener::bind(&self.shared.listen_addr)
            .await
            .map_err(|e| NetworkError::ConnectFailed(self.shared.listen_addr.clone(), e.to_string()))?;
        tracing::info!(addr = %self.shared.listen_addr, "p2p server listening");

        tokio::spawn(peer_maintenance_loop(Arc::clone(&self.shared)));
        tokio::spawn(peer_discovery_loop(Arc::clone(&self.shared)));
        tokio::spawn(seen_gc_loop(Arc::clone(&self.shared)));

        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .map_err(|e| NetworkError::ConnectFailed(self.shared.listen_addr.clone(), e.to_string()))?;
            spawn_connection(Arc::clone(&self.shared), stream, peer_addr.to_string(), false);
        }
    }
}

fn spawn_connection(shared: Arc<Shared>, stream: TcpStream, addr: String, we_initiated: bool) {
    tokio::spawn(async move {
        if let Err(err) = handle_connection(shared, stream, addr.clone(), we_initiated).await {
            tracing::warn!(peer = %addr, error = %err, "peer connection closed");
        }
    });
}

async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    addr: String,
    we_initiated: bool,
) -> NodeResult<()> {
    let (mut reader, mut writer) = stream.into_split();

    let hello_timeout = Duration::from_secs(shared.config.hello_timeout_secs);
    let our_hello = hello_message(&shared).await;

    if we_initiated {
        write_message(&mut writer, &our_hello).await?;
    }

    let their_hello = tokio::time::timeout(hello_timeout, read_message(&mut reader))
        .await
        .map_err(|_| NetworkError::HandshakeTimeout(addr.clone()))??;

    if their_hello.msg_type != MessageType::Hello {
        return Err(NetworkError::ConnectFailed(addr.clone(), "expected HELLO".to_string()).into());
    }
    let their_version = their_hello
        .payload
        .get("protocol_version")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if !is_protocol_compatible(&their_version, PROTOCOL_VERSION) {
        return Err(NetworkError::IncompatibleProtocol(addr.clone(), their_version).into());
    }
    let peer_node_id = their_hello.sender_id.clone();

    if !we_initiated {
        write_message(&mut writer, &our_hello).await?;
    }

    let (tx, mut rx) = mpsc::channel::<NetworkMessage>(128);
    {
        let mut peers = shared.peers.lock().await;
        peers.insert(PeerHandle {
            info: PeerInfo::new(peer_node_id.clone(), addr.clone(), their_version),
            sender: tx,
        });
    }

    let writer_shared = Arc::clone(&shared);
    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if write_message(&mut writer, &message).await.is_err() {
                break;
            }
            writer_shared.stats.lock().await.messages_sent += 1;
        }
    });

    let read_timeout = Duration::from_secs(shared.config.read_timeout_secs);
    let result = read_loop(Arc::clone(&shared), &mut reader, &peer_node_id, read_timeout).await;

    writer_task.abort();
    shared.peers.lock().await.remove(&peer_node_id);
    result
}

async fn read_loop<R: AsyncReadExt + Unpin>(
    shared: Arc<Shared>,
    reader: &mut R,
    peer_node_id: &str,
    read_timeout: Duration,
) -> NodeResult<()> {
    loop {
        let message = tokio::time::timeout(read_timeout, read_message(reader)).await;
        let message = match message {
            Ok(result) => result?,
            Err(_) => return Ok(()), // idle peer, let maintenance prune it
        };

        shared.stats.lock().await.messages_received += 1;

        let approx_size = message.payload.to_string().len() as u64;
        let allowed = {
            let mut limiters = shared.rate_limiters.lock().await;
            let limiter = limiters.entry(peer_node_id.to_string()).or_default();
            limiter.check(approx_size, &shared.config.rate_limit, Instant::now())
        };
        if !allowed {
            shared.stats.lock().await.messages_dropped_rate_limited += 1;
            continue;
        }

        if let Some(mut peers) = shared.peers.try_lock().ok() {
            if let Some(handle) = peers.get_mut(peer_node_id) {
                handle.info.touch();
            }
        }

        dispatch(&shared, message, peer_node_id).await;
    }
}

async fn dispatch(shared: &Arc<Shared>, message: NetworkMessage, from: &str) {
    if let Err(err) = dispatch_inner(shared, message, from).await {
        tracing::debug!(peer = from, error = %err, "message handling failed");
        if is_demotable(&err) {
            if let Some(handle) = shared.peers.lock().await.get_mut(from) {
                handle.info.penalize(REPUTATION_PENALTY);
            }
        }
    }
}

/// Applied when a received block or transaction fails structural or
/// cryptographic validation. Advisory only — it never gates validation,
/// only flood/sync ordering preference (see `PeerInfo::reputation`).
const REPUTATION_PENALTY: i64 = 10;

/// Applied when a peer-sourced block clears the full verification pipeline.
/// Advisory only, same as the penalty it offsets.
const BLOCK_ACCEPTED_REPUTATION_REWARD: i64 = 1;

fn is_demotable(err: &NodeError) -> bool {
    matches!(
        err,
        NodeError::Consensus(FractalChainError::Structural(_))
            | NodeError::Consensus(FractalChainError::Crypto(_))
    )
}

async fn dispatch_inner(shared: &Arc<Shared>, message: NetworkMessage, from: &str) -> NodeResult<()> {
    match message.msg_type {
        MessageType::Hello => Ok(()),

        MessageType::GetPeers => {
            let addresses = shared.peers.lock().await.known_addresses();
            let reply = reply_message(shared, MessageType::Peers, serde_json::json!({ "peers": addresses }));
            shared.send_to(from, reply).await
        }

        MessageType::Peers => {
            if let Some(addresses) = message.payload.get("peers").and_then(|v| v.as_array()) {
                let mut peers = shared.peers.lock().await;
                for (i, addr) in addresses.iter().enumerate() {
                    if let Some(addr) = addr.as_str() {
                        peers.remember_address(format!("{from}-discovered-{i}"), addr.to_string());
                    }
                }
            }
            Ok(())
        }

        MessageType::NewBlock | MessageType::BlockAnnouncement => {
            let is_new = shared.seen.lock().await.record(&message.msg_id);
            if !is_new {
                return Ok(());
            }
            let block: Block = serde_json::from_value(
                message
                    .payload
                    .get("block")
                    .cloned()
                    .ok_or_else(|| NetworkError::ConnectFailed(from.to_string(), "missing block".to_string()))?,
            )
            .map_err(|e| NetworkError::ConnectFailed(from.to_string(), e.to_string()))?;

            accept_block(shared, block.clone()).await?;
            if let Some(handle) = shared.peers.lock().await.get_mut(from) {
                handle.info.reward(BLOCK_ACCEPTED_REPUTATION_REWARD);
            }
            shared.broadcast(message, Some(from)).await;
            Ok(())
        }

        MessageType::NewTransaction => {
            let is_new = shared.seen.lock().await.record(&message.msg_id);
            if !is_new {
                return Ok(());
            }
            let tx: Transaction = serde_json::from_value(
                message
                    .payload
                    .get("transaction")
                    .cloned()
                    .ok_or_else(|| NetworkError::ConnectFailed(from.to_string(), "missing transaction".to_string()))?,
            )
            .map_err(|e| NetworkError::ConnectFailed(from.to_string(), e.to_string()))?;

            shared.chain.lock().await.add_transaction(tx)?;
            shared.broadcast(message, Some(from)).await;
            Ok(())
        }

        MessageType::GetChainInfo => {
            let (height, hash) = {
                let chain = shared.chain.lock().await;
                (chain.chain_length(), chain.get_latest().block_hash.clone())
            };
            let reply = reply_message(
                shared,
                MessageType::ChainInfo,
                serde_json::json!({ "height": height, "latest_hash": hash }),
            );
            shared.send_to(from, reply).await
        }

        MessageType::ChainInfo => {
            let their_height = message.payload.get("height").and_then(|v| v.as_u64()).unwrap_or(0);
            let our_height = shared.chain.lock().await.chain_length();
            if their_height > our_height {
                request_sync(shared, from, our_height, their_height).await?;
            }
            Ok(())
        }

        MessageType::GetBlocks => {
            let start = message.payload.get("start").and_then(|v| v.as_u64()).unwrap_or(0);
            let end = message.payload.get("end").and_then(|v| v.as_u64()).unwrap_or(start);
            let blocks: Vec<Block> = {
                let chain = shared.chain.lock().await;
                (start..=end).filter_map(|i| chain.by_index(i).cloned()).collect()
            };
            let reply = reply_message(shared, MessageType::Blocks, serde_json::json!({ "blocks": blocks }));
            shared.send_to(from, reply).await
        }

        MessageType::Blocks => {
            let blocks: Vec<Block> = serde_json::from_value(
                message.payload.get("blocks").cloned().unwrap_or(serde_json::json!([])),
            )
            .unwrap_or_default();
            for block in blocks {
                if accept_block(shared, block).await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        MessageType::Ping => {
            let nonce = message.payload.get("nonce").cloned().unwrap_or(serde_json::json!(null));
            let reply = reply_message(shared, MessageType::Pong, serde_json::json!({ "nonce": nonce }));
            shared.send_to(from, reply).await
        }

        MessageType::Pong => Ok(()),

        MessageType::Error => {
            let text = message.payload.get("message").and_then(|v| v.as_str()).unwrap_or("");
            tracing::debug!(peer = from, message = text, "peer reported an error");
            Ok(())
        }

        MessageType::Unknown => {
            tracing::debug!(peer = from, "dropped message of unrecognized type");
            Ok(())
        }
    }
}

/// Runs the two-stage verification pipeline, appends the block to the
/// shared chain state, and persists it and the balances it touched — the
/// same durability contract a locally mined block gets in
/// `Node::accept_mined_blocks`, applied here so a block learned from a peer
/// survives a restart too.
async fn accept_block(shared: &Arc<Shared>, block: Block) -> NodeResult<()> {
    let mut chain = shared.chain.lock().await;
    let previous = if block.index == 0 {
        None
    } else {
        chain.by_index(block.index - 1).cloned()
    };
    let reward = chain.block_reward();
    let now = now_secs();
    consensus::quick_check(&block, previous.as_ref(), reward, now)?;
    consensus::full_verify(
        &block,
        previous.as_ref(),
        reward,
        now,
        block.difficulty_target,
        &shared.fractal_config,
    )?;
    chain.add_block(block.clone(), now)?;

    shared.store.store_block(&block)?;
    let mut touched: Vec<&str> = block
        .transactions
        .iter()
        .flat_map(|tx| [tx.sender.as_str(), tx.recipient.as_str()])
        .collect();
    touched.sort_unstable();
    touched.dedup();
    for address in touched {
        shared.store.set_balance(address, chain.balance(address))?;
    }

    Ok(())
}

/// Requests the next window of blocks from `from`, one GET_BLOCKS per
/// window, throttled so we never fire more than one request per interval.
async fn request_sync(shared: &Arc<Shared>, from: &str, our_height: u64, their_height: u64) -> NodeResult<()> {
    let window = shared.config.sync_window;
    let interval = Duration::from_millis(shared.config.sync_request_interval_millis);
    let mut start = our_height;
    while start < their_height {
        let end = (start + window - 1).min(their_height - 1);
        let request = reply_message(
            shared,
            MessageType::GetBlocks,
            serde_json::json!({ "start": start, "end": end }),
        );
        shared.send_to(from, request).await?;
        start = end + 1;
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

async fn hello_message(shared: &Arc<Shared>) -> NetworkMessage {
    let height = shared.chain.lock().await.chain_length();
    NetworkMessage::new(
        MessageType::Hello,
        serde_json::json!({
            "node_id": shared.node_id,
            "protocol_version": shared.config.protocol_version,
            "chain_height": height,
        }),
        Uuid::new_v4().to_string(),
        now_secs(),
        shared.node_id.clone(),
    )
}

fn reply_message(shared: &Arc<Shared>, msg_type: MessageType, payload: serde_json::Value) -> NetworkMessage {
    NetworkMessage::new(
        msg_type,
        payload,
        Uuid::new_v4().to_string(),
        now_secs(),
        shared.node_id.clone(),
    )
}

/// Pings every connected peer every `ping_interval_secs` and prunes peers
/// idle past `peer_stale_after_secs`.
async fn peer_maintenance_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(shared.config.ping_interval_secs));
    loop {
        ticker.tick().await;
        let nonce = rand::random::<u64>();
        let ping = reply_message(&shared, MessageType::Ping, serde_json::json!({ "nonce": nonce }));
        shared.broadcast(ping, None).await;

        let stale = shared.peers.lock().await.stale_peer_ids(shared.config.peer_stale_after_secs);
        for id in stale {
            shared.peers.lock().await.remove(&id);
        }
        shared.peers.lock().await.decay_reputations();
    }
}

/// Requests peer lists from every connected peer every
/// `peer_discovery_interval_secs`.
async fn peer_discovery_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(shared.config.peer_discovery_interval_secs));
    loop {
        ticker.tick().await;
        let request = reply_message(&shared, MessageType::GetPeers, serde_json::json!({}));
        shared.broadcast(request, None).await;
    }
}

/// Clears the seen-message-id set every `seen_message_gc_interval_secs`.
async fn seen_gc_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(shared.config.seen_message_gc_interval_secs));
    loop {
        ticker.tick().await;
        shared.seen.lock().await.clear();
    }
}
