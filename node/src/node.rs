//! `Node`: the facade wiring chain state, the staking ledger, persistent
//! storage, the P2P network, and the mining worker behind the shared-state
//! guards this consensus requires (a single chain-state writer, an
//! independent staking-ledger lock, and a miner that never touches either
//! lock while searching).
//!
//! This is the in-process surface a node exposes; a JSON-RPC server, CLI,
//! or HTML explorer would sit in front of it as a separate binary and is
//! out of this crate's scope.

use std::sync::Arc;

use fractalchain_core::chain::ChainState;
use fractalchain_core::consensus::{self, FractalConfig};
use fractalchain_core::crypto::KeyPair;
use fractalchain_core::error::FractalChainError;
use fractalchain_core::staking::{StakePosition, StakingLedger};
use fractalchain_core::types::{Block, Transaction};
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::error::NodeResult;
use crate::miner::{Miner, MiningSnapshot, MiningStats};
use crate::network::peer::now_secs;
use crate::network::{NetworkHandle, NetworkStats, P2pServer, PeerInfo};
use crate::storage::{SledStore, StoredTransaction};

/// Snapshot of the chain tip, returned by `get_chain_info`.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub height: u64,
    pub latest_hash: String,
    pub difficulty_target: f64,
    pub header_difficulty_bits: u8,
}

/// A freshly generated keypair, returned by `create_wallet`. The keystore
/// *file format* is an external collaborator's concern; this only hands
/// back the raw hex material.
#[derive(Debug, Clone)]
pub struct WalletKeyMaterial {
    pub address: String,
    pub private_key_hex: String,
    pub public_key_hex: String,
}

pub struct Node {
    chain: Arc<Mutex<ChainState>>,
    staking: Arc<Mutex<StakingLedger>>,
    store: Arc<SledStore>,
    network: NetworkHandle,
    miner: std::sync::Mutex<Miner>,
    fractal_config: FractalConfig,
    found_tx: mpsc::Sender<Block>,
}

impl Node {
    /// Rehydrates chain state from `store`, wires a `P2pServer` around it,
    /// and starts the background task that accepts locally mined blocks.
    /// The caller is responsible for driving the returned `P2pServer::run`.
    pub async fn bootstrap(
        config: Config,
        node_id: String,
        listen_addr: String,
        store: SledStore,
    ) -> NodeResult<(Arc<Node>, P2pServer)> {
        let mut chain_state = ChainState::new(config.chain.clone());
        let block_count = store.block_count()?;
        for index in 1..=block_count {
            if let Some(block) = store.get_block_by_index(index)? {
                chain_state.add_block(block, now_secs())?;
            }
        }

        let chain = Arc::new(Mutex::new(chain_state));
        let staking = Arc::new(Mutex::new(StakingLedger::new(config.staking.clone())));
        let store = Arc::new(store);

        let server = P2pServer::new(
            node_id,
            listen_addr,
            config.network.clone(),
            config.fractal.clone(),
            Arc::clone(&chain),
            Arc::clone(&store),
        );
        let network = server.handle();

        let (found_tx, found_rx) = mpsc::channel::<Block>(4);
        tokio::spawn(accept_mined_blocks(
            Arc::clone(&chain),
            Arc::clone(&store),
            network.clone(),
            config.fractal.clone(),
            found_rx,
        ));

        let node = Arc::new(Node {
            chain,
            staking,
            store,
            network,
            miner: std::sync::Mutex::new(Miner::new()),
            fractal_config: config.fractal,
            found_tx,
        });

        Ok((node, server))
    }

    pub async fn get_chain_info(&self) -> ChainInfo {
        let chain = self.chain.lock().await;
        let (difficulty_target, header_difficulty_bits) = chain.difficulty();
        ChainInfo {
            height: chain.chain_length(),
            latest_hash: chain.get_latest().block_hash.clone(),
            difficulty_target,
            header_difficulty_bits,
        }
    }

    pub async fn get_block_by_index(&self, index: u64) -> Option<Block> {
        self.chain.lock().await.by_index(index).cloned()
    }

    pub async fn get_block_by_hash(&self, hash: &str) -> Option<Block> {
        self.chain.lock().await.by_hash(hash).cloned()
    }

    pub async fn get_latest_block(&self) -> Block {
        self.chain.lock().await.get_latest().clone()
    }

    /// Checks the durable store (confirmed transactions) first, then falls
    /// back to a linear scan of the mempool.
    pub async fn get_transaction(&self, tx_hash: &str) -> NodeResult<Option<StoredTransaction>> {
        if let Some(stored) = self.store.get_transaction(tx_hash)? {
            return Ok(Some(stored));
        }
        let chain = self.chain.lock().await;
        Ok(chain
            .pending(usize::MAX)
            .into_iter()
            .find(|tx| tx.tx_hash == tx_hash)
            .map(|transaction| StoredTransaction {
                transaction,
                block_hash: String::new(),
            }))
    }

    pub async fn get_pending_transactions(&self, max_count: usize) -> Vec<Transaction> {
        self.chain.lock().await.pending(max_count)
    }

    pub async fn get_balance(&self, address: &str) -> f64 {
        self.chain.lock().await.balance(address)
    }

    /// Validates and enqueues a transaction, then floods it to every peer.
    pub async fn submit_transaction(&self, tx: Transaction) -> NodeResult<()> {
        self.chain.lock().await.add_transaction(tx.clone())?;
        self.network.broadcast_transaction(&tx).await;
        Ok(())
    }

    /// Snapshots the current tip and mempool and starts the mining worker.
    /// A no-op if mining is already in progress.
    pub async fn start_mining(&self, miner_address: String) -> NodeResult<()> {
        let snapshot = {
            let chain = self.chain.lock().await;
            let (difficulty_target, header_difficulty_bits) = chain.difficulty();
            MiningSnapshot {
                index: chain.chain_length(),
                previous_hash: chain.get_latest().block_hash.clone(),
                pending_transactions: chain.pending(1000),
                reward: chain.block_reward(),
                difficulty_target,
                header_difficulty_bits,
            }
        };

        let mut miner = self.miner.lock().expect("miner mutex poisoned");
        miner.start(
            miner_address,
            self.fractal_config.clone(),
            snapshot,
            self.found_tx.clone(),
        );
        Ok(())
    }

    /// Signals the worker to stop and blocks until it has. Callers on a
    /// tokio worker thread should wrap this in `spawn_blocking`.
    pub fn stop_mining(&self) {
        self.miner.lock().expect("miner mutex poisoned").stop();
    }

    pub fn get_mining_stats(&self) -> MiningStats {
        self.miner.lock().expect("miner mutex poisoned").stats()
    }

    pub async fn stake(
        &self,
        address: &str,
        amount: f64,
        lock_period: u64,
        timestamp: f64,
    ) -> NodeResult<usize> {
        let current_block = self.chain.lock().await.chain_length();
        let index = self
            .staking
            .lock()
            .await
            .create_stake(address, amount, lock_period, current_block, timestamp)
            .map_err(FractalChainError::from)?;
        Ok(index)
    }

    pub async fn get_stake_positions(&self, address: &str) -> Vec<StakePosition> {
        self.staking.lock().await.get_stake_positions(address).to_vec()
    }

    pub async fn initiate_withdrawal(&self, address: &str, index: usize) -> NodeResult<f64> {
        let current_block = self.chain.lock().await.chain_length();
        let payout = self
            .staking
            .lock()
            .await
            .initiate_withdrawal(address, index, current_block)
            .map_err(FractalChainError::from)?;
        Ok(payout)
    }

    pub async fn complete_withdrawal(&self, address: &str, index: usize) -> NodeResult<f64> {
        let total = self
            .staking
            .lock()
            .await
            .complete_withdrawal(address, index)
            .map_err(FractalChainError::from)?;
        Ok(total)
    }

    pub async fn get_peer_info(&self) -> Vec<PeerInfo> {
        self.network.peer_infos().await
    }

    pub async fn get_network_stats(&self) -> NetworkStats {
        self.network.stats().await
    }

    pub async fn connect_to_peer(&self, addr: &str) -> NodeResult<()> {
        self.network.connect(addr).await
    }

    /// Generates a fresh secp256k1 keypair. Persisting it to a keystore
    /// file is the wallet collaborator's job, not this node's.
    pub fn create_wallet(&self) -> WalletKeyMaterial {
        let keypair = KeyPair::generate();
        WalletKeyMaterial {
            address: keypair.address(),
            private_key_hex: keypair.export_private_key_hex(),
            public_key_hex: keypair.export_public_key_hex(),
        }
    }

    pub fn address_from_private_key(&self, private_key_hex: &str) -> NodeResult<String> {
        let keypair = KeyPair::from_private_key_hex(private_key_hex).map_err(FractalChainError::from)?;
        Ok(keypair.address())
    }
}

/// Drains mined blocks from the miner, re-verifies, appends, persists, and
/// broadcasts each one. Runs for the lifetime of the node; the channel only
/// closes when every `Node`/`Miner` handle has been dropped.
async fn accept_mined_blocks(
    chain: Arc<Mutex<ChainState>>,
    store: Arc<SledStore>,
    network: NetworkHandle,
    fractal_config: FractalConfig,
    mut found_rx: mpsc::Receiver<Block>,
) {
    while let Some(block) = found_rx.recv().await {
        let outcome: NodeResult<()> = async {
            let mut chain = chain.lock().await;
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
                &fractal_config,
            )?;
            chain.add_block(block.clone(), now)?;
            store.store_block(&block)?;
            for address in touched_addresses(&block) {
                store.set_balance(&address, chain.balance(&address))?;
            }
            drop(chain);
            network.broadcast_block(&block).await;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            tracing::warn!(error = %err, "locally mined block was rejected on append");
        }
    }
}

/// Every distinct sender/recipient address in a block, for refreshing the
/// `balances` storage tree after it is applied to chain state.
fn touched_addresses(block: &Block) -> Vec<String> {
    let mut addresses: Vec<String> = block
        .transactions
        .iter()
        .flat_map(|tx| [tx.sender.clone(), tx.recipient.clone()])
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}
