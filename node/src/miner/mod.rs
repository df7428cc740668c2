//! The mining worker: a dedicated OS thread that searches nonces and
//! fractal centers for a block satisfying the current difficulty, cancelled
//! via an `AtomicBool` checked between attempts rather than mid-search. It
//! never holds the chain-state lock, and a stop request takes effect
//! between complete attempts, never mid-grid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use fractalchain_core::consensus::fractal::fractal_seed;
use fractalchain_core::consensus::{find_fractal_solution, fractal_data_hash, header_passes_prefilter, FractalConfig};
use fractalchain_core::types::{Block, FractalProof, Transaction};
use tokio::sync::mpsc;

use crate::network::peer::now_secs;

/// How many rehashed search points a single passing nonce is allowed before
/// the miner moves on to the next nonce.
const FRACTAL_ATTEMPTS_PER_NONCE: usize = 16;

/// Everything the worker thread needs to build and finalize a candidate
/// block; captured once from the shared chain state before the thread
/// starts so the search loop never needs to re-acquire it.
#[derive(Debug, Clone)]
pub struct MiningSnapshot {
    pub index: u64,
    pub previous_hash: String,
    pub pending_transactions: Vec<Transaction>,
    pub reward: f64,
    pub difficulty_target: f64,
    pub header_difficulty_bits: u8,
}

/// Point-in-time counters for `Node::get_mining_stats`.
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    pub is_mining: bool,
    pub attempts: u64,
    pub blocks_found: u64,
    pub last_hash_rate: f64,
}

/// Owns the worker thread's lifecycle. `start`/`stop` are idempotent: a
/// second `start` while already mining is a no-op, and `stop` on an idle
/// miner returns immediately.
pub struct Miner {
    stop_flag: Arc<AtomicBool>,
    stats: Arc<Mutex<MiningStats>>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new()
    }
}

impl Miner {
    pub fn new() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(MiningStats::default())),
            handle: None,
        }
    }

    pub fn is_mining(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stats(&self) -> MiningStats {
        self.stats.lock().expect("mining stats mutex poisoned").clone()
    }

    /// Spawns the worker thread. Found blocks are sent on `found_tx`; the
    /// receiver (owned by the `Node` facade) is responsible for re-verifying,
    /// appending to chain state, and broadcasting.
    pub fn start(
        &mut self,
        miner_address: String,
        fractal_config: FractalConfig,
        snapshot: MiningSnapshot,
        found_tx: mpsc::Sender<Block>,
    ) {
        if self.handle.is_some() {
            return;
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        {
            let mut stats = self.stats.lock().expect("mining stats mutex poisoned");
            stats.is_mining = true;
            stats.attempts = 0;
        }

        let stop = Arc::clone(&self.stop_flag);
        let stats = Arc::clone(&self.stats);
        self.handle = Some(thread::spawn(move || {
            mine_loop(snapshot, miner_address, fractal_config, stop, stats, found_tx);
        }));
    }

    /// Signals the worker to stop at its next checkpoint and joins it.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.stats.lock().expect("mining stats mutex poisoned").is_mining = false;
    }
}

fn mine_loop(
    snapshot: MiningSnapshot,
    miner_address: String,
    mut fractal_config: FractalConfig,
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<MiningStats>>,
    found_tx: mpsc::Sender<Block>,
) {
    fractal_config.target_dimension = snapshot.difficulty_target;

    let timestamp = now_secs();
    let coinbase_amount = snapshot.reward
        + snapshot
            .pending_transactions
            .iter()
            .map(|tx| tx.fee)
            .sum::<f64>();
    let coinbase = match Transaction::create_coinbase(
        miner_address.clone(),
        coinbase_amount,
        snapshot.index,
        timestamp,
    ) {
        Ok(tx) => tx,
        Err(_) => return,
    };

    let mut transactions = vec![coinbase];
    transactions.extend(snapshot.pending_transactions.clone());

    let mut block = Block {
        index: snapshot.index,
        timestamp,
        transactions,
        previous_hash: snapshot.previous_hash.clone(),
        miner_address: miner_address.clone(),
        fractal_proof: None,
        merkle_root: String::new(),
        block_hash: String::new(),
        difficulty_target: snapshot.difficulty_target,
        header_difficulty_bits: snapshot.header_difficulty_bits,
    };
    block.merkle_root = block.calculate_merkle_root();

    let search_start = Instant::now();
    let mut nonce: u64 = 0;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let header_hash = match block.header_hash_for_nonce(nonce) {
            Ok(h) => h,
            Err(_) => break,
        };

        {
            let mut s = stats.lock().expect("mining stats mutex poisoned");
            s.attempts += 1;
            let elapsed = search_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                s.last_hash_rate = s.attempts as f64 / elapsed;
            }
        }

        if header_passes_prefilter(&header_hash, block.header_difficulty_bits) {
            let seed = fractal_seed(&block.previous_hash, &miner_address, nonce);
            if let Some(solution) = find_fractal_solution(&seed, &fractal_config, FRACTAL_ATTEMPTS_PER_NONCE) {
                block.fractal_proof = Some(FractalProof {
                    nonce,
                    fractal_seed: seed,
                    solution_point_real: solution.center.0,
                    solution_point_imag: solution.center.1,
                    fractal_dimension: solution.dimension,
                    fractal_data_hash: fractal_data_hash(&solution.bitmap),
                    timestamp,
                });
                let Ok(hash) = block.calculate_hash() else { break };
                block.block_hash = hash;

                stats.lock().expect("mining stats mutex poisoned").blocks_found += 1;
                let _ = found_tx.blocking_send(block);
                break;
            }
        }

        nonce = nonce.wrapping_add(1);
        if stop.load(Ordering::SeqCst) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractalchain_core::types::Block as CoreBlock;
    use std::time::Duration;

    fn genesis_snapshot() -> MiningSnapshot {
        let genesis = CoreBlock::genesis();
        MiningSnapshot {
            index: 1,
            previous_hash: genesis.block_hash,
            pending_transactions: vec![],
            reward: 50.0,
            difficulty_target: 1.5,
            header_difficulty_bits: 4,
        }
    }

    #[tokio::test]
    async fn mining_with_a_trivial_target_finds_a_block_quickly() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut miner = Miner::new();
        // bits=4 means a single leading hex zero, and a wide epsilon on an
        // easy target dimension keeps this test fast and deterministic-ish.
        let mut fractal_config = FractalConfig::default();
        fractal_config.epsilon = 10.0;

        miner.start("m".repeat(40), fractal_config, genesis_snapshot(), tx);

        let block = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("mining should finish within timeout")
            .expect("channel should yield a block");

        assert_eq!(block.index, 1);
        assert!(block.fractal_proof.is_some());
        miner.stop();
    }

    #[test]
    fn stop_before_start_is_a_harmless_no_op() {
        let mut miner = Miner::new();
        miner.stop();
        assert!(!miner.is_mining());
    }
}
