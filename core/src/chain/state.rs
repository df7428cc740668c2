//! `ChainState`: the single source of truth for the block list, account
//! balances, and the mempool.
//!
//! `add_block` validates a block's own structure (hash-chain linkage,
//! coinbase shape, timestamps, per-transaction signatures, and the
//! block-start balance check) and applies its balance deltas. It does
//! *not* re-run the fractal proof-of-work — that is `consensus::verifier`'s
//! job, invoked by the caller (the miner immediately after finding a
//! solution, or the node before accepting a block from a peer) prior to
//! calling `add_block`.

use std::collections::HashMap;

use crate::consensus::difficulty::{self, DifficultyConfig, DifficultyStats};
use crate::error::{EconomicError, FractalChainError, FractalChainResult};
use crate::types::address::{COINBASE, GENESIS};
use crate::types::{Block, Transaction};

/// Tunable economic parameters: reward schedule and the embedded
/// difficulty-retarget configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    pub initial_reward: f64,
    pub halving_interval: u64,
    pub min_reward: f64,
    pub difficulty: DifficultyConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            initial_reward: 50.0,
            halving_interval: 210_000,
            min_reward: 0.000_000_01,
            difficulty: DifficultyConfig::default(),
        }
    }
}

pub struct ChainState {
    config: ChainConfig,
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
    balances: HashMap<String, f64>,
}

impl ChainState {
    /// Opens a fresh chain seeded with the fixed genesis block.
    pub fn new(config: ChainConfig) -> Self {
        let genesis = Block::genesis();
        let mut state = Self {
            config,
            chain: Vec::new(),
            mempool: Vec::new(),
            balances: HashMap::new(),
        };
        state.apply_balances(&genesis);
        state.chain.push(genesis);
        state
    }

    fn apply_balances(&mut self, block: &Block) {
        for tx in &block.transactions {
            if tx.sender != COINBASE && tx.sender != GENESIS {
                *self.balances.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount + tx.fee;
            }
            *self.balances.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
        }
    }

    /// Validates every non-coinbase transaction's sender against the
    /// balance as of block start (not a running within-block ledger).
    fn validate_block_balances(&self, block: &Block) -> FractalChainResult<()> {
        for tx in &block.transactions {
            if tx.sender == COINBASE {
                continue;
            }
            let spendable = *self.balances.get(&tx.sender).unwrap_or(&0.0);
            if spendable < tx.amount + tx.fee {
                return Err(EconomicError::InsufficientBalance(tx.sender.clone()).into());
            }
        }
        Ok(())
    }

    /// Runs structural validation against the current tip, checks every
    /// non-coinbase sender's block-start balance, appends the block,
    /// applies balance deltas, and drops now-included transactions from
    /// the mempool by `tx_hash`.
    pub fn add_block(&mut self, block: Block, now_unix: f64) -> FractalChainResult<()> {
        let previous = self.chain.last();
        block.validate_structure(previous, self.block_reward(), now_unix)?;
        self.validate_block_balances(&block)?;

        self.apply_balances(&block);

        let included: std::collections::HashSet<&str> =
            block.transactions.iter().map(|tx| tx.tx_hash.as_str()).collect();
        self.mempool.retain(|tx| !included.contains(tx.tx_hash.as_str()));

        self.chain.push(block);
        Ok(())
    }

    /// Validates structure and signature, rejects insufficient spendable
    /// balance and duplicate `tx_hash`, otherwise appends to the mempool.
    /// No reservation of mempool slots by address: fee-priority ordering
    /// is applied only at block-building time, in `pending`.
    pub fn add_transaction(&mut self, tx: Transaction) -> FractalChainResult<()> {
        tx.validate()?;

        if tx.sender != COINBASE {
            let required = tx.amount + tx.fee;
            if self.balance(&tx.sender) < required {
                return Err(EconomicError::InsufficientBalance(tx.sender.clone()).into());
            }
        }

        if self.mempool.iter().any(|existing| existing.tx_hash == tx.tx_hash) {
            return Err(EconomicError::DuplicateTransaction(tx.tx_hash).into());
        }

        self.mempool.push(tx);
        Ok(())
    }

    pub fn get_latest(&self) -> &Block {
        self.chain.last().expect("chain always contains at least genesis")
    }

    pub fn by_index(&self, index: u64) -> Option<&Block> {
        self.chain.get(usize::try_from(index).ok()?)
    }

    pub fn by_hash(&self, hash: &str) -> Option<&Block> {
        self.chain.iter().find(|b| b.block_hash == hash)
    }

    pub fn chain_length(&self) -> u64 {
        self.chain.len() as u64
    }

    /// Confirmed balance minus the sum of `(amount + fee)` of pending
    /// outgoing transactions whose sender is `addr`.
    pub fn balance(&self, addr: &str) -> f64 {
        let confirmed = *self.balances.get(addr).unwrap_or(&0.0);
        let pending_outgoing: f64 = self
            .mempool
            .iter()
            .filter(|tx| tx.sender == addr)
            .map(|tx| tx.amount + tx.fee)
            .sum();
        confirmed - pending_outgoing
    }

    /// Up to `max_count` mempool transactions ordered by `fee desc`
    /// (stable on ties).
    pub fn pending(&self, max_count: usize) -> Vec<Transaction> {
        let mut sorted = self.mempool.clone();
        sorted.sort_by(|a, b| b.fee.partial_cmp(&a.fee).unwrap_or(std::cmp::Ordering::Equal));
        sorted.truncate(max_count);
        sorted
    }

    /// `(fractal_dimension_target, header_difficulty_bits)` that the next
    /// block must satisfy: the tip's own values, retargeted if the tip's
    /// height is exactly an adjustment boundary.
    pub fn difficulty(&self) -> (f64, u8) {
        let latest = self.get_latest();
        if !difficulty::is_retarget_height(latest.index, &self.config.difficulty) {
            return (latest.difficulty_target, latest.header_difficulty_bits);
        }

        let interval = self.config.difficulty.adjustment_interval as usize;
        let end = latest.index as usize;
        let start = end + 1 - interval;
        let timestamps: Vec<f64> = self.chain[start..=end].iter().map(|b| b.timestamp).collect();

        difficulty::retarget(
            &timestamps,
            latest.difficulty_target,
            latest.header_difficulty_bits,
            &self.config.difficulty,
        )
    }

    pub fn is_retarget_height(&self, height: u64) -> bool {
        difficulty::is_retarget_height(height, &self.config.difficulty)
    }

    /// `floor(height / halving_interval)` halvings of `initial_reward`,
    /// clamped below at `min_reward`, where `height` is the index of the
    /// next block to be mined (the chain's current length).
    pub fn block_reward(&self) -> f64 {
        let halvings = self.chain_length() / self.config.halving_interval;
        let reward = self.config.initial_reward / 2f64.powi(halvings as i32);
        reward.max(self.config.min_reward)
    }

    /// Advisory hashrate/retarget summary; never consulted by consensus.
    pub fn difficulty_stats(&self) -> DifficultyStats {
        let refs: Vec<&Block> = self.chain.iter().collect();
        difficulty::difficulty_stats(&refs, &self.config.difficulty)
    }

    /// Re-validates every block's structure against its predecessor. Does
    /// not re-run fractal verification — see the module-level note on
    /// `add_block`.
    pub fn is_valid_chain(&self) -> bool {
        for i in 1..self.chain.len() {
            let (previous, current) = (&self.chain[i - 1], &self.chain[i]);
            if current
                .validate_structure(Some(previous), self.reward_at(current.index), current.timestamp + 1.0)
                .is_err()
            {
                return false;
            }
        }
        true
    }

    fn reward_at(&self, height: u64) -> f64 {
        let halvings = height / self.config.halving_interval;
        let reward = self.config.initial_reward / 2f64.powi(halvings as i32);
        reward.max(self.config.min_reward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::block::ZERO_HASH;
    use crate::types::FractalProof;

    fn dummy_proof() -> FractalProof {
        FractalProof {
            nonce: 0,
            fractal_seed: "a".repeat(64),
            solution_point_real: 0.0,
            solution_point_imag: 0.0,
            fractal_dimension: 1.5,
            fractal_data_hash: "b".repeat(64),
            timestamp: 1_700_000_000.0,
        }
    }

    fn mine_block(
        previous: &Block,
        miner: &str,
        mut txs: Vec<Transaction>,
        coinbase_amount: f64,
        timestamp: f64,
    ) -> Block {
        let coinbase = Transaction::create_coinbase(
            miner.to_string(),
            coinbase_amount,
            previous.index + 1,
            timestamp,
        )
        .unwrap();
        let mut transactions = vec![coinbase];
        transactions.append(&mut txs);

        let mut block = Block {
            index: previous.index + 1,
            timestamp,
            transactions,
            previous_hash: previous.block_hash.clone(),
            miner_address: miner.to_string(),
            fractal_proof: Some(dummy_proof()),
            merkle_root: String::new(),
            block_hash: String::new(),
            difficulty_target: previous.difficulty_target,
            header_difficulty_bits: previous.header_difficulty_bits,
        };
        block.merkle_root = block.calculate_merkle_root();
        block.block_hash = block.calculate_hash().unwrap();
        block
    }

    #[test]
    fn genesis_bootstrap() {
        let state = ChainState::new(ChainConfig::default());
        assert_eq!(state.chain_length(), 1);
        let g = state.get_latest();
        assert_eq!(g.index, 0);
        assert_eq!(g.previous_hash, ZERO_HASH);
        assert_eq!(g.transactions.len(), 1);
        assert_eq!(g.transactions[0].sender, GENESIS);
        assert_eq!(state.block_reward(), 50.0);
    }

    #[test]
    fn mine_and_append_single_block() {
        let mut state = ChainState::new(ChainConfig::default());
        let genesis = state.get_latest().clone();
        let block = mine_block(&genesis, &"m".repeat(40), vec![], 50.0, 1_700_000_000.0);
        state.add_block(block, 1_700_000_100.0).unwrap();

        assert_eq!(state.chain_length(), 2);
        assert_eq!(state.balance(&"m".repeat(40)), 50.0);
        assert!(state.pending(10).is_empty());
    }

    #[test]
    fn send_and_include_a_transaction() {
        let mut state = ChainState::new(ChainConfig::default());
        let genesis = state.get_latest().clone();
        let kp_a = KeyPair::generate();
        let addr_a = kp_a.address();
        let addr_m = "m".repeat(40);
        let addr_b = "b".repeat(40);

        let block1 = mine_block(&genesis, &addr_a, vec![], 50.0, 1_700_000_000.0);
        state.add_block(block1.clone(), 1_700_000_100.0).unwrap();

        let tx = Transaction::new_signed(&kp_a, addr_b.clone(), 10.0, 0.1, 1_700_000_050.0).unwrap();
        state.add_transaction(tx.clone()).unwrap();

        let block2 = mine_block(&block1, &addr_m, vec![tx], 50.0, 1_700_000_200.0);
        state.add_block(block2, 1_700_000_300.0).unwrap();

        assert_eq!(state.balance(&addr_a), 50.0 - 10.0 - 0.1);
        assert_eq!(state.balance(&addr_b), 10.0);
        assert_eq!(state.balance(&addr_m), 50.0 + 0.1);
    }

    #[test]
    fn insufficient_balance_rejects_mempool_transaction() {
        let mut state = ChainState::new(ChainConfig::default());
        let genesis = state.get_latest().clone();
        let kp_a = KeyPair::generate();
        let addr_a = kp_a.address();

        let block1 = mine_block(&genesis, &addr_a, vec![], 5.0, 1_700_000_000.0);
        state.add_block(block1, 1_700_000_100.0).unwrap();

        let first = Transaction::new_signed(&kp_a, "b".repeat(40), 4.0, 0.1, 1_700_000_050.0).unwrap();
        state.add_transaction(first).unwrap();

        // confirmed 5.0, minus the 4.1 already pending leaves 0.9 spendable
        let second = Transaction::new_signed(&kp_a, "c".repeat(40), 1.0, 0.1, 1_700_000_060.0).unwrap();
        let err = state.add_transaction(second).unwrap_err();
        assert!(matches!(
            err,
            FractalChainError::Economic(EconomicError::InsufficientBalance(_))
        ));
    }

    #[test]
    fn is_valid_chain_holds_after_accepted_appends() {
        let mut state = ChainState::new(ChainConfig::default());
        let genesis = state.get_latest().clone();
        let block1 = mine_block(&genesis, &"m".repeat(40), vec![], 50.0, 1_700_000_000.0);
        state.add_block(block1.clone(), 1_700_000_100.0).unwrap();
        let block2 = mine_block(&block1, &"m".repeat(40), vec![], 50.0, 1_700_000_200.0);
        state.add_block(block2, 1_700_000_300.0).unwrap();

        assert!(state.is_valid_chain());
    }

    #[test]
    fn coinbase_overflow_is_rejected() {
        let mut state = ChainState::new(ChainConfig::default());
        let genesis = state.get_latest().clone();
        let block = mine_block(&genesis, &"m".repeat(40), vec![], 1_000.0, 1_700_000_000.0);
        let err = state.add_block(block, 1_700_000_100.0).unwrap_err();
        assert!(matches!(
            err,
            FractalChainError::Economic(crate::error::EconomicError::CoinbaseOverflow)
        ));
    }

    #[test]
    fn block_reward_halves_at_the_interval_boundary() {
        // mirrors the real 210,000-block boundary at a tractable scale:
        // height < interval pays full reward, height == interval halves it.
        let mut config = ChainConfig::default();
        config.halving_interval = 2;
        let mut state = ChainState::new(config);
        assert_eq!(state.block_reward(), 50.0); // chain length 1, height 1 < 2
        let genesis = state.get_latest().clone();
        let block1 = mine_block(&genesis, &"m".repeat(40), vec![], 50.0, 1_700_000_000.0);
        state.add_block(block1.clone(), 1_700_000_100.0).unwrap();
        assert_eq!(state.block_reward(), 25.0); // chain length 2, height 2 -> 1 halving
    }
}
