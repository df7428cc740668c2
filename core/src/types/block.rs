//! Block and fractal-proof record types, canonical hashing, and structural
//! validation: hash-chain linkage, coinbase shape, timestamp bounds, and
//! Merkle root agreement. The fractal proof's own mathematical validity —
//! dimension, fit quality, seed re-derivation — is the job of
//! `consensus::verifier`, not this module.

use crate::crypto::{self, canonical_json_bytes};
use crate::error::{ConsensusError, CryptoError, EconomicError, FractalChainError, StructuralError};
use crate::merkle;
use crate::types::address::{COINBASE, GENESIS};
use crate::types::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Earliest acceptable block timestamp (2020-01-01T00:00:00Z).
pub const MIN_TIMESTAMP: f64 = 1_577_836_800.0;
/// Maximum allowed drift of a block's timestamp ahead of wall clock.
pub const MAX_FUTURE_DRIFT_SECS: f64 = 7200.0;

pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const _: () = assert!(ZERO_HASH.len() == 64);

/// The mined proof accompanying every non-genesis block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalProof {
    pub nonce: u64,
    pub fractal_seed: String,
    pub solution_point_real: f64,
    pub solution_point_imag: f64,
    pub fractal_dimension: f64,
    pub fractal_data_hash: String,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
struct HeaderHashFields<'a> {
    index: u64,
    timestamp: f64,
    previous_hash: &'a str,
    merkle_root: &'a str,
    miner_address: &'a str,
    nonce: u64,
}

#[derive(Debug, Serialize)]
struct BlockHashFields<'a> {
    index: u64,
    timestamp: f64,
    previous_hash: &'a str,
    merkle_root: &'a str,
    miner_address: &'a str,
    fractal_proof: Option<&'a FractalProof>,
}

/// A FractalChain block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub miner_address: String,
    pub fractal_proof: Option<FractalProof>,
    pub merkle_root: String,
    pub block_hash: String,
    pub difficulty_target: f64,
    pub header_difficulty_bits: u8,
}

impl Block {
    /// Recomputes the Merkle root of this block's transaction hashes.
    pub fn calculate_merkle_root(&self) -> String {
        let hashes: Vec<String> = self.transactions.iter().map(|tx| tx.tx_hash.clone()).collect();
        merkle::merkle_root(&hashes)
    }

    /// The cheap header hash used by the pre-filter, for a candidate
    /// `nonce` not yet bound to a full fractal proof.
    pub fn header_hash_for_nonce(&self, nonce: u64) -> Result<String, CryptoError> {
        crypto::canonical_hash(&HeaderHashFields {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            merkle_root: &self.merkle_root,
            miner_address: &self.miner_address,
            nonce,
        })
    }

    /// Recomputes the full block hash from the current field values,
    /// including the fractal proof if present.
    pub fn calculate_hash(&self) -> Result<String, CryptoError> {
        crypto::canonical_hash(&BlockHashFields {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            merkle_root: &self.merkle_root,
            miner_address: &self.miner_address,
            fractal_proof: self.fractal_proof.as_ref(),
        })
    }

    /// Bytes that `calculate_hash` hashes, exposed so the miner and
    /// verifier can reuse the exact canonicalization.
    pub fn hash_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        canonical_json_bytes(&BlockHashFields {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            merkle_root: &self.merkle_root,
            miner_address: &self.miner_address,
            fractal_proof: self.fractal_proof.as_ref(),
        })
    }

    /// Builds the fixed genesis block: index 0, zero previous hash, a
    /// single sender=GENESIS transaction, and no fractal proof.
    pub fn genesis() -> Self {
        let genesis_tx = Transaction {
            sender: GENESIS.to_string(),
            recipient: GENESIS.to_string(),
            amount: 0.0,
            fee: 0.0,
            timestamp: MIN_TIMESTAMP,
            signature: "genesis".to_string(),
            public_key: String::new(),
            tx_hash: String::new(),
        };
        let mut genesis_tx = genesis_tx;
        genesis_tx.tx_hash = genesis_tx.calculate_hash().expect("genesis tx hashes");

        let mut block = Block {
            index: 0,
            timestamp: MIN_TIMESTAMP,
            transactions: vec![genesis_tx],
            previous_hash: ZERO_HASH.to_string(),
            miner_address: GENESIS.to_string(),
            fractal_proof: None,
            merkle_root: String::new(),
            block_hash: String::new(),
            difficulty_target: 1.5,
            header_difficulty_bits: 16,
        };
        block.merkle_root = block.calculate_merkle_root();
        block.block_hash = block.calculate_hash().expect("genesis block hashes");
        block
    }

    /// Total fees of non-coinbase transactions in this block.
    pub fn total_fees(&self) -> f64 {
        self.transactions
            .iter()
            .filter(|tx| tx.sender != COINBASE)
            .map(|tx| tx.fee)
            .sum()
    }

    fn coinbase_transactions(&self) -> Vec<&Transaction> {
        self.transactions.iter().filter(|tx| tx.sender == COINBASE).collect()
    }

    /// Validates hash-chain linkage, coinbase shape, timestamp bounds, and
    /// Merkle root / block hash agreement. Per-transaction signature and
    /// balance checks and the fractal proof's mathematical validity are not
    /// this function's job — see `chain::state::ChainState::add_block` and
    /// `consensus::verifier`.
    pub fn validate_structure(
        &self,
        previous: Option<&Block>,
        current_block_reward: f64,
        now_unix: f64,
    ) -> Result<(), FractalChainError> {
        if self.index == 0 {
            if self.previous_hash != ZERO_HASH {
                return Err(ConsensusError::BadPreviousHash.into());
            }
            if self.fractal_proof.is_some() {
                return Err(StructuralError::OutOfRange(
                    "genesis block must not carry a fractal proof".to_string(),
                )
                .into());
            }
        } else {
            let previous = previous.ok_or(ConsensusError::BadPreviousHash)?;
            if self.previous_hash != previous.block_hash {
                return Err(ConsensusError::BadPreviousHash.into());
            }
            if self.index != previous.index + 1 {
                return Err(ConsensusError::BadIndex.into());
            }
            if self.fractal_proof.is_none() {
                return Err(ConsensusError::MissingFractalProof.into());
            }

            let coinbase_txs = self.coinbase_transactions();
            if coinbase_txs.is_empty() {
                return Err(StructuralError::MissingCoinbase.into());
            }
            if coinbase_txs.len() > 1 {
                return Err(StructuralError::MultipleCoinbase.into());
            }
            if self.transactions.first().map(|t| t.sender.as_str()) != Some(COINBASE) {
                return Err(StructuralError::MissingCoinbase.into());
            }

            let coinbase_amount = coinbase_txs[0].amount;
            if coinbase_amount > current_block_reward + self.total_fees() {
                return Err(EconomicError::CoinbaseOverflow.into());
            }
        }

        if self.timestamp < MIN_TIMESTAMP {
            return Err(StructuralError::BadTimestamp(format!(
                "{} is before minimum timestamp {}",
                self.timestamp, MIN_TIMESTAMP
            ))
            .into());
        }
        if self.timestamp > now_unix + MAX_FUTURE_DRIFT_SECS {
            return Err(StructuralError::BadTimestamp(format!(
                "{} is too far in the future",
                self.timestamp
            ))
            .into());
        }

        if self.merkle_root != self.calculate_merkle_root() {
            return Err(ConsensusError::MerkleRootMismatch.into());
        }

        for tx in &self.transactions {
            tx.validate()?;
        }

        if self.block_hash != self.calculate_hash()? {
            return Err(ConsensusError::BlockHashMismatch.into());
        }

        Ok(())
    }
}
