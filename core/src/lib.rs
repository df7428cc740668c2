//! Consensus core for FractalChain: the fractal proof-of-work engine,
//! the block/transaction data model, chain state (including the
//! mempool), and the staking ledger.
//!
//! This crate is synchronous and has no networking or async dependency —
//! every operation here is a pure function of its inputs, so the same
//! block or transaction hashes and verifies identically on every node.

pub mod chain;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod staking;
pub mod types;

pub use chain::{ChainConfig, ChainState};
pub use error::{FractalChainError, FractalChainResult};
pub use staking::{StakePosition, StakingConfig, StakingLedger};
pub use types::{Block, FractalProof, Transaction};
