//! Record types: addresses, transactions, and blocks.

pub mod address;
pub mod block;
pub mod transaction;

pub use block::{Block, FractalProof};
pub use transaction::Transaction;
