//! Append-only block store, account balance ledger, mempool, and the
//! block-reward schedule. The mempool lives here rather than in the node
//! runtime: deriving a spendable balance needs both confirmed balances and
//! pending outgoing transactions under one lock domain.

pub mod state;

pub use state::{ChainConfig, ChainState};
