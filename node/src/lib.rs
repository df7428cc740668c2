//! FractalChain node runtime library: persistence, the P2P protocol, the
//! mining worker, and the `Node` facade that wires them around
//! `fractalchain_core`'s consensus core.
//!
//! `main.rs` is a thin binary shell over this library, the same split the
//! teacher keeps between its `node` library crate and `node/src/main.rs`.

pub mod config;
pub mod error;
pub mod miner;
pub mod network;
pub mod node;
pub mod storage;

pub use config::Config;
pub use error::{NodeError, NodeResult};
pub use node::{ChainInfo, Node, WalletKeyMaterial};
pub use storage::SledStore;
