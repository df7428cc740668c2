//! `fractalchain-node` binary: wires logging, a persistent store, and a
//! `Node` together and drives the P2P server and an interrupt-triggered
//! graceful shutdown.
//!
//! There is no CLI flag or config-file parsing here (spec.md's non-goals);
//! listen address and data directory come from environment variables with
//! hardcoded fallbacks, and everything else is `Config::default()`.

use std::sync::Arc;

use anyhow::Context;
use fractalchain_node::{Config, Node, SledStore};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let data_dir = std::env::var("FRACTALCHAIN_DATA_DIR").unwrap_or_else(|_| "./data/fractalchain".to_string());
    let listen_addr = std::env::var("FRACTALCHAIN_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:7676".to_string());
    let node_id = std::env::var("FRACTALCHAIN_NODE_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
    let started_at = chrono::Utc::now().to_rfc3339();

    tracing::info!(%node_id, %listen_addr, %data_dir, %started_at, "starting fractalchain node");

    let store = SledStore::open(&data_dir)
        .with_context(|| format!("opening fractalchain data store at {data_dir}"))?;
    let (node, server) = Node::bootstrap(Config::default(), node_id, listen_addr, store)
        .await
        .context("bootstrapping fractalchain node")?;

    let run_handle = tokio::spawn(server.run());

    tokio::select! {
        result = run_handle => {
            match result {
                Ok(Err(err)) => tracing::error!(error = %err, "p2p server exited with an error"),
                Err(err) => tracing::error!(error = %err, "p2p server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    drop(node);
    Ok(())
}
