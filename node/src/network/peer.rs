//! Peer bookkeeping: the directory of known peers and the reputation score
//! supplemented from `original_source/network/p2p.py`'s peer-scoring
//! behavior (peers that misbehave — bad proofs, protocol violations — lose
//! reputation; peers that sync cleanly gain it).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::network::message::NetworkMessage;

/// Everything the node tracks about a connected or discovered peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub node_id: String,
    pub address: String,
    pub protocol_version: String,
    pub chain_height: u64,
    pub last_seen: f64,
    pub reputation: i64,
}

impl PeerInfo {
    pub fn new(node_id: String, address: String, protocol_version: String) -> Self {
        Self {
            node_id,
            address,
            protocol_version,
            chain_height: 0,
            last_seen: now_secs(),
            reputation: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = now_secs();
    }

    pub fn is_stale(&self, stale_after_secs: u64) -> bool {
        now_secs() - self.last_seen > stale_after_secs as f64
    }

    pub fn reward(&mut self, amount: i64) {
        self.reputation = self.reputation.saturating_add(amount);
    }

    pub fn penalize(&mut self, amount: i64) {
        self.reputation = self.reputation.saturating_sub(amount);
    }

    /// Pulls reputation one step back toward zero, so a peer that
    /// misbehaved once and then went quiet isn't punished forever.
    pub fn decay_reputation(&mut self) {
        self.reputation -= self.reputation.signum();
    }
}

pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// One connected peer's outbound channel: messages pushed here are written
/// to the socket by that peer's dedicated writer task.
pub struct PeerHandle {
    pub info: PeerInfo,
    pub sender: mpsc::Sender<NetworkMessage>,
}

/// The node's view of its peer set: connected peers with live outbound
/// channels, and addresses discovered via `GET_PEERS`/`PEERS` that are not
/// (yet) connected.
#[derive(Default)]
pub struct PeerTable {
    connected: HashMap<String, PeerHandle>,
    known_addresses: HashMap<String, String>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: PeerHandle) {
        self.known_addresses
            .insert(handle.info.node_id.clone(), handle.info.address.clone());
        self.connected.insert(handle.info.node_id.clone(), handle);
    }

    pub fn remove(&mut self, node_id: &str) -> Option<PeerHandle> {
        self.connected.remove(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut PeerHandle> {
        self.connected.get_mut(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.connected.contains_key(node_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.connected.keys().cloned().collect()
    }

    pub fn peer_infos(&self) -> Vec<PeerInfo> {
        self.connected.values().map(|h| h.info.clone()).collect()
    }

    pub fn known_addresses(&self) -> Vec<String> {
        self.known_addresses.values().cloned().collect()
    }

    pub fn remember_address(&mut self, node_id: String, address: String) {
        self.known_addresses.entry(node_id).or_insert(address);
    }

    /// Relaxes every connected peer's reputation one step toward neutral.
    /// Called from the same maintenance tick as staleness pruning.
    pub fn decay_reputations(&mut self) {
        for handle in self.connected.values_mut() {
            handle.info.decay_reputation();
        }
    }

    pub fn stale_peer_ids(&self, stale_after_secs: u64) -> Vec<String> {
        self.connected
            .values()
            .filter(|h| h.info.is_stale(stale_after_secs))
            .map(|h| h.info.node_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(node_id: &str) -> PeerHandle {
        let (tx, _rx) = mpsc::channel(8);
        PeerHandle {
            info: PeerInfo::new(node_id.to_string(), "127.0.0.1:9000".to_string(), "1.0.0".to_string()),
            sender: tx,
        }
    }

    #[test]
    fn insert_and_remove_round_trip() {
        let mut table = PeerTable::new();
        table.insert(handle("peer-a"));
        assert!(table.contains("peer-a"));
        assert_eq!(table.len(), 1);

        table.remove("peer-a");
        assert!(!table.contains("peer-a"));
    }

    #[test]
    fn stale_detection_respects_threshold() {
        let mut info = PeerInfo::new("peer-a".to_string(), "x".to_string(), "1.0.0".to_string());
        info.last_seen = now_secs() - 1000.0;
        assert!(info.is_stale(300));
        info.touch();
        assert!(!info.is_stale(300));
    }

    #[test]
    fn reputation_saturates_instead_of_overflowing() {
        let mut info = PeerInfo::new("peer-a".to_string(), "x".to_string(), "1.0.0".to_string());
        info.penalize(i64::MAX);
        info.penalize(10);
        assert_eq!(info.reputation, i64::MIN);
    }

    #[test]
    fn reputation_decays_one_step_toward_neutral() {
        let mut info = PeerInfo::new("peer-a".to_string(), "x".to_string(), "1.0.0".to_string());
        info.penalize(5);
        for _ in 0..5 {
            info.decay_reputation();
        }
        assert_eq!(info.reputation, 0);
        // decay never overshoots past zero
        info.decay_reputation();
        assert_eq!(info.reputation, 0);
    }
}
