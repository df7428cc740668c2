//! The node's in-process configuration: every tunable chain, staking, and
//! network constant gathered into one struct with a `Default` impl. There
//! is no file format and no environment-variable reads here — CLI/config-
//! file parsing is an external collaborator's job.

use fractalchain_core::chain::ChainConfig;
use fractalchain_core::consensus::{DifficultyConfig, FractalConfig};
use fractalchain_core::staking::StakingConfig;

use crate::network::{RateLimitConfig, MAX_MESSAGE_SIZE};

/// Protocol version this build speaks. Peers are accepted iff their
/// advertised version shares this major component.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Top-level configuration for a node's chain, staking, and network
/// parameters. Every field is overridable by the caller constructing it.
#[derive(Debug, Clone)]
pub struct Config {
    pub chain: ChainConfig,
    pub fractal: FractalConfig,
    pub staking: StakingConfig,
    pub network: NetworkConfig,
    pub max_block_size_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            fractal: FractalConfig::default(),
            staking: StakingConfig::default(),
            network: NetworkConfig::default(),
            max_block_size_bytes: 1024 * 1024,
        }
    }
}

/// Peer-lifecycle and propagation timings, and the per-peer rate limit.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub protocol_version: String,
    pub max_message_size: usize,
    pub peer_stale_after_secs: u64,
    pub ping_interval_secs: u64,
    pub peer_discovery_interval_secs: u64,
    pub seen_message_gc_interval_secs: u64,
    pub hello_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub get_blocks_timeout_secs: u64,
    pub sync_window: u64,
    pub sync_request_interval_millis: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
            peer_stale_after_secs: 300,
            ping_interval_secs: 30,
            peer_discovery_interval_secs: 60,
            seen_message_gc_interval_secs: 300,
            hello_timeout_secs: 10,
            read_timeout_secs: 60,
            get_blocks_timeout_secs: 30,
            sync_window: 100,
            sync_request_interval_millis: 100,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// `major.minor.patch` compatibility check: a peer is accepted only if its
/// advertised major version matches ours exactly.
pub fn is_protocol_compatible(advertised: &str, ours: &str) -> bool {
    let major = |v: &str| v.split('.').next().and_then(|s| s.parse::<u32>().ok());
    match (major(advertised), major(ours)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Also exposes the retarget and staking sub-configs for callers that only
/// need those pieces (e.g. constructing a `ChainState` directly in tests).
pub fn difficulty_config(config: &Config) -> DifficultyConfig {
    config.chain.difficulty.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_mismatch_is_incompatible() {
        assert!(is_protocol_compatible("1.0.0", PROTOCOL_VERSION));
        assert!(is_protocol_compatible("1.4.2", PROTOCOL_VERSION));
        assert!(!is_protocol_compatible("2.0.0", PROTOCOL_VERSION));
        assert!(!is_protocol_compatible("garbage", PROTOCOL_VERSION));
    }
}
