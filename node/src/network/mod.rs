//! P2P networking: a plain length-prefixed JSON protocol over TCP, the same
//! shape as `original_source/network/p2p.py` and `protocol.py` — not the
//! teacher's libp2p stack, which speaks a different (and far heavier)
//! transport than this spec calls for.

pub mod message;
pub mod peer;
pub mod rate_limit;
pub mod seen;
pub mod server;

pub use message::{MessageType, NetworkMessage, MAX_MESSAGE_SIZE};
pub use peer::{PeerHandle, PeerInfo, PeerTable};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use seen::SeenSet;
pub use server::{NetworkHandle, NetworkStats, P2pServer};
