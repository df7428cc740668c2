//! spec.md §8 scenario 7: three nodes, A—B—C with B bridging, A mines a
//! block, and it floods to C via B without B re-delivering it back to A.
//!
//! Runs real TCP connections and a real (easy-target) mining search, so
//! this is slower and less deterministic than the unit tests elsewhere;
//! kept to one scenario rather than a grid of topologies.

use std::time::Duration;

use fractalchain_core::consensus::FractalConfig;
use fractalchain_node::{Config, Node, SledStore};

fn test_config() -> Config {
    let mut config = Config::default();
    // Genesis ships with header_difficulty_bits=16 and target_dimension=1.5;
    // widening epsilon is enough to make the first fractal search fast
    // without touching the header pre-filter or the grid size (see
    // core/tests/end_to_end.rs's fast_fractal_config for why grid_size
    // stays at the network default).
    config.fractal = FractalConfig {
        epsilon: 10.0,
        max_iterations: 64,
        ..FractalConfig::default()
    };
    config
}

async fn spawn_node(port: u16) -> std::sync::Arc<Node> {
    let store = SledStore::temporary().expect("temporary sled store");
    let (node, server) = Node::bootstrap(
        test_config(),
        format!("test-node-{port}"),
        format!("127.0.0.1:{port}"),
        store,
    )
    .await
    .expect("bootstrap succeeds");
    tokio::spawn(server.run());
    node
}

async fn wait_until_height(node: &Node, height: u64, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if node.get_chain_info().await.height >= height {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn a_mined_block_floods_through_the_bridge_to_the_far_node() {
    let node_a = spawn_node(19_701).await;
    let node_b = spawn_node(19_702).await;
    let node_c = spawn_node(19_703).await;

    // Let the listeners come up before dialing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    node_b
        .connect_to_peer("127.0.0.1:19701")
        .await
        .expect("b connects to a");
    node_b
        .connect_to_peer("127.0.0.1:19703")
        .await
        .expect("b connects to c");

    // Let both HELLO handshakes complete before mining starts.
    tokio::time::sleep(Duration::from_millis(200)).await;

    node_a
        .start_mining("a".repeat(40))
        .await
        .expect("mining starts");

    assert!(
        wait_until_height(&node_a, 2, Duration::from_secs(30)).await,
        "a should mine block 1 within the timeout"
    );
    node_a.stop_mining();

    assert!(
        wait_until_height(&node_b, 2, Duration::from_secs(10)).await,
        "the block should reach b directly"
    );
    assert!(
        wait_until_height(&node_c, 2, Duration::from_secs(10)).await,
        "the block should reach c through the bridge at b"
    );

    let hash_a = node_a.get_chain_info().await.latest_hash;
    let hash_b = node_b.get_chain_info().await.latest_hash;
    let hash_c = node_c.get_chain_info().await.latest_hash;
    assert_eq!(hash_a, hash_b);
    assert_eq!(hash_b, hash_c);
}
