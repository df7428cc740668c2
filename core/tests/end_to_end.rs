//! End-to-end scenarios against the public consensus-core API only (no
//! access to module-private helpers), covering spec.md §8's scenarios 1-6.
//! Scenario 7 (P2P flood) lives in `fractalchain-node`'s integration tests,
//! since it needs the network layer.

use fractalchain_core::chain::{ChainConfig, ChainState};
use fractalchain_core::consensus::fractal::{c_from_seed, fractal_seed, julia_bitmap};
use fractalchain_core::consensus::{find_fractal_solution, fractal_data_hash, full_verify, FractalConfig};
use fractalchain_core::crypto::KeyPair;
use fractalchain_core::types::block::ZERO_HASH;
use fractalchain_core::types::{Block, FractalProof, Transaction};

/// A fractal config tuned for test speed rather than network security.
/// `grid_size` is left at the network default: the finest of the 8 box
/// sizes already saturates against it (see `fractal::tests::
/// all_bounded_bitmap_has_near_embedding_dimension`), and shrinking the
/// grid further would saturate several more box sizes and degrade the
/// regression's R² below the acceptance floor. Only `max_iterations` is
/// cut, and `epsilon` widened so the dimension band never gates the test.
fn fast_fractal_config() -> FractalConfig {
    FractalConfig {
        max_iterations: 32,
        epsilon: 10.0,
        ..FractalConfig::default()
    }
}

/// Mines a real, independently-verifiable block on top of `previous`: a
/// genuine header pre-filter hit (bits=0 makes every nonce pass) and a
/// genuine fractal solution, not a synthetic stand-in proof.
fn mine_real_block(
    previous: &Block,
    miner: &str,
    mut txs: Vec<Transaction>,
    coinbase_amount: f64,
    timestamp: f64,
    fractal_config: &FractalConfig,
) -> Block {
    let coinbase =
        Transaction::create_coinbase(miner.to_string(), coinbase_amount, previous.index + 1, timestamp).unwrap();
    let mut transactions = vec![coinbase];
    transactions.append(&mut txs);

    let mut block = Block {
        index: previous.index + 1,
        timestamp,
        transactions,
        previous_hash: previous.block_hash.clone(),
        miner_address: miner.to_string(),
        fractal_proof: None,
        merkle_root: String::new(),
        block_hash: String::new(),
        difficulty_target: fractal_config.target_dimension,
        header_difficulty_bits: 0,
    };
    block.merkle_root = block.calculate_merkle_root();

    let nonce = 0u64;
    let seed = fractal_seed(&block.previous_hash, miner, nonce);
    let solution = find_fractal_solution(&seed, fractal_config, 64).expect("a fast config finds a solution quickly");

    block.fractal_proof = Some(FractalProof {
        nonce,
        fractal_seed: seed,
        solution_point_real: solution.center.0,
        solution_point_imag: solution.center.1,
        fractal_dimension: solution.dimension,
        fractal_data_hash: fractal_data_hash(&solution.bitmap),
        timestamp,
    });
    block.block_hash = block.calculate_hash().unwrap();
    block
}

#[test]
fn genesis_bootstrap() {
    let state = ChainState::new(ChainConfig::default());
    assert_eq!(state.chain_length(), 1);
    let genesis = state.get_latest();
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, ZERO_HASH);
    assert_eq!(genesis.transactions.len(), 1);
    assert_eq!(genesis.block_hash, genesis.calculate_hash().unwrap());
    assert_eq!(state.block_reward(), 50.0);
}

#[test]
fn mine_and_append_single_block_with_a_genuine_fractal_proof() {
    let fractal_config = fast_fractal_config();
    let mut state = ChainState::new(ChainConfig::default());
    let genesis = state.get_latest().clone();
    let miner = "m".repeat(40);

    let block = mine_real_block(&genesis, &miner, vec![], 50.0, genesis.timestamp + 600.0, &fractal_config);

    full_verify(
        &block,
        Some(&genesis),
        50.0,
        block.timestamp + 10.0,
        fractal_config.target_dimension,
        &fractal_config,
    )
    .expect("a freshly mined block must verify");

    state.add_block(block, genesis.timestamp + 700.0).unwrap();
    assert_eq!(state.chain_length(), 2);
    assert_eq!(state.balance(&miner), 50.0);
    assert!(state.pending(10).is_empty());
}

#[test]
fn send_and_include_a_transaction() {
    let fractal_config = fast_fractal_config();
    let mut state = ChainState::new(ChainConfig::default());
    let genesis = state.get_latest().clone();

    let kp_a = KeyPair::generate();
    let addr_a = kp_a.address();
    let addr_b = "b".repeat(40);
    let addr_m = "m".repeat(40);

    let block1 = mine_real_block(&genesis, &addr_a, vec![], 50.0, genesis.timestamp + 600.0, &fractal_config);
    state.add_block(block1.clone(), block1.timestamp + 100.0).unwrap();

    let tx = Transaction::new_signed(&kp_a, addr_b.clone(), 10.0, 0.1, block1.timestamp + 10.0).unwrap();
    state.add_transaction(tx.clone()).unwrap();

    let block2 = mine_real_block(&block1, &addr_m, vec![tx], 50.0, block1.timestamp + 600.0, &fractal_config);
    state.add_block(block2, block1.timestamp + 700.0).unwrap();

    assert_eq!(state.balance(&addr_a), 50.0 - 10.0 - 0.1);
    assert_eq!(state.balance(&addr_b), 10.0);
    assert_eq!(state.balance(&addr_m), 50.0 + 0.1);
}

#[test]
fn insufficient_balance_is_rejected_by_add_transaction() {
    let fractal_config = fast_fractal_config();
    let mut state = ChainState::new(ChainConfig::default());
    let genesis = state.get_latest().clone();
    let kp_a = KeyPair::generate();
    let addr_a = kp_a.address();

    let block1 = mine_real_block(&genesis, &addr_a, vec![], 5.0, genesis.timestamp + 600.0, &fractal_config);
    state.add_block(block1.clone(), block1.timestamp + 100.0).unwrap();

    let first = Transaction::new_signed(&kp_a, "b".repeat(40), 4.0, 0.1, block1.timestamp + 10.0).unwrap();
    state.add_transaction(first).unwrap();

    // confirmed 5.0, minus the pending 4.1 leaves 0.9 spendable: 1.1 must be rejected.
    let second = Transaction::new_signed(&kp_a, "c".repeat(40), 1.0, 0.1, block1.timestamp + 20.0).unwrap();
    assert!(state.add_transaction(second).is_err());
}

#[test]
fn tampering_with_the_claimed_dimension_is_caught_by_full_verify() {
    let fractal_config = fast_fractal_config();
    let genesis = Block::genesis();
    let miner = "m".repeat(40);

    let mut block = mine_real_block(&genesis, &miner, vec![], 50.0, genesis.timestamp + 600.0, &fractal_config);
    let proof = block.fractal_proof.as_mut().unwrap();
    proof.fractal_dimension += 1e-3;
    // block_hash is intentionally left stale (as a peer would receive it);
    // full_verify's structural pass alone would catch the hash mismatch,
    // so recompute it here to isolate the fractal-dimension check.
    block.block_hash = block.calculate_hash().unwrap();

    let err = full_verify(
        &block,
        Some(&genesis),
        50.0,
        block.timestamp + 10.0,
        fractal_config.target_dimension,
        &fractal_config,
    )
    .unwrap_err();

    assert!(err.to_string().contains("disagrees with recomputed dimension"));
}

#[test]
fn c_from_seed_is_reproduced_from_the_same_nonce_and_previous_hash() {
    let seed = fractal_seed(&ZERO_HASH.repeat(1), "miner", 7);
    let (re1, im1) = c_from_seed(&seed);
    let (re2, im2) = c_from_seed(&seed);
    assert_eq!((re1, im1), (re2, im2));

    let config = fast_fractal_config();
    let bitmap_a = julia_bitmap((re1, im1), (0.0, 0.0), &config);
    let bitmap_b = julia_bitmap((re1, im1), (0.0, 0.0), &config);
    assert_eq!(bitmap_a, bitmap_b);
}
