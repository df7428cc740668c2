//! Hybrid verification pipeline: structural validity, the cheap header
//! pre-filter, and the expensive fractal recomputation — in that order, so
//! a malformed or under-difficulty block never reaches the costly step.
//!
//! This is invoked identically whether the block was just mined locally or
//! received from a peer (§3 invariants, §4.3 "Verification").

use crate::consensus::fractal::{self, FractalConfig};
use crate::error::{ConsensusError, FractalChainError};
use crate::types::block::Block;

/// The header pre-filter: a candidate header hash passes iff its first
/// `bits / 4` hex characters (integer division) are `'0'`.
pub fn header_passes_prefilter(header_hash: &str, bits: u8) -> bool {
    let hex_zeros = (bits / 4) as usize;
    header_hash.len() >= hex_zeros && header_hash[..hex_zeros].bytes().all(|b| b == b'0')
}

/// Cheap checks only: structural validity plus the header pre-filter on
/// the block's actual nonce. Used by P2P receivers before committing to
/// the full fractal recomputation.
pub fn quick_check(
    block: &Block,
    previous: Option<&Block>,
    current_block_reward: f64,
    now_unix: f64,
) -> Result<(), FractalChainError> {
    block.validate_structure(previous, current_block_reward, now_unix)?;

    if block.index > 0 {
        let proof = block
            .fractal_proof
            .as_ref()
            .ok_or(ConsensusError::MissingFractalProof)?;
        let header_hash = block.header_hash_for_nonce(proof.nonce)?;
        if !header_passes_prefilter(&header_hash, block.header_difficulty_bits) {
            return Err(ConsensusError::HeaderPreFilterFailed.into());
        }
    }

    Ok(())
}

/// Full verification: structural validity, the header pre-filter, and a
/// from-scratch recomputation of the fractal bitmap and dimension at the
/// claimed solution point.
///
/// Re-derives the seed from `(previous_hash, miner_address, nonce)` and
/// requires it to match the claimed seed; re-derives `c`; recomputes the
/// bitmap at the claimed center; recomputes `D` and `R²`; and requires
/// `|D - target| < epsilon`, `R² > 0.95`, and
/// `|D - claimed_dimension| < 1e-4`. The `fractal_data_hash` is also
/// recomputed and compared, catching any miner that reports a bitmap hash
/// inconsistent with its own claimed solution point.
pub fn full_verify(
    block: &Block,
    previous: Option<&Block>,
    current_block_reward: f64,
    now_unix: f64,
    target_dimension: f64,
    config: &FractalConfig,
) -> Result<(), FractalChainError> {
    quick_check(block, previous, current_block_reward, now_unix)?;

    if block.index == 0 {
        return Ok(());
    }

    let proof = block
        .fractal_proof
        .as_ref()
        .ok_or(ConsensusError::MissingFractalProof)?;

    let expected_seed = fractal::fractal_seed(&block.previous_hash, &block.miner_address, proof.nonce);
    if expected_seed != proof.fractal_seed {
        return Err(ConsensusError::SeedMismatch.into());
    }

    let c = fractal::c_from_seed(&proof.fractal_seed);
    let center = (proof.solution_point_real, proof.solution_point_imag);

    let mut local_config = config.clone();
    local_config.target_dimension = target_dimension;

    let bitmap = fractal::julia_bitmap(c, center, &local_config);
    let (dimension, r_squared) = fractal::box_counting_dimension(&bitmap, &local_config);

    if (dimension - target_dimension).abs() >= local_config.epsilon {
        return Err(ConsensusError::DimensionOutsideEpsilon(dimension, target_dimension).into());
    }
    if r_squared <= 0.95 {
        return Err(ConsensusError::FitQualityTooLow(r_squared).into());
    }
    if (dimension - proof.fractal_dimension).abs() >= 1e-4 {
        return Err(ConsensusError::ClaimedDimensionMismatch(proof.fractal_dimension, dimension).into());
    }

    let recomputed_hash = fractal::fractal_data_hash(&bitmap);
    if recomputed_hash != proof.fractal_data_hash {
        return Err(ConsensusError::FractalDataHashMismatch.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefilter_counts_hex_chars_by_integer_division() {
        assert!(header_passes_prefilter("000abc", 15)); // 15/4 = 3
        assert!(!header_passes_prefilter("00fabc", 15));
        assert!(header_passes_prefilter("0000abc", 16));
        assert!(!header_passes_prefilter("000fabc", 16));
    }

    #[test]
    fn genesis_passes_full_verify_trivially() {
        let genesis = Block::genesis();
        let config = FractalConfig::default();
        assert!(full_verify(&genesis, None, 50.0, genesis.timestamp + 10.0, 1.5, &config).is_ok());
    }
}
