//! Two-stage proof-of-work: a cheap header pre-filter followed by the
//! expensive fractal box-counting proof, plus the retarget law that keeps
//! both stages tracking the target block time.

pub mod difficulty;
pub mod fractal;
pub mod verifier;

pub use difficulty::{
    difficulty_stats, estimate_hashrate, is_retarget_height, retarget, DifficultyConfig, DifficultyStats,
};
pub use fractal::{find_fractal_solution, fractal_data_hash, FractalConfig, FractalSolution};
pub use verifier::{full_verify, header_passes_prefilter, quick_check};
