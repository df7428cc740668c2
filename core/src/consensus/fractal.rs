//! The fractal proof-of-work engine: seed derivation, Julia-set iteration,
//! and box-counting dimension estimation.
//!
//! Determinism is the entire point of this module: every receiving node
//! must reproduce the exact same bitmap and dimension for the same inputs.
//! All arithmetic is plain `f64` in a fixed iteration order; there is no
//! reliance on platform-specific extended precision.

use crate::crypto::sha256_hex;

/// Tunable parameters of the fractal PoW. The `Default` values are the
/// network-wide constants every node is expected to agree on.
#[derive(Debug, Clone, PartialEq)]
pub struct FractalConfig {
    pub max_iterations: u32,
    pub escape_radius: f64,
    pub grid_size: usize,
    pub box_sizes: [f64; 8],
    pub region_size: f64,
    pub target_dimension: f64,
    pub epsilon: f64,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            max_iterations: 256,
            escape_radius: 2.0,
            grid_size: 128,
            box_sizes: [1.0, 0.5, 0.25, 0.125, 0.0625, 0.03125, 0.015625, 0.0078125],
            region_size: 2.0,
            target_dimension: 1.5,
            epsilon: 0.001,
        }
    }
}

/// `SHA256(previous_hash || miner_address || decimal(nonce))`, ASCII
/// concatenation with no separator; `nonce` renders as a base-10 integer
/// with no leading zeros (Rust's `Display` for integers already satisfies
/// this).
pub fn fractal_seed(previous_hash: &str, miner_address: &str, nonce: u64) -> String {
    let data = format!("{previous_hash}{miner_address}{nonce}");
    sha256_hex(data.as_bytes())
}

/// Extracts a Julia-set parameter `c = (re, im)` from a hex seed: the seed
/// is left-padded with `0` to 32 hex chars if shorter, the first 16 hex
/// chars become a `u64` `R`, the next 16 become `I`, and both are mapped
/// from `[0, 2^64)` into `(-1, 1)`.
pub fn c_from_seed(seed: &str) -> (f64, f64) {
    let padded = if seed.len() < 32 {
        format!("{:0>32}", seed)
    } else {
        seed.to_string()
    };

    let real_hex = &padded[0..16];
    let imag_hex = &padded[16..32];

    let real_int = u64::from_str_radix(real_hex, 16).unwrap_or(0);
    let imag_int = u64::from_str_radix(imag_hex, 16).unwrap_or(0);

    normalize_pair(real_int, imag_int)
}

fn normalize_pair(real_int: u64, imag_int: u64) -> (f64, f64) {
    const MAX_VAL: f64 = 18_446_744_073_709_551_616.0; // 2^64
    let real = (real_int as f64 / MAX_VAL) * 2.0 - 1.0;
    let imag = (imag_int as f64 / MAX_VAL) * 2.0 - 1.0;
    (real, imag)
}

fn complex_mul((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    (ar * br - ai * bi, ar * bi + ai * br)
}

fn complex_add((ar, ai): (f64, f64), (br, bi): (f64, f64)) -> (f64, f64) {
    (ar + br, ai + bi)
}

fn complex_abs((re, im): (f64, f64)) -> f64 {
    (re * re + im * im).sqrt()
}

/// Computes the binary Julia-set bitmap (1 = never escaped, i.e. "in the
/// set") for parameter `c` over a `grid_size x grid_size` sampling of a
/// square region of side `config.region_size` centred at `center`. Returned
/// row-major, one byte per cell, values in `{0, 1}`.
pub fn julia_bitmap(c: (f64, f64), center: (f64, f64), config: &FractalConfig) -> Vec<u8> {
    let grid_size = config.grid_size;
    let half = config.region_size / 2.0;
    let escape_sq = config.escape_radius * config.escape_radius;

    let mut bitmap = vec![0u8; grid_size * grid_size];

    for row in 0..grid_size {
        let y = linspace(center.1 - half, center.1 + half, grid_size, row);
        for col in 0..grid_size {
            let x = linspace(center.0 - half, center.0 + half, grid_size, col);
            let mut z = (x, y);
            let mut escaped = false;
            for _ in 0..config.max_iterations {
                z = complex_add(complex_mul(z, z), c);
                if z.0 * z.0 + z.1 * z.1 > escape_sq {
                    escaped = true;
                    break;
                }
            }
            let idx = row * grid_size + col;
            bitmap[idx] = if escaped { 0 } else { 1 };
        }
    }

    bitmap
}

/// `numpy.linspace(start, stop, num)[i]`, computed the way numpy does:
/// `start + i * (stop - start) / (num - 1)`, with the last sample forced to
/// exactly `stop`.
fn linspace(start: f64, stop: f64, num: usize, i: usize) -> f64 {
    if num <= 1 {
        return start;
    }
    if i == num - 1 {
        return stop;
    }
    let step = (stop - start) / (num - 1) as f64;
    start + (i as f64) * step
}

/// Counts occupied boxes of side `box_size` (in region units) over a
/// `grid_size x grid_size` bitmap spanning `region_size` region units. A
/// box is occupied iff any of its pixels is set.
pub fn count_boxes(bitmap: &[u8], grid_size: usize, region_size: f64, box_size: f64) -> usize {
    let mut boxes_per_side = (region_size / box_size) as i64;
    if boxes_per_side <= 0 || boxes_per_side as usize > grid_size {
        boxes_per_side = grid_size as i64;
    }
    let boxes_per_side = boxes_per_side as usize;

    let pixels_per_box = grid_size / boxes_per_side;
    if pixels_per_box == 0 {
        return bitmap.iter().filter(|&&v| v > 0).count();
    }

    let mut count = 0usize;
    for i in 0..boxes_per_side {
        for j in 0..boxes_per_side {
            let row_start = i * pixels_per_box;
            let row_end = ((i + 1) * pixels_per_box).min(grid_size);
            let col_start = j * pixels_per_box;
            let col_end = ((j + 1) * pixels_per_box).min(grid_size);

            let mut occupied = false;
            'scan: for r in row_start..row_end {
                for c in col_start..col_end {
                    if bitmap[r * grid_size + c] > 0 {
                        occupied = true;
                        break 'scan;
                    }
                }
            }
            if occupied {
                count += 1;
            }
        }
    }
    count
}

/// Box-counting dimension via closed-form OLS over `ln N(s)` vs `ln(1/s)`,
/// computed as `(n*Σxy - Σx*Σy) / (n*Σx² - (Σx)²)` in a fixed summation
/// order so every implementation agrees bit-for-bit. Returns
/// `(dimension, r_squared)`; `(0.0, 0.0)` if fewer than two box sizes
/// yielded a non-empty count.
pub fn box_counting_dimension(bitmap: &[u8], config: &FractalConfig) -> (f64, f64) {
    let mut xs = Vec::with_capacity(config.box_sizes.len());
    let mut ys = Vec::with_capacity(config.box_sizes.len());

    for &box_size in &config.box_sizes {
        let count = count_boxes(bitmap, config.grid_size, config.region_size, box_size);
        if count > 0 {
            xs.push((1.0_f64 / box_size).ln());
            ys.push((count as f64).ln());
        }
    }

    if xs.len() < 2 {
        return (0.0, 0.0);
    }

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();
    let sum_y2: f64 = ys.iter().map(|y| y * y).sum();

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return (0.0, 0.0);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;

    let r_denom = ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt();
    let r_squared = if r_denom == 0.0 {
        0.0
    } else {
        let r = (n * sum_xy - sum_x * sum_y) / r_denom;
        r * r
    };

    (slope, r_squared)
}

/// Deterministic search points derived from `seed` by rehashing:
/// `seed_i = SHA256(seed_{i-1} || decimal(i))`, `seed_0 = seed`, each
/// mapped to a complex center via the same R/I extraction as `c_from_seed`.
pub fn search_points(seed: &str, count: usize) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(count);
    let mut current = seed.to_string();
    for i in 0..count {
        current = sha256_hex(format!("{current}{i}").as_bytes());
        points.push(c_from_seed(&current));
    }
    points
}

/// The outcome of a successful fractal search: the accepted center, its
/// dimension, its bitmap, and the fit quality that cleared the bar.
pub struct FractalSolution {
    pub center: (f64, f64),
    pub dimension: f64,
    pub r_squared: f64,
    pub bitmap: Vec<u8>,
}

/// Searches `search_points(seed, max_attempts)` for the first center whose
/// bitmap's box-counting dimension is within `config.epsilon` of
/// `config.target_dimension` with `r_squared > 0.95`.
pub fn find_fractal_solution(
    seed: &str,
    config: &FractalConfig,
    max_attempts: usize,
) -> Option<FractalSolution> {
    let c = c_from_seed(seed);
    for center in search_points(seed, max_attempts) {
        let bitmap = julia_bitmap(c, center, config);
        let (dimension, r_squared) = box_counting_dimension(&bitmap, config);
        if (dimension - config.target_dimension).abs() < config.epsilon && r_squared > 0.95 {
            return Some(FractalSolution {
                center,
                dimension,
                r_squared,
                bitmap,
            });
        }
    }
    None
}

/// SHA-256 of the row-major `{0,1}` byte bitmap.
pub fn fractal_data_hash(bitmap: &[u8]) -> String {
    sha256_hex(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic_and_input_sensitive() {
        let a = fractal_seed("prev", "miner", 1);
        let b = fractal_seed("prev", "miner", 1);
        assert_eq!(a, b);
        assert_ne!(a, fractal_seed("prev", "miner", 2));
        assert_ne!(a, fractal_seed("prev2", "miner", 1));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn c_from_seed_lies_in_open_unit_square() {
        let seed = fractal_seed("prev", "miner", 42);
        let (re, im) = c_from_seed(&seed);
        assert!(re > -1.0 && re < 1.0);
        assert!(im > -1.0 && im < 1.0);
    }

    #[test]
    fn short_seed_is_left_padded() {
        let (re, im) = c_from_seed("abcd");
        let (re2, im2) = c_from_seed("0000000000000000000000000000abcd");
        // left-padding to 32 with '0' should match a seed that is already
        // that long and zero-prefixed the same way
        assert_eq!(re, re2);
        assert_eq!(im, im2);
    }

    #[test]
    fn all_escaping_bitmap_has_zero_dimension() {
        let config = FractalConfig {
            grid_size: 16,
            ..Default::default()
        };
        // a huge |c| makes every point escape almost immediately
        let bitmap = julia_bitmap((10.0, 10.0), (0.0, 0.0), &config);
        assert!(bitmap.iter().all(|&v| v == 0));
        let (dim, r2) = box_counting_dimension(&bitmap, &config);
        assert_eq!((dim, r2), (0.0, 0.0));
    }

    #[test]
    fn all_bounded_bitmap_has_near_embedding_dimension() {
        let config = FractalConfig::default();
        // c = 0 keeps every sampled point bounded, so the bitmap is
        // entirely filled and every box at every scale is occupied; the
        // grid-size clamp on the two finest box sizes keeps the fit just
        // shy of a perfect dimension-2 power law.
        let bitmap = julia_bitmap((0.0, 0.0), (0.0, 0.0), &config);
        assert!(bitmap.iter().all(|&v| v == 1));
        let (dim, r2) = box_counting_dimension(&bitmap, &config);
        assert!((dim - 1.8333333).abs() < 1e-5, "dimension={dim}");
        assert!((r2 - 0.98374).abs() < 1e-4, "r2={r2}");
    }

    #[test]
    fn search_points_are_deterministic() {
        let seed = fractal_seed("prev", "miner", 1);
        let a = search_points(&seed, 5);
        let b = search_points(&seed, 5);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn fractal_data_hash_is_sha256_of_bitmap_bytes() {
        let bitmap = vec![0u8, 1, 1, 0];
        assert_eq!(fractal_data_hash(&bitmap), sha256_hex(&bitmap));
    }
}
