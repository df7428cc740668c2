//! Unified error handling for the FractalChain consensus core.
//!
//! Every boundary operation returns a `FractalChainResult<T>` carrying one of
//! the kinds below instead of panicking, grouped by where the failure
//! originates: malformed data, cryptographic mismatches, ledger economics,
//! consensus-rule violations, staking-ledger state, and storage.

use thiserror::Error;

/// Top-level error type for the FractalChain consensus core.
#[derive(Debug, Error)]
pub enum FractalChainError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("economic error: {0}")]
    Economic(#[from] EconomicError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("staking error: {0}")]
    Staking(#[from] StakingError),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type FractalChainResult<T> = Result<T, FractalChainError>;

/// Malformed field, bad hex, or an out-of-range number.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructuralError {
    #[error("malformed hex string: {0}")]
    BadHex(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("field out of range: {0}")]
    OutOfRange(String),

    #[error("non-coinbase amount must be strictly positive")]
    NonPositiveAmount,

    #[error("fee must be non-negative")]
    NegativeFee,

    #[error("block timestamp out of bounds: {0}")]
    BadTimestamp(String),

    #[error("more than one coinbase transaction in block")]
    MultipleCoinbase,

    #[error("missing coinbase transaction in non-genesis block")]
    MissingCoinbase,

    #[error("malformed JSON: {0}")]
    Json(String),
}

/// Signature mismatch, bad curve point, or pubkey/address mismatch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryptoError {
    #[error("malformed hex in cryptographic field: {0}")]
    BadHex(String),

    #[error("invalid curve point")]
    BadPoint,

    #[error("signature has the wrong length")]
    BadSignatureLength,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("derived address does not match sender")]
    AddressMismatch,
}

/// Insufficient balance, coinbase overflow, or duplicate transaction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EconomicError {
    #[error("sender {0} has insufficient spendable balance")]
    InsufficientBalance(String),

    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("coinbase amount exceeds reward plus fees")]
    CoinbaseOverflow,
}

/// Header pre-filter failure, seed mismatch, dimension/fit failure, or
/// hash-chain linkage failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("header hash does not pass the leading-zero pre-filter")]
    HeaderPreFilterFailed,

    #[error("fractal seed does not match re-derivation")]
    SeedMismatch,

    #[error("fractal dimension {0} is not within epsilon of target {1}")]
    DimensionOutsideEpsilon(f64, f64),

    #[error("box-counting fit quality r-squared {0} is too low")]
    FitQualityTooLow(f64),

    #[error("claimed dimension {0} disagrees with recomputed dimension {1}")]
    ClaimedDimensionMismatch(f64, f64),

    #[error("claimed fractal_data_hash does not match the recomputed bitmap hash")]
    FractalDataHashMismatch,

    #[error("merkle root mismatch")]
    MerkleRootMismatch,

    #[error("block hash mismatch")]
    BlockHashMismatch,

    #[error("previous_hash does not match the tip")]
    BadPreviousHash,

    #[error("block index is not tip index + 1")]
    BadIndex,

    #[error("missing fractal proof on non-genesis block")]
    MissingFractalProof,
}

/// Below minimums, locked, or bad state transition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StakingError {
    #[error("stake amount below minimum")]
    BelowMinimumAmount,

    #[error("lock period below minimum")]
    BelowMinimumLockPeriod,

    #[error("no stake positions for address")]
    NoPositions,

    #[error("stake index out of range")]
    BadIndex,

    #[error("stake position is not active")]
    NotActive,

    #[error("stake position is not unlocking")]
    NotUnlocking,

    #[error("stake still locked until block {0}")]
    StillLocked(u64),
}

pub type StakingResult<T> = Result<T, StakingError>;
