//! Error types for erasure coding operations.

/// Errors that can occur while encoding or decoding a stripe.
#[derive(Debug, thiserror::Error)]
pub enum ErasureError {
    /// The Reed-Solomon library returned an error.
    #[error("reed-solomon error: {0}")]
    ReedSolomon(#[from] reed_solomon_simd::Error),

    /// Not enough shares were provided for decoding.
    #[error("not enough shares: need {needed}, got {got}")]
    NotEnoughShares {
        /// Minimum shares required (k).
        needed: usize,
        /// Shares actually provided.
        got: usize,
    },

    /// A share does not have the scheme's encoded block size.
    #[error("share {index} has {got} bytes, expected {expected}")]
    WrongShareSize {
        /// Piece index of the offending share.
        index: u32,
        /// Bytes actually provided.
        got: usize,
        /// The scheme's encoded block size.
        expected: usize,
    },

    /// The input block does not have the scheme's decoded block size.
    #[error("block has {got} bytes, expected {expected}")]
    WrongBlockSize {
        /// Bytes actually provided.
        got: usize,
        /// The scheme's decoded block size.
        expected: usize,
    },

    /// The scheme was constructed with unusable parameters.
    #[error("invalid scheme parameters: {reason}")]
    InvalidParameters {
        /// What was wrong with the parameters.
        reason: String,
    },
}
