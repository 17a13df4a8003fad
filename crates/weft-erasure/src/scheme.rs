//! The [`ErasureScheme`] trait consumed by the decode pipeline.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::ErasureError;

/// A per-stripe erasure codec.
///
/// One stripe of the original stream is one *decoded block*
/// ([`decoded_block_size`](ErasureScheme::decoded_block_size) bytes). Encoding
/// turns it into [`total_count`](ErasureScheme::total_count) *shares* of
/// [`encoded_block_size`](ErasureScheme::encoded_block_size) bytes each, one
/// per piece index; any [`required_count`](ErasureScheme::required_count) of
/// them reconstruct the block.
///
/// Shares are keyed by piece index. The index identifies the share's position
/// in the code and is not interchangeable with iteration order, so it travels
/// through the pipeline as a first-class `u32` key.
///
/// Implementations must be pure: `decode` may not retain state between
/// stripes, and any `k` well-formed shares for the same stripe must produce
/// the same block.
pub trait ErasureScheme: Send + Sync {
    /// Per-piece bytes of one stripe.
    fn encoded_block_size(&self) -> usize;

    /// Plaintext bytes of one stripe.
    fn decoded_block_size(&self) -> usize;

    /// Minimum shares needed to reconstruct a block (k).
    fn required_count(&self) -> usize;

    /// Total shares produced per block (n).
    fn total_count(&self) -> usize;

    /// Encode one decoded block into `n` shares, indexed `0..n`.
    ///
    /// `block` must be exactly `decoded_block_size` bytes.
    fn encode(&self, block: &[u8]) -> Result<Vec<Bytes>, ErasureError>;

    /// Reconstruct one decoded block from at least `k` shares.
    ///
    /// Every share must be exactly `encoded_block_size` bytes. The returned
    /// block is exactly `decoded_block_size` bytes.
    fn decode(&self, shares: &BTreeMap<u32, Bytes>) -> Result<Bytes, ErasureError>;
}
