//! Replication scheme: every piece carries the full block.
//!
//! The degenerate erasure code. Encoding copies the block to all `n` pieces;
//! decoding returns any one of them. With `required > 1` the scheme still
//! demands `required` shares before it will decode, which lets mirroring
//! setups insist on a quorum of copies.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::ErasureError;
use crate::scheme::ErasureScheme;

/// Replication: `n` identical copies, any `required` of which decode.
///
/// `encoded_block_size == decoded_block_size == block_size`.
#[derive(Debug, Clone)]
pub struct ReplicationScheme {
    required: usize,
    total: usize,
    block_size: usize,
}

impl ReplicationScheme {
    /// Create a replication scheme over `total` copies of `block_size` bytes.
    pub fn new(required: usize, total: usize, block_size: usize) -> Result<Self, ErasureError> {
        if required == 0 || required > total {
            return Err(ErasureError::InvalidParameters {
                reason: format!("required count {required} must be in 1..={total}"),
            });
        }
        if block_size == 0 {
            return Err(ErasureError::InvalidParameters {
                reason: "block size must be non-zero".to_string(),
            });
        }
        Ok(Self {
            required,
            total,
            block_size,
        })
    }
}

impl ErasureScheme for ReplicationScheme {
    fn encoded_block_size(&self) -> usize {
        self.block_size
    }

    fn decoded_block_size(&self) -> usize {
        self.block_size
    }

    fn required_count(&self) -> usize {
        self.required
    }

    fn total_count(&self) -> usize {
        self.total
    }

    fn encode(&self, block: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        if block.len() != self.block_size {
            return Err(ErasureError::WrongBlockSize {
                got: block.len(),
                expected: self.block_size,
            });
        }
        let copy = Bytes::copy_from_slice(block);
        Ok(vec![copy; self.total])
    }

    fn decode(&self, shares: &BTreeMap<u32, Bytes>) -> Result<Bytes, ErasureError> {
        if shares.len() < self.required {
            return Err(ErasureError::NotEnoughShares {
                needed: self.required,
                got: shares.len(),
            });
        }
        for (&index, data) in shares {
            if data.len() != self.block_size {
                return Err(ErasureError::WrongShareSize {
                    index,
                    got: data.len(),
                    expected: self.block_size,
                });
            }
        }
        // All copies are identical; return the lowest-indexed one.
        let (_, share) = shares.iter().next().expect("len checked above");
        Ok(share.clone())
    }
}
