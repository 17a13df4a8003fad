//! Reed-Solomon erasure scheme.
//!
//! Splits a block into `k` data shares, derives `n - k` recovery shares, and
//! reconstructs the block from any `k` of the `n`. Backed by
//! `reed-solomon-simd`, which requires share sizes to be even.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;

use crate::error::ErasureError;
use crate::scheme::ErasureScheme;

/// Reed-Solomon scheme with `k` data shares and `n - k` recovery shares.
///
/// Data shares occupy piece indices `0..k` and are plain slices of the block;
/// recovery shares occupy `k..n`. The encoded block size is `share_size`, the
/// decoded block size is `k * share_size`.
#[derive(Debug, Clone)]
pub struct ReedSolomonScheme {
    /// Number of data shares (k).
    required: usize,
    /// Total shares per stripe (n).
    total: usize,
    /// Bytes per share.
    share_size: usize,
}

impl ReedSolomonScheme {
    /// Create a scheme with `required` data shares out of `total`.
    ///
    /// `share_size` must be even and non-zero (`reed-solomon-simd`
    /// requirement), and `0 < required <= total <= 65535`.
    pub fn new(required: usize, total: usize, share_size: usize) -> Result<Self, ErasureError> {
        if required == 0 || required > total {
            return Err(ErasureError::InvalidParameters {
                reason: format!("required count {required} must be in 1..={total}"),
            });
        }
        if total > u16::MAX as usize {
            return Err(ErasureError::InvalidParameters {
                reason: format!("total count {total} exceeds the field size"),
            });
        }
        if share_size == 0 || share_size % 2 != 0 {
            return Err(ErasureError::InvalidParameters {
                reason: format!("share size {share_size} must be even and non-zero"),
            });
        }
        Ok(Self {
            required,
            total,
            share_size,
        })
    }

    /// Number of recovery shares (n - k).
    fn recovery_count(&self) -> usize {
        self.total - self.required
    }
}

impl ErasureScheme for ReedSolomonScheme {
    fn encoded_block_size(&self) -> usize {
        self.share_size
    }

    fn decoded_block_size(&self) -> usize {
        self.required * self.share_size
    }

    fn required_count(&self) -> usize {
        self.required
    }

    fn total_count(&self) -> usize {
        self.total
    }

    fn encode(&self, block: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        if block.len() != self.decoded_block_size() {
            return Err(ErasureError::WrongBlockSize {
                got: block.len(),
                expected: self.decoded_block_size(),
            });
        }

        let originals: Vec<&[u8]> = block.chunks_exact(self.share_size).collect();
        debug_assert_eq!(originals.len(), self.required);

        let mut shares: Vec<Bytes> = originals
            .iter()
            .map(|s| Bytes::copy_from_slice(s))
            .collect();

        // reed-solomon-simd doesn't support recovery_count=0.
        if self.recovery_count() > 0 {
            let recovery =
                reed_solomon_simd::encode(self.required, self.recovery_count(), &originals)?;
            shares.extend(recovery.into_iter().map(Bytes::from));
        }

        debug!(
            k = self.required,
            n = self.total,
            share_size = self.share_size,
            "encoded block into shares"
        );
        Ok(shares)
    }

    fn decode(&self, shares: &BTreeMap<u32, Bytes>) -> Result<Bytes, ErasureError> {
        if shares.len() < self.required {
            return Err(ErasureError::NotEnoughShares {
                needed: self.required,
                got: shares.len(),
            });
        }
        for (&index, data) in shares {
            if data.len() != self.share_size {
                return Err(ErasureError::WrongShareSize {
                    index,
                    got: data.len(),
                    expected: self.share_size,
                });
            }
        }

        // Separate shares into originals (index < k) and recovery (index >= k).
        let mut originals: Vec<(usize, &[u8])> = Vec::new();
        let mut recovery: Vec<(usize, &[u8])> = Vec::new();
        for (&index, data) in shares {
            let idx = index as usize;
            if idx < self.required {
                originals.push((idx, data.as_ref()));
            } else {
                recovery.push((idx - self.required, data.as_ref()));
            }
        }

        debug!(
            k = self.required,
            n = self.total,
            originals = originals.len(),
            recovery = recovery.len(),
            "decoding stripe from shares"
        );

        let mut block = vec![0u8; self.decoded_block_size()];

        // With all k originals present a plain concatenation suffices.
        if originals.len() == self.required {
            for (idx, data) in &originals {
                let start = idx * self.share_size;
                block[start..start + self.share_size].copy_from_slice(data);
            }
            return Ok(Bytes::from(block));
        }

        let restored = reed_solomon_simd::decode(
            self.required,
            self.recovery_count(),
            originals.iter().copied(),
            recovery.iter().copied(),
        )?;

        // Place the originals we already had, then the restored ones.
        for (idx, data) in &originals {
            let start = idx * self.share_size;
            block[start..start + self.share_size].copy_from_slice(data);
        }
        for (idx, data) in &restored {
            let start = idx * self.share_size;
            block[start..start + self.share_size].copy_from_slice(data);
        }

        Ok(Bytes::from(block))
    }
}
