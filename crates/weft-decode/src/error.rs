//! Error types for the decode pipeline.

use std::fmt::Write as _;

/// Errors surfaced by the decode pipeline.
///
/// The enum is `Clone` because errors are sticky: once a read fails, every
/// later read replays the same error, and an idempotent `close` replays the
/// same aggregate. Foreign errors (`std::io::Error` from piece streams,
/// scheme errors) are carried as rendered reasons to keep that possible; the
/// originals are logged at the point of conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// The declared decoded size is not a multiple of the decoded block size.
    #[error("expected size {size} is not a multiple of decoded block size {block_size}")]
    UnalignedSize {
        /// The declared total decoded size.
        size: u64,
        /// The scheme's decoded block size.
        block_size: usize,
    },

    /// The memory budget is below the minimum working set.
    #[error("memory budget {mbm} below minimum {min} (pieces x encoded block size)")]
    BudgetTooSmall {
        /// The requested budget in bytes.
        mbm: usize,
        /// The minimum workable budget.
        min: usize,
    },

    /// Fewer than `k` piece sources are live.
    #[error("not enough pieces: need {needed}, have {have}")]
    NotEnoughPieces {
        /// Pieces required to reconstruct (k).
        needed: usize,
        /// Pieces still able to contribute.
        have: usize,
    },

    /// Range sources disagree about the piece size.
    #[error("piece {piece} reports size {size}, others report {expected}")]
    SizeMismatch {
        /// The disagreeing piece index.
        piece: u32,
        /// Its reported size.
        size: u64,
        /// The size reported by earlier pieces.
        expected: u64,
    },

    /// The common piece size is not a multiple of the encoded block size.
    #[error("piece size {size} is not a multiple of encoded block size {block_size}")]
    Misaligned {
        /// The common piece size.
        size: u64,
        /// The scheme's encoded block size.
        block_size: usize,
    },

    /// A single piece stream failed.
    #[error("piece {piece} failed: {reason}")]
    PieceFailed {
        /// The failing piece index.
        piece: u32,
        /// The rendered stream error.
        reason: String,
    },

    /// The erasure scheme rejected a set of shares.
    #[error("decode failed: {reason}")]
    DecodeFailed {
        /// The rendered scheme error.
        reason: String,
    },

    /// Context cancellation was observed.
    #[error("decode cancelled")]
    Cancelled,

    /// The reader was already closed.
    #[error("reader closed")]
    Closed,

    /// The stripe pipeline itself failed (a piece task panicked or was
    /// aborted out from under the coordinator).
    #[error("stripe pipeline error: {reason}")]
    Pipeline {
        /// The rendered task failure.
        reason: String,
    },

    /// Several components failed at once; entries keep a deterministic
    /// order (piece index ascending, pipeline errors last).
    #[error("{}", render_aggregate(.0))]
    Aggregate(Vec<DecodeError>),
}

impl DecodeError {
    /// Combine close-time errors into a single result.
    ///
    /// `None` for an empty list, the error itself for a single entry, and
    /// [`DecodeError::Aggregate`] otherwise. The caller is responsible for
    /// ordering the list deterministically.
    pub fn combine(mut errors: Vec<DecodeError>) -> Option<DecodeError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(DecodeError::Aggregate(errors)),
        }
    }
}

impl From<DecodeError> for std::io::Error {
    fn from(err: DecodeError) -> Self {
        std::io::Error::other(err)
    }
}

fn render_aggregate(errors: &[DecodeError]) -> String {
    let mut out = format!("{} errors:", errors.len());
    for err in errors {
        let _ = write!(out, " [{err}]");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_empty_is_none() {
        assert!(DecodeError::combine(Vec::new()).is_none());
    }

    #[test]
    fn test_combine_single_passes_through() {
        let err = DecodeError::combine(vec![DecodeError::Cancelled]).unwrap();
        assert!(matches!(err, DecodeError::Cancelled));
    }

    #[test]
    fn test_combine_many_aggregates_in_order() {
        let err = DecodeError::combine(vec![
            DecodeError::PieceFailed {
                piece: 0,
                reason: "a".into(),
            },
            DecodeError::PieceFailed {
                piece: 2,
                reason: "b".into(),
            },
        ])
        .unwrap();

        let DecodeError::Aggregate(entries) = &err else {
            panic!("expected aggregate, got {err:?}");
        };
        assert_eq!(entries.len(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("piece 0"));
        assert!(rendered.contains("piece 2"));
        assert!(rendered.find("piece 0").unwrap() < rendered.find("piece 2").unwrap());
    }
}
