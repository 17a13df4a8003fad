//! Erasure scheme seam for the weft decode pipeline.
//!
//! This crate provides:
//! - [`ErasureScheme`] — the trait the stripe pipeline decodes through.
//! - [`ReedSolomonScheme`] — Reed-Solomon coding backed by `reed-solomon-simd`.
//! - [`ReplicationScheme`] — the degenerate code where every piece carries the
//!   full block, useful for mirroring setups and as a test double.
//!
//! A scheme is a pure per-stripe codec: `encode` turns one decoded block into
//! `n` equally sized shares, `decode` turns any `k` of them back into the
//! block. All streaming, buffering, and fault handling lives upstream in
//! `weft-decode`.

mod error;
mod reed_solomon;
mod replicate;
mod scheme;

pub use error::ErasureError;
pub use reed_solomon::ReedSolomonScheme;
pub use replicate::ReplicationScheme;
pub use scheme::ErasureScheme;
