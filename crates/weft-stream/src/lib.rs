//! Piece stream traits and byte plumbing for the weft decode pipeline.
//!
//! This crate defines the two seams through which the pipeline consumes
//! erasure piece data:
//!
//! - [`PieceStream`] — a sequential byte source with an idempotent close.
//! - [`RangeSource`] — a range-addressable byte source that hands out
//!   [`PieceStream`]s for sub-windows.
//!
//! plus the small implementations the pipeline and its tests are built from:
//! [`BytesStream`] and [`ByteRanger`] (in-memory), [`FatalStream`] (a stream
//! that fails on first read, standing in for a source that could not be
//! opened), and the [`read_full`] / [`discard`] helpers.

mod fatal;
mod memory;
mod traits;
mod util;

pub use fatal::FatalStream;
pub use memory::{ByteRanger, BytesStream};
pub use traits::{PieceStream, RangeSource};
pub use util::{discard, read_full};
