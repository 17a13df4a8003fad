//! Streaming erasure-decoded read path.
//!
//! Reconstructs an original byte stream from `n` erasure piece streams, any
//! [`required_count`](weft_erasure::ErasureScheme::required_count) of which
//! suffice, while slow or failed pieces are tolerated per stripe:
//!
//! - [`decode_readers`] — combine a map of sequential piece streams into one
//!   [`DecodedReader`] yielding the plaintext bytes in order.
//! - [`decode`] — combine a map of range-addressable piece sources into a
//!   [`DecodedRanger`] serving arbitrary `(offset, length)` windows.
//!
//! Piece fetching runs on one task per piece; stripes are decoded from the
//! first `k` shares to arrive, memory is bounded by a caller-supplied budget,
//! and cancellation flows through a [`CancellationToken`] into every
//! suspension point.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use weft_decode::decode_readers;
//! use weft_erasure::{ErasureScheme, ReedSolomonScheme};
//! use weft_stream::PieceStream;
//!
//! # async fn example(pieces: BTreeMap<u32, Box<dyn PieceStream>>) -> Result<(), weft_decode::DecodeError> {
//! let scheme = Arc::new(ReedSolomonScheme::new(4, 6, 1024).unwrap());
//! let token = CancellationToken::new();
//! let expected = 16 * scheme.decoded_block_size() as u64;
//!
//! let mut reader = decode_readers(&token, pieces, scheme, expected, 0);
//! let mut buf = vec![0u8; 4096];
//! loop {
//!     let n = reader.read(&mut buf).await?;
//!     if n == 0 {
//!         break;
//!     }
//!     // use buf[..n]
//! }
//! reader.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod error;
pub mod ranger;
pub mod reader;
mod stripe;

pub use error::DecodeError;
pub use ranger::{DecodedRange, DecodedRanger, decode};
pub use reader::{DecodedReader, decode_readers};

#[cfg(test)]
mod tests;
