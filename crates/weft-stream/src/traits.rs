//! The byte-source traits the decode pipeline consumes.

use std::io;

/// A sequential byte source for one erasure piece.
///
/// `read` follows the usual contract: it copies up to `buf.len()` bytes and
/// returns how many, with `Ok(0)` meaning end of stream. A stream that has
/// failed or ended may be asked to read again; it should keep returning the
/// same outcome.
///
/// `close` releases the underlying resource and must be idempotent. Reading
/// after close is an error.
///
/// Implementations do not need to be cancellation-safe beyond what dropping
/// an in-flight `read` future implies: the pipeline never resumes a stream
/// whose read it abandoned.
#[async_trait::async_trait]
pub trait PieceStream: Send {
    /// Copy up to `buf.len()` bytes into `buf`, returning how many were
    /// copied. `Ok(0)` signals end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the underlying resource. Idempotent.
    async fn close(&mut self) -> io::Result<()>;
}

/// A range-addressable byte source for one erasure piece.
///
/// Every piece of the same stream must report the same [`size`](RangeSource::size);
/// the decode pipeline rejects mismatches at construction.
#[async_trait::async_trait]
pub trait RangeSource: Send + Sync {
    /// Total bytes addressable through this source.
    fn size(&self) -> u64;

    /// Open a stream over `[offset, offset + length)`.
    ///
    /// Fails if the window reaches past [`size`](RangeSource::size).
    async fn range(&self, offset: u64, length: u64) -> io::Result<Box<dyn PieceStream>>;
}
