//! Range-addressable facade over the decode pipeline.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_erasure::ErasureScheme;
use weft_stream::{FatalStream, PieceStream, RangeSource, discard};

use crate::error::DecodeError;
use crate::reader::{DecodedReader, budget_slots, decode_readers};

/// Serves arbitrary windows of the decoded stream from range-addressable
/// piece sources. Built by [`decode`].
pub struct DecodedRanger {
    scheme: Arc<dyn ErasureScheme>,
    pieces: BTreeMap<u32, Arc<dyn RangeSource>>,
    /// Size every piece source reports.
    piece_size: u64,
    mbm: usize,
}

impl std::fmt::Debug for DecodedRanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedRanger")
            .field("pieces", &self.pieces.keys().collect::<Vec<_>>())
            .field("piece_size", &self.piece_size)
            .field("mbm", &self.mbm)
            .finish()
    }
}

/// Build a [`DecodedRanger`] over `pieces`.
///
/// `pieces` maps erasure piece indices to their range sources. At least
/// `required_count` sources must be present, they must all report the same
/// size, and that size must be a multiple of the scheme's encoded block
/// size. `mbm` bounds the bytes buffered across piece streams per range
/// request; `0` means the minimum possible.
pub fn decode(
    pieces: BTreeMap<u32, Arc<dyn RangeSource>>,
    scheme: Arc<dyn ErasureScheme>,
    mbm: usize,
) -> Result<DecodedRanger, DecodeError> {
    budget_slots(mbm, pieces.len(), scheme.encoded_block_size())?;
    if pieces.len() < scheme.required_count() {
        return Err(DecodeError::NotEnoughPieces {
            needed: scheme.required_count(),
            have: pieces.len(),
        });
    }

    let mut piece_size = None;
    for (&piece, source) in &pieces {
        let size = source.size();
        match piece_size {
            None => piece_size = Some(size),
            Some(expected) if expected != size => {
                return Err(DecodeError::SizeMismatch {
                    piece,
                    size,
                    expected,
                });
            }
            Some(_) => {}
        }
    }
    let piece_size = piece_size.unwrap_or(0);

    let encoded_block = scheme.encoded_block_size() as u64;
    if piece_size % encoded_block != 0 {
        return Err(DecodeError::Misaligned {
            size: piece_size,
            block_size: scheme.encoded_block_size(),
        });
    }

    Ok(DecodedRanger {
        scheme,
        pieces,
        piece_size,
        mbm,
    })
}

impl DecodedRanger {
    /// Total decoded bytes addressable through this ranger.
    pub fn size(&self) -> u64 {
        let blocks = self.piece_size / self.scheme.encoded_block_size() as u64;
        blocks * self.scheme.decoded_block_size() as u64
    }

    /// Open a reader over `[offset, offset + length)` of the decoded stream.
    ///
    /// Sub-ranges of all piece sources are requested in parallel; a source
    /// whose request fails is fed into the pipeline as an already-dead
    /// piece, so the read still succeeds while `required_count` sources
    /// remain healthy. The returned reader starts at `offset` exactly and
    /// yields at most `length` bytes.
    pub async fn range(
        &self,
        token: &CancellationToken,
        offset: u64,
        length: u64,
    ) -> Result<DecodedRange, DecodeError> {
        let decoded_block = self.scheme.decoded_block_size() as u64;
        let encoded_block = self.scheme.encoded_block_size() as u64;

        // Block-align the request: which decoded blocks cover the window.
        let (first_block, block_count) = calc_encompassing_blocks(offset, length, decoded_block);
        debug!(offset, length, first_block, block_count, "range request");

        // Ask every piece for its sub-range in parallel.
        let mut requests: JoinSet<(u32, io::Result<Box<dyn PieceStream>>)> = JoinSet::new();
        for (&piece, source) in &self.pieces {
            let source = Arc::clone(source);
            let sub_offset = first_block * encoded_block;
            let sub_length = block_count * encoded_block;
            requests.spawn(async move { (piece, source.range(sub_offset, sub_length).await) });
        }

        // Wait for all of them; failures become streams that die on first
        // read, and the stripe reader treats those as dead pieces.
        let mut readers: BTreeMap<u32, Box<dyn PieceStream>> = BTreeMap::new();
        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((piece, Ok(stream))) => {
                    readers.insert(piece, stream);
                }
                Ok((piece, Err(err))) => {
                    debug!(piece, error = %err, "sub-range request failed");
                    readers.insert(piece, Box::new(FatalStream::new(err)));
                }
                Err(join_err) => {
                    return Err(DecodeError::Pipeline {
                        reason: join_err.to_string(),
                    });
                }
            }
        }

        let mut reader = decode_readers(
            token,
            readers,
            Arc::clone(&self.scheme),
            block_count * decoded_block,
            self.mbm,
        );

        // The window may start mid-block; drop the lead-in so the caller's
        // first byte is the one at `offset`.
        let head = offset - first_block * decoded_block;
        if block_count > 0 && head > 0 {
            if let Err(err) = discard(&mut reader, head).await {
                return Err(match err.downcast::<DecodeError>() {
                    Ok(inner) => inner,
                    Err(err) => DecodeError::Pipeline {
                        reason: format!("head trim: {err}"),
                    },
                });
            }
        }

        Ok(DecodedRange {
            inner: reader,
            remaining: length,
        })
    }
}

/// A reader over one decoded window, produced by [`DecodedRanger::range`].
///
/// Yields at most the requested length, then `Ok(0)`; ends early only if
/// the underlying stripes become unrecoverable. Closing it closes the
/// underlying pipeline and piece streams.
pub struct DecodedRange {
    inner: DecodedReader,
    remaining: u64,
}

impl DecodedRange {
    /// Copy up to `buf.len()` bytes of the window into `buf`. `Ok(0)` at
    /// end of window; errors are sticky, as with [`DecodedReader::read`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let cap = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..cap]).await?;
        self.remaining -= n as u64;
        Ok(n)
    }

    /// Close the underlying pipeline. Idempotent, same aggregate as
    /// [`DecodedReader::close`].
    pub async fn close(&mut self) -> Result<(), DecodeError> {
        self.inner.close().await
    }
}

#[async_trait::async_trait]
impl PieceStream for DecodedRange {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DecodedRange::read(self, buf).await.map_err(io::Error::from)
    }

    async fn close(&mut self) -> io::Result<()> {
        DecodedRange::close(self).await.map_err(io::Error::from)
    }
}

/// Smallest run of blocks covering `[offset, offset + length)`.
fn calc_encompassing_blocks(offset: u64, length: u64, block_size: u64) -> (u64, u64) {
    let first_block = offset / block_size;
    if length == 0 {
        return (first_block, 0);
    }
    let last_block = (offset + length - 1) / block_size;
    (first_block, last_block - first_block + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_encompassing_blocks() {
        // (offset, length, block_size) -> (first_block, block_count)
        let cases = [
            (0, 0, 4, (0, 0)),
            (0, 4, 4, (0, 1)),
            (0, 5, 4, (0, 2)),
            (2, 5, 4, (0, 2)),
            (4, 0, 4, (1, 0)),
            (4, 4, 4, (1, 1)),
            (5, 2, 4, (1, 1)),
            (5, 4, 4, (1, 2)),
            (7, 1, 4, (1, 1)),
            (7, 2, 4, (1, 2)),
            (12, 1, 4, (3, 1)),
        ];
        for (offset, length, block_size, expected) in cases {
            assert_eq!(
                calc_encompassing_blocks(offset, length, block_size),
                expected,
                "offset={offset} length={length} block_size={block_size}"
            );
        }
    }
}
