//! Byte-oriented reader over the stripe pipeline.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_erasure::ErasureScheme;
use weft_stream::PieceStream;

use crate::error::DecodeError;
use crate::stripe::{StripeClose, StripeReader};

/// Validate the memory budget and turn it into a per-piece slot count.
///
/// `mbm == 0` runs at the minimum working set of one block per piece. Any
/// other value must cover at least one block per piece; the slot count is
/// then `mbm / (pieces x block)`, which keeps the bytes buffered across all
/// pieces within `max(mbm, pieces x block)`.
pub(crate) fn budget_slots(
    mbm: usize,
    piece_count: usize,
    block_size: usize,
) -> Result<usize, DecodeError> {
    let min = piece_count * block_size;
    if mbm == 0 || min == 0 {
        return Ok(1);
    }
    if mbm < min {
        return Err(DecodeError::BudgetTooSmall { mbm, min });
    }
    Ok(mbm / min)
}

/// Combined reader over a set of erasure piece streams.
///
/// Produced by [`decode_readers`]. Bytes come out strictly in stripe order;
/// a read pulls from the one buffered decoded block and decodes the next
/// stripe when that runs dry. End of stream is `Ok(0)` once
/// `expected_size` bytes have been delivered. Failure errors are sticky.
///
/// Reads and closes take `&mut self`, so overlapping calls are impossible by
/// construction; wrap the reader in a lock if several tasks must share it.
pub struct DecodedReader {
    state: State,
}

enum State {
    /// Construction failed; replay the error on every read.
    Fatal(DecodeError),
    Running(Running),
}

struct Running {
    stripes: StripeReader,
    /// Child of the caller's token; cancelled by `close` without touching
    /// the caller's context.
    token: CancellationToken,
    out_buf: Bytes,
    current_stripe: u64,
    expected_stripes: u64,
    last_error: Option<DecodeError>,
    eof: bool,
    close_result: Option<Result<(), DecodeError>>,
}

/// Build a [`DecodedReader`] over `pieces`.
///
/// `pieces` maps erasure piece indices to their byte streams; any
/// `required_count` healthy entries are enough to reconstruct.
/// `expected_size` is the exact number of decoded bytes the reader will
/// yield and must be a multiple of the scheme's decoded block size. `mbm`
/// bounds the bytes buffered across piece streams; `0` means the minimum
/// possible.
///
/// One reading task per piece is spawned immediately, so this must be
/// called from within a tokio runtime.
///
/// Construction never fails: contract violations come back as a reader
/// whose first read yields the error and whose close is a no-op success.
/// Cancelling `token` makes pending and future reads fail promptly; the
/// reader owns the piece streams and closes them exactly once, on [`close`]
/// or on cancellation.
///
/// [`close`]: DecodedReader::close
pub fn decode_readers(
    token: &CancellationToken,
    pieces: BTreeMap<u32, Box<dyn PieceStream>>,
    scheme: Arc<dyn ErasureScheme>,
    expected_size: u64,
    mbm: usize,
) -> DecodedReader {
    let decoded_block = scheme.decoded_block_size();
    if expected_size % decoded_block as u64 != 0 {
        return DecodedReader {
            state: State::Fatal(DecodeError::UnalignedSize {
                size: expected_size,
                block_size: decoded_block,
            }),
        };
    }
    let slots = match budget_slots(mbm, pieces.len(), scheme.encoded_block_size()) {
        Ok(slots) => slots,
        Err(err) => {
            return DecodedReader {
                state: State::Fatal(err),
            };
        }
    };

    let expected_stripes = expected_size / decoded_block as u64;
    debug!(
        pieces = pieces.len(),
        expected_stripes, slots, "starting decoded reader"
    );

    let child = token.child_token();
    let stripes = StripeReader::new(pieces, scheme, slots, child.clone());
    DecodedReader {
        state: State::Running(Running {
            stripes,
            token: child,
            out_buf: Bytes::new(),
            current_stripe: 0,
            expected_stripes,
            last_error: None,
            eof: false,
            close_result: None,
        }),
    }
}

impl DecodedReader {
    /// Copy up to `buf.len()` decoded bytes into `buf`.
    ///
    /// Returns `Ok(0)` at end of stream and keeps doing so. Failure errors
    /// are sticky: once a read fails, every later read returns the same
    /// error. After [`close`](DecodedReader::close) reads fail with
    /// [`DecodeError::Closed`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let running = match &mut self.state {
            State::Fatal(err) => return Err(err.clone()),
            State::Running(running) => running,
        };
        if running.close_result.is_some() {
            return Err(DecodeError::Closed);
        }

        if running.out_buf.is_empty() {
            if let Some(err) = &running.last_error {
                return Err(err.clone());
            }
            if running.eof || buf.is_empty() {
                return Ok(0);
            }
            if running.token.is_cancelled() {
                let err = DecodeError::Cancelled;
                running.last_error = Some(err.clone());
                return Err(err);
            }
            if running.current_stripe >= running.expected_stripes {
                running.eof = true;
                debug!(
                    stripes = running.expected_stripes,
                    "decoded stream complete"
                );
                return Ok(0);
            }

            let next = tokio::select! {
                _ = running.token.cancelled() => Err(DecodeError::Cancelled),
                block = running.stripes.read_stripe(running.current_stripe) => block,
            };
            match next {
                Ok(block) => {
                    running.out_buf = block;
                    running.current_stripe += 1;
                }
                Err(err) => {
                    running.last_error = Some(err.clone());
                    return Err(err);
                }
            }
        }

        let n = buf.len().min(running.out_buf.len());
        buf[..n].copy_from_slice(&running.out_buf[..n]);
        running.out_buf.advance(n);
        Ok(n)
    }

    /// Stop the pipeline and close every piece stream.
    ///
    /// Waits until all piece streams have been closed, then returns their
    /// errors combined into one aggregate: piece index ascending, stream
    /// error before close error, pipeline errors last. Idempotent: the
    /// first result is memoized and replayed.
    pub async fn close(&mut self) -> Result<(), DecodeError> {
        let running = match &mut self.state {
            State::Fatal(_) => return Ok(()),
            State::Running(running) => running,
        };
        if let Some(result) = &running.close_result {
            return result.clone();
        }

        running.out_buf = Bytes::new();
        let StripeClose { reports, internal } = running.stripes.close().await;

        let mut errors = Vec::new();
        for report in reports {
            if let Some(err) = report.stream_error {
                errors.push(DecodeError::PieceFailed {
                    piece: report.piece,
                    reason: err.to_string(),
                });
            }
            if let Some(err) = report.close_error {
                errors.push(DecodeError::PieceFailed {
                    piece: report.piece,
                    reason: format!("close: {err}"),
                });
            }
        }
        for reason in internal {
            errors.push(DecodeError::Pipeline { reason });
        }

        let result = match DecodeError::combine(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        };
        running.close_result = Some(result.clone());
        result
    }
}

impl Drop for DecodedReader {
    fn drop(&mut self) {
        // Without an explicit close, tell the piece tasks to stand down;
        // their streams are released as the tasks unwind.
        if let State::Running(running) = &self.state {
            running.token.cancel();
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for DecodedReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DecodedReader::read(self, buf).await.map_err(io::Error::from)
    }

    async fn close(&mut self) -> io::Result<()> {
        DecodedReader::close(self).await.map_err(io::Error::from)
    }
}
