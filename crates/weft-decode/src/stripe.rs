//! Stripe reconstruction: one decoded block per stripe, k-of-n.
//!
//! [`StripeReader`] spawns one task per piece stream. Each task reads encoded
//! blocks and hands them to the coordinator as [`Share`]s over a single event
//! channel; the coordinator assembles stripes in order, decodes each one from
//! the first `k` shares that arrive for it, and tolerates up to `n - k` dead
//! pieces.
//!
//! Memory is bounded by per-piece budget slots: a task must hold a slot from
//! just before it reads a block until the coordinator consumes or discards
//! the resulting share. With `s` slots per piece, at most `pieces x s` encoded
//! blocks exist at any moment.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weft_erasure::ErasureScheme;
use weft_stream::{PieceStream, read_full};

use crate::error::DecodeError;

/// One piece's bytes for one stripe, plus the budget slot those bytes occupy.
struct Share {
    piece: u32,
    bytes: Bytes,
    _slot: OwnedSemaphorePermit,
}

enum PieceEvent {
    /// A full encoded block read from a piece.
    Share {
        piece: u32,
        stripe: u64,
        bytes: Bytes,
        slot: OwnedSemaphorePermit,
    },
    /// A piece will deliver no further shares (EOF or failure).
    Dead { piece: u32 },
}

/// What became of one piece stream, reported when its task finishes.
pub(crate) struct PieceReport {
    pub piece: u32,
    /// Error that killed the stream, if it did not end cleanly.
    pub stream_error: Option<io::Error>,
    /// Error from closing the stream.
    pub close_error: Option<io::Error>,
}

/// Result of shutting the pipeline down.
pub(crate) struct StripeClose {
    /// Per-piece outcomes, piece index ascending.
    pub reports: Vec<PieceReport>,
    /// Task-level failures with no piece outcome (panics, forced aborts).
    pub internal: Vec<String>,
}

/// Reconstructs decoded blocks stripe by stripe from `n` piece streams.
pub(crate) struct StripeReader {
    scheme: Arc<dyn ErasureScheme>,
    token: CancellationToken,
    rx: UnboundedReceiver<PieceEvent>,
    tasks: JoinSet<PieceReport>,
    /// Shares retained for the current and future stripes.
    pending: BTreeMap<u64, Vec<Share>>,
    /// The stripe index each piece will deliver next.
    next_stripe: BTreeMap<u32, u64>,
    /// Pieces that will deliver no further shares.
    dead: Vec<u32>,
    /// Once a stripe is unrecoverable the whole reader is.
    failed: Option<DecodeError>,
}

impl StripeReader {
    /// Spawn one reading task per piece. `slots_per_piece` bounds how many
    /// encoded blocks each piece may have in flight (see module docs).
    pub(crate) fn new(
        pieces: BTreeMap<u32, Box<dyn PieceStream>>,
        scheme: Arc<dyn ErasureScheme>,
        slots_per_piece: usize,
        token: CancellationToken,
    ) -> Self {
        let block_size = scheme.encoded_block_size();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut next_stripe = BTreeMap::new();

        for (piece, stream) in pieces {
            next_stripe.insert(piece, 0);
            let slots = Arc::new(Semaphore::new(slots_per_piece));
            tasks.spawn(run_piece(
                piece,
                stream,
                block_size,
                slots,
                tx.clone(),
                token.clone(),
            ));
        }

        Self {
            scheme,
            token,
            rx,
            tasks,
            pending: BTreeMap::new(),
            next_stripe,
            dead: Vec::new(),
            failed: None,
        }
    }

    /// Produce the decoded block for `stripe`.
    ///
    /// Stripes must be requested in increasing order; shares retained for
    /// earlier stripes are released on entry.
    pub(crate) async fn read_stripe(&mut self, stripe: u64) -> Result<Bytes, DecodeError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        // Shares below this stripe can no longer be used; dropping them
        // releases their budget slots.
        self.pending = self.pending.split_off(&stripe);

        let needed = self.scheme.required_count();
        loop {
            let have = self.pending.get(&stripe).map_or(0, Vec::len);
            if have >= needed {
                return self.decode_stripe(stripe);
            }

            // Pieces that are alive and have not yet delivered this stripe.
            let reachable = self
                .next_stripe
                .iter()
                .filter(|&(piece, &next)| !self.dead.contains(piece) && next <= stripe)
                .count();
            if have + reachable < needed {
                warn!(
                    stripe,
                    needed,
                    have = have + reachable,
                    dead = self.dead.len(),
                    "stripe unrecoverable"
                );
                return Err(self.fail(DecodeError::NotEnoughPieces {
                    needed,
                    have: have + reachable,
                }));
            }

            match self.rx.recv().await {
                Some(PieceEvent::Share {
                    piece,
                    stripe: s,
                    bytes,
                    slot,
                }) => {
                    self.next_stripe.insert(piece, s + 1);
                    if s >= stripe {
                        self.pending.entry(s).or_default().push(Share {
                            piece,
                            bytes,
                            _slot: slot,
                        });
                    }
                    // A share below the current stripe arrived after its
                    // stripe was decoded without it; dropping it frees the
                    // slot for the piece to read ahead.
                }
                Some(PieceEvent::Dead { piece }) => {
                    debug!(piece, stripe, "piece dead");
                    self.dead.push(piece);
                }
                None => {
                    // Every task is gone. Either the pipeline was cancelled
                    // or the deaths were all reported and the check above
                    // will fail on the next pass; the cancelled case never
                    // reaches that check, so handle both here.
                    let err = if self.token.is_cancelled() {
                        DecodeError::Cancelled
                    } else {
                        DecodeError::NotEnoughPieces { needed, have }
                    };
                    return Err(self.fail(err));
                }
            }
        }
    }

    /// Decode `stripe` from the first `k` shares that arrived for it.
    fn decode_stripe(&mut self, stripe: u64) -> Result<Bytes, DecodeError> {
        let shares = self.pending.remove(&stripe).unwrap_or_default();
        let needed = self.scheme.required_count();

        let mut selected: BTreeMap<u32, Bytes> = BTreeMap::new();
        for share in shares {
            if selected.len() == needed {
                break;
            }
            selected.insert(share.piece, share.bytes);
        }
        // Shares past the first k are dropped here, slots released.

        let block = match self.scheme.decode(&selected) {
            Ok(block) => block,
            Err(err) => {
                warn!(stripe, error = %err, "scheme rejected shares");
                return Err(DecodeError::DecodeFailed {
                    reason: err.to_string(),
                });
            }
        };
        if block.len() != self.scheme.decoded_block_size() {
            return Err(DecodeError::DecodeFailed {
                reason: format!(
                    "scheme returned {} bytes, expected {}",
                    block.len(),
                    self.scheme.decoded_block_size()
                ),
            });
        }
        debug!(stripe, shares = selected.len(), "stripe decoded");
        Ok(block)
    }

    /// Mark the reader permanently errored and stop the piece tasks; further
    /// stripes can never be delivered.
    fn fail(&mut self, err: DecodeError) -> DecodeError {
        self.failed = Some(err.clone());
        self.token.cancel();
        err
    }

    /// Stop all piece tasks and wait for every piece stream to be closed.
    pub(crate) async fn close(&mut self) -> StripeClose {
        self.token.cancel();
        // Retained shares hold budget slots; release them so no task stays
        // parked on a slot it can never get.
        self.pending.clear();
        self.rx.close();

        let mut reports = Vec::new();
        let mut internal = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => internal.push(err.to_string()),
            }
        }
        reports.sort_by_key(|r| r.piece);
        StripeClose { reports, internal }
    }
}

/// Read encoded blocks from one piece stream until EOF, failure, or
/// cancellation, then close the stream. The stream is closed exactly once,
/// on every exit path.
async fn run_piece(
    piece: u32,
    mut stream: Box<dyn PieceStream>,
    block_size: usize,
    slots: Arc<Semaphore>,
    tx: UnboundedSender<PieceEvent>,
    token: CancellationToken,
) -> PieceReport {
    let mut stripe = 0u64;
    let mut stream_error = None;

    loop {
        let slot = tokio::select! {
            _ = token.cancelled() => break,
            acquired = slots.clone().acquire_owned() => match acquired {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        let mut block = vec![0u8; block_size];
        let read = tokio::select! {
            _ = token.cancelled() => break,
            r = read_full(stream.as_mut(), &mut block) => r,
        };

        match read {
            Ok(0) => {
                debug!(piece, stripe, "piece stream exhausted");
                let _ = tx.send(PieceEvent::Dead { piece });
                break;
            }
            Ok(n) if n < block_size => {
                debug!(piece, stripe, got = n, block_size, "piece ended mid-block");
                stream_error = Some(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("piece ended {n} bytes into a {block_size} byte block"),
                ));
                let _ = tx.send(PieceEvent::Dead { piece });
                break;
            }
            Ok(_) => {
                let event = PieceEvent::Share {
                    piece,
                    stripe,
                    bytes: Bytes::from(block),
                    slot,
                };
                if tx.send(event).is_err() {
                    // Coordinator gone; nothing left to feed.
                    break;
                }
                stripe += 1;
            }
            Err(err) => {
                debug!(piece, stripe, error = %err, "piece stream failed");
                let _ = tx.send(PieceEvent::Dead { piece });
                stream_error = Some(err);
                break;
            }
        }
    }

    let close_error = stream.close().await.err();
    PieceReport {
        piece,
        stream_error,
        close_error,
    }
}
