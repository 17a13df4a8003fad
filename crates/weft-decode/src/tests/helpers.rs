//! Shared test utilities for weft-decode tests.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use weft_erasure::{ErasureError, ErasureScheme, ReplicationScheme};
use weft_stream::{ByteRanger, BytesStream, FatalStream, PieceStream, RangeSource};

use crate::error::DecodeError;
use crate::reader::DecodedReader;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// The reference scheme most tests use: 2-of-4 replication, 4-byte blocks.
pub fn replicate_2_of_4() -> Arc<dyn ErasureScheme> {
    Arc::new(ReplicationScheme::new(2, 4, 4).unwrap())
}

/// Encode `data` stripe by stripe into `n` piece byte strings.
///
/// `data.len()` must be a multiple of the scheme's decoded block size.
pub fn encode_pieces(scheme: &dyn ErasureScheme, data: &[u8]) -> Vec<Bytes> {
    let mut pieces = vec![Vec::new(); scheme.total_count()];
    for block in data.chunks(scheme.decoded_block_size()) {
        let shares = scheme.encode(block).unwrap();
        assert_eq!(shares.len(), scheme.total_count());
        for (piece, share) in pieces.iter_mut().zip(shares) {
            piece.extend_from_slice(&share);
        }
    }
    pieces.into_iter().map(Bytes::from).collect()
}

/// Wrap piece byte strings as in-memory streams.
pub fn piece_streams(pieces: &[Bytes]) -> BTreeMap<u32, Box<dyn PieceStream>> {
    pieces
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let stream: Box<dyn PieceStream> = Box::new(BytesStream::new(data.clone()));
            (i as u32, stream)
        })
        .collect()
}

/// Wrap piece byte strings as in-memory range sources.
pub fn piece_rangers(pieces: &[Bytes]) -> BTreeMap<u32, Arc<dyn RangeSource>> {
    pieces
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let source: Arc<dyn RangeSource> = Arc::new(ByteRanger::new(data.clone()));
            (i as u32, source)
        })
        .collect()
}

/// Drain a reader to the end with the given read granularity.
pub async fn read_all(reader: &mut DecodedReader, chunk: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Drain any [`PieceStream`] to the end (used for range readers).
pub async fn read_all_stream<S: PieceStream + ?Sized>(
    stream: &mut S,
    chunk: usize,
) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// A dead piece: every read fails with the given message.
pub fn dead_stream(message: &str) -> Box<dyn PieceStream> {
    Box::new(FatalStream::new(io::Error::other(message.to_string())))
}

/// A stream that never yields; reads park until the pipeline is cancelled.
pub struct PendingStream;

#[async_trait::async_trait]
impl PieceStream for PendingStream {
    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        std::future::pending().await
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A stream that sleeps before every read, to force arrival order.
pub struct SlowStream {
    inner: BytesStream,
    delay: Duration,
}

impl SlowStream {
    pub fn new(data: Bytes, delay: Duration) -> Self {
        Self {
            inner: BytesStream::new(data),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for SlowStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::time::sleep(self.delay).await;
        self.inner.read(buf).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}

/// A stream that counts every byte it serves, for budget assertions.
pub struct MeteredStream {
    inner: BytesStream,
    served: Arc<AtomicUsize>,
}

impl MeteredStream {
    pub fn new(data: Bytes, served: Arc<AtomicUsize>) -> Self {
        Self {
            inner: BytesStream::new(data),
            served,
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for MeteredStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf).await?;
        self.served.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}

/// A healthy stream whose close reports an error.
pub struct CloseFailStream {
    inner: BytesStream,
    message: String,
}

impl CloseFailStream {
    pub fn new(data: Bytes, message: &str) -> Self {
        Self {
            inner: BytesStream::new(data),
            message: message.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for CloseFailStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    async fn close(&mut self) -> io::Result<()> {
        Err(io::Error::other(self.message.clone()))
    }
}

/// A range source whose every sub-range request fails.
pub struct FailingRanger {
    size: u64,
    message: String,
}

impl FailingRanger {
    pub fn new(size: u64, message: &str) -> Self {
        Self {
            size,
            message: message.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl RangeSource for FailingRanger {
    fn size(&self) -> u64 {
        self.size
    }

    async fn range(&self, _offset: u64, _length: u64) -> io::Result<Box<dyn PieceStream>> {
        Err(io::Error::other(self.message.clone()))
    }
}

/// Records which piece indices each decode call used, in sorted order.
pub struct RecordingScheme {
    inner: Arc<dyn ErasureScheme>,
    pub decodes: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl RecordingScheme {
    pub fn new(inner: Arc<dyn ErasureScheme>) -> Self {
        Self {
            inner,
            decodes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ErasureScheme for RecordingScheme {
    fn encoded_block_size(&self) -> usize {
        self.inner.encoded_block_size()
    }

    fn decoded_block_size(&self) -> usize {
        self.inner.decoded_block_size()
    }

    fn required_count(&self) -> usize {
        self.inner.required_count()
    }

    fn total_count(&self) -> usize {
        self.inner.total_count()
    }

    fn encode(&self, block: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        self.inner.encode(block)
    }

    fn decode(&self, shares: &BTreeMap<u32, Bytes>) -> Result<Bytes, ErasureError> {
        self.decodes
            .lock()
            .unwrap()
            .push(shares.keys().copied().collect());
        self.inner.decode(shares)
    }
}
