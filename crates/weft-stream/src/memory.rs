//! In-memory piece sources.

use std::io;

use bytes::{Buf, Bytes};

use crate::traits::{PieceStream, RangeSource};

/// A [`PieceStream`] over an in-memory byte buffer.
///
/// Backed by [`Bytes`], so cloning the source data and slicing windows off it
/// are refcount operations, not copies.
pub struct BytesStream {
    data: Bytes,
    closed: bool,
}

impl BytesStream {
    /// Create a stream that yields `data` and then ends.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            closed: false,
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for BytesStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("stream closed"));
        }
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data.advance(n);
        Ok(n)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// A [`RangeSource`] over an in-memory byte buffer.
pub struct ByteRanger {
    data: Bytes,
}

impl ByteRanger {
    /// Create a range source over `data`.
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

#[async_trait::async_trait]
impl RangeSource for ByteRanger {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn range(&self, offset: u64, length: u64) -> io::Result<Box<dyn PieceStream>> {
        let end = offset.checked_add(length).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "range overflows u64")
        })?;
        if end > self.size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "range [{offset}, {end}) past end of {} byte source",
                    self.data.len()
                ),
            ));
        }
        let window = self.data.slice(offset as usize..end as usize);
        Ok(Box::new(BytesStream::new(window)))
    }
}
