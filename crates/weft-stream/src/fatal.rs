//! A stream that fails on first read.

use std::io;

use crate::traits::PieceStream;

/// A [`PieceStream`] whose every `read` yields a stored error.
///
/// Stands in for a piece source that could not be opened: the decode pipeline
/// substitutes one of these for a failed sub-range request so the stripe
/// reader sees a dead piece instead of a construction failure.
pub struct FatalStream {
    kind: io::ErrorKind,
    message: String,
}

impl FatalStream {
    /// Create a stream that replays `err` on every read.
    pub fn new(err: io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PieceStream for FatalStream {
    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(self.kind, self.message.clone()))
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_error_on_every_read() {
        let mut stream = FatalStream::new(io::Error::new(io::ErrorKind::NotFound, "no such piece"));
        let mut buf = [0u8; 4];

        for _ in 0..3 {
            let err = stream.read(&mut buf).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::NotFound);
            assert!(err.to_string().contains("no such piece"));
        }
    }

    #[tokio::test]
    async fn test_close_is_clean() {
        let mut stream = FatalStream::new(io::Error::other("boom"));
        stream.close().await.unwrap();
        stream.close().await.unwrap();
    }
}
