//! Read helpers shared by the pipeline.

use std::io;

use crate::traits::PieceStream;

/// Fill `buf` completely from `stream`, returning how many bytes were read.
///
/// A short return means the stream ended: `Ok(0)` is a clean end of stream at
/// the call boundary, anything between `0` and `buf.len()` means the stream
/// ended mid-fill. Errors from the stream are returned as-is, even if some
/// bytes were already read.
pub async fn read_full<S: PieceStream + ?Sized>(stream: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Consume and drop exactly `count` bytes from `stream`.
///
/// Fails with [`io::ErrorKind::UnexpectedEof`] if the stream ends early.
pub async fn discard<S: PieceStream + ?Sized>(stream: &mut S, count: u64) -> io::Result<()> {
    let mut scratch = [0u8; 4096];
    let mut remaining = count;
    while remaining > 0 {
        let want = scratch.len().min(remaining as usize);
        let n = stream.read(&mut scratch[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {remaining} of {count} bytes left to discard"),
            ));
        }
        remaining -= n as u64;
    }
    Ok(())
}
