//! Reader wrapper that computes a payload checksum while file bytes are read.

use std::io::Result;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::checksum::{Checksum, CHECKSUM_LEN};

pin_project! {
    /// A reader wrapper that feeds every byte it yields into a [`Checksum`].
    ///
    /// Works as both a blocking [`std::io::Read`] and a tokio [`AsyncRead`].
    pub struct HashingReader<R, C> {
        #[pin]
        inner: R,
        hasher: C,
        bytes_read: u64,
    }
}

impl<R, C: Checksum> HashingReader<R, C> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: C::default(),
            bytes_read: 0,
        }
    }

    /// Get the total number of bytes read through this reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the reader and produce the checksum of everything read so far.
    pub fn finalize(self) -> [u8; CHECKSUM_LEN] {
        self.hasher.finalize()
    }
}

impl<R: std::io::Read, C: Checksum> std::io::Read for HashingReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.bytes_read += n as u64;
        }
        Ok(n)
    }
}

impl<R: AsyncRead, C: Checksum> AsyncRead for HashingReader<R, C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();
        let before = buf.filled().len();

        match this.inner.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let new_bytes = &buf.filled()[before..];
                if !new_bytes.is_empty() {
                    this.hasher.update(new_bytes);
                    *this.bytes_read += new_bytes.len() as u64;
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
