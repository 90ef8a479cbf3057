use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::message::{audio_frames, hangup_frame};

/// Frame writer over the outbound half of an AudioSocket connection.
///
/// Cancel safe at frame granularity: when a write is dropped part way
/// through a frame, the rest of that frame goes out before anything else,
/// so the peer never reads a later frame from the middle of an earlier one.
pub struct FrameWriter<W> {
    inner: W,
    pending: Vec<u8>,
    written: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(512),
            written: 0,
        }
    }

    /// True while a frame has been started but not fully written.
    pub fn is_mid_frame(&self) -> bool {
        self.written < self.pending.len()
    }

    async fn drain(&mut self) -> io::Result<()> {
        while self.written < self.pending.len() {
            // `write` either writes something or nothing at all when dropped.
            let n = self.inner.write(&self.pending[self.written..]).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            self.written += n;
        }
        Ok(())
    }

    /// Write one complete frame, finishing any interrupted one first.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.drain().await?;
        self.pending.clear();
        self.pending.extend_from_slice(frame);
        self.written = 0;
        self.drain().await
    }

    /// Write `pcm` as Slin frames of `chunk_size` bytes. Returns the frame count.
    pub async fn write_audio(&mut self, pcm: &[u8], chunk_size: usize) -> io::Result<usize> {
        let mut frames = 0;
        for frame in audio_frames(pcm, chunk_size) {
            self.write_frame(&frame).await?;
            frames += 1;
        }
        self.flush().await?;
        Ok(frames)
    }

    /// Send the hangup frame and close the write side.
    pub async fn hangup(&mut self) -> io::Result<()> {
        self.write_frame(&hangup_frame()).await?;
        self.inner.shutdown().await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.drain().await?;
        self.inner.flush().await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
