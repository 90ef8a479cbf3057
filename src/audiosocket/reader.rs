use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

use super::message::{frame_len, parse_frame, Message, HEADER_LEN};
use crate::error::TransportError;

/// Reader half shared between a call's dialog and its audio pump.
///
/// Only one holder reads at a time; the pump holds the lock for the length
/// of one recognition exchange.
pub type SharedReader<R> = Arc<Mutex<MessageReader<R>>>;

/// Buffered frame reader over the inbound half of an AudioSocket connection
pub struct MessageReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn shared(self) -> SharedReader<R> {
        Arc::new(Mutex::new(self))
    }

    /// Read exactly one frame.
    ///
    /// Cancel safe: partially received frames stay buffered, so the future
    /// can be dropped at any await point without desynchronising the stream.
    pub async fn next_message(&mut self) -> Result<Message, TransportError> {
        loop {
            if let Some(len) = frame_len(&self.buf) {
                if self.buf.len() >= len {
                    let frame: Vec<u8> = self.buf.drain(..len).collect();
                    return parse_frame(&frame);
                }
            }

            let mut chunk = [0u8; 2048];
            let read = self.inner.read(&mut chunk).await?;
            if read == 0 {
                if self.buf.is_empty() {
                    return Err(TransportError::EndOfStream);
                }
                let expected = frame_len(&self.buf).unwrap_or(HEADER_LEN);
                let actual = self.buf.len();
                self.buf.clear();
                return Err(TransportError::Truncated { expected, actual });
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
