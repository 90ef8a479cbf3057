use uuid::Uuid;

use crate::error::TransportError;

pub const HEADER_LEN: usize = 3;
pub const ID_LEN: usize = 16;
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Bytes per outbound Slin frame: 8000Hz * 20ms * 2 bytes.
pub const SLIN_CHUNK_SIZE: usize = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Hangup = 0x00,
    Id = 0x01,
    Slin = 0x10,
    Error = 0xff,
}

impl TryFrom<u8> for Kind {
    type Error = TransportError;

    fn try_from(tag: u8) -> Result<Self, TransportError> {
        match tag {
            0x00 => Ok(Kind::Hangup),
            0x01 => Ok(Kind::Id),
            0x10 => Ok(Kind::Slin),
            0xff => Ok(Kind::Error),
            other => Err(TransportError::UnknownKind(other)),
        }
    }
}

/// A decoded transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Id(Uuid),
    Audio(Vec<u8>),
    Error(Option<u8>),
    Hangup,
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::Id(_) => Kind::Id,
            Message::Audio(_) => Kind::Slin,
            Message::Error(_) => Kind::Error,
            Message::Hangup => Kind::Hangup,
        }
    }

    /// Encode for the wire. Audio longer than `MAX_PAYLOAD` becomes
    /// consecutive Slin frames, so no sample is dropped.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Id(id) => encode_frame(Kind::Id, id.as_bytes()),
            Message::Audio(pcm) if pcm.len() > MAX_PAYLOAD => {
                audio_frames(pcm, MAX_PAYLOAD).flatten().collect()
            }
            Message::Audio(pcm) => encode_frame(Kind::Slin, pcm),
            Message::Error(Some(code)) => encode_frame(Kind::Error, &[*code]),
            Message::Error(None) => encode_frame(Kind::Error, &[]),
            Message::Hangup => hangup_frame(),
        }
    }
}

pub fn encode_frame(kind: Kind, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(kind as u8);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// The fixed sentinel asking the remote side to terminate the session.
pub fn hangup_frame() -> Vec<u8> {
    vec![Kind::Hangup as u8, 0x00, 0x00]
}

/// Total length of the frame at the start of `buf`, once the header is in.
pub(crate) fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let payload = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    Some(HEADER_LEN + payload)
}

/// Decode one complete frame (header included).
pub fn parse_frame(frame: &[u8]) -> Result<Message, TransportError> {
    let expected = frame_len(frame).unwrap_or(HEADER_LEN);
    if frame.len() < expected {
        return Err(TransportError::Truncated {
            expected,
            actual: frame.len(),
        });
    }
    let payload = &frame[HEADER_LEN..expected];

    match Kind::try_from(frame[0])? {
        Kind::Hangup => Ok(Message::Hangup),
        Kind::Id => {
            let id = Uuid::from_slice(payload).map_err(|_| TransportError::Malformed {
                kind: Kind::Id,
                reason: format!("expected {} byte id, got {}", ID_LEN, payload.len()),
            })?;
            Ok(Message::Id(id))
        }
        Kind::Slin => Ok(Message::Audio(payload.to_vec())),
        Kind::Error => Ok(Message::Error(payload.first().copied())),
    }
}

/// Split PCM into Slin frames of `chunk_size` bytes; the last one may be
/// shorter. The iterator is a pure function of its input and can be cloned
/// to restart it.
pub fn audio_frames(pcm: &[u8], chunk_size: usize) -> AudioFrames<'_> {
    AudioFrames {
        chunks: pcm.chunks(chunk_size.clamp(1, MAX_PAYLOAD)),
    }
}

#[derive(Debug, Clone)]
pub struct AudioFrames<'a> {
    chunks: std::slice::Chunks<'a, u8>,
}

impl Iterator for AudioFrames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(|chunk| encode_frame(Kind::Slin, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}
