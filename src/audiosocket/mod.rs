//! AudioSocket transport codec
//!
//! Every frame is a 3-byte header (kind tag, big-endian payload length)
//! followed by the payload:
//! - `0x00` Hangup, no payload, terminal in both directions
//! - `0x01` Id, 16-byte call UUID, sent once at connection start
//! - `0x10` Slin, signed linear 16-bit PCM, 8kHz mono
//! - `0xff` Error, optional 1-byte code, advisory

pub mod message;
pub mod reader;
pub mod writer;

pub use message::{
    audio_frames, encode_frame, hangup_frame, parse_frame, AudioFrames, Kind,
    Message, HEADER_LEN, ID_LEN, MAX_PAYLOAD, SLIN_CHUNK_SIZE,
};
pub use reader::{MessageReader, SharedReader};
pub use writer::FrameWriter;
