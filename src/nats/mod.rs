//! NATS adapters for the external collaborators

pub mod client;
pub mod control;
pub mod messages;
pub mod scaling;
pub mod speech;

pub use client::NatsClient;
pub use control::NatsControlPlane;
pub use messages::{AudioFrameMessage, ControlCommand, TranscriptMessage};
pub use scaling::NatsReplicas;
pub use speech::{NatsRecognizer, NatsSynthesizer};
