pub mod audiosocket;
pub mod bridge;
pub mod cancel;
pub mod config;
pub mod dialog;
pub mod error;
pub mod http;
pub mod nats;
pub mod scaling;
pub mod server;
pub mod session;
pub mod speech;

pub use audiosocket::{Message, MessageReader};
pub use bridge::{BridgeEnd, BridgeOrchestrator, ControlPlane, InMemoryControlPlane};
pub use cancel::{CallToken, CancelReason};
pub use config::Config;
pub use dialog::{DialogEngine, DialogOutcome, DialogState};
pub use error::{DialogError, RecognitionError, SpeakError, TransportError};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, TranscriptMessage};
pub use scaling::{Deployment, DeploymentScaler, InMemoryReplicas, Scaler};
pub use server::AudioSocketServer;
pub use session::{handle_connection, CallRegistry, CallServices, CallSession, CallSummary};
pub use speech::{MockRecognizer, MockSynthesizer, RecognitionPipeline, Speaker};
