//! Call bridging over a telephony control plane
//!
//! A caller channel is joined with an AudioSocket processing leg in a
//! mixing bridge. Membership changes arrive as events and are the only
//! source of truth for whether both legs are present.

pub mod control;
pub mod driver;
pub mod memory;
pub mod orchestrator;
pub mod quorum;

pub use control::{
    ControlEvent, ControlPlane, DigitOptions, DigitResult, EventRouter, OriginateRequest,
    Subscription,
};
pub use driver::{run_bridged_call, serve_calls, BridgedCallSettings};
pub use memory::InMemoryControlPlane;
pub use orchestrator::{
    BridgeEnd, BridgeOrchestrator, BridgeSession, BridgeSettings, EndpointDescriptor, LegOutcome,
    LEG_APP_ARGS, LOCAL_CHANNEL_ANSWER_TIMEOUT,
};
pub use quorum::{BridgeSnapshot, QuorumChange, QuorumTracker, QUORUM};
