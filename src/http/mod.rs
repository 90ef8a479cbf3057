//! HTTP status API
//!
//! Read-only view of the calls this service has handled:
//! - GET /health - Health check with the number of active calls
//! - GET /calls - Active and recently finished calls
//! - GET /calls/:id - State, retries and outcome of one call

mod handlers;
mod routes;
mod state;

pub use handlers::{CallsResponse, HealthResponse};
pub use routes::create_router;
pub use state::AppState;
