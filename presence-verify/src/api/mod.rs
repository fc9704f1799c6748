//! HTTP API

mod attendance;
mod health;
mod session;
mod sse;

pub use attendance::attendance_routes;
pub use health::health_routes;
pub use session::session_routes;
pub use sse::event_stream;
