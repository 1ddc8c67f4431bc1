//! HTTP server module
//!
//! The control surface a gateway would otherwise provide:
//! - Session creation and teardown
//! - Media up/down notifications
//! - Play/pause/resume/stop and offer requests
//! - Draining queued engine events

pub mod handlers;
pub mod routes;

pub use routes::create_router;
