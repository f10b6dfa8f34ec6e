//! Beacon gateway: authenticated WebSocket fan-out of server-side events to
//! subscribed clients.
//!
//! [`hub::ConnectionManager`] is the in-process entry point for publishers;
//! [`app::build_router`] wires it to HTTP and WebSocket routes.

pub mod app;
pub mod http;
pub mod hub;
pub mod observe;
pub mod ws;

pub use app::{build_router, AppState};
pub use hub::ConnectionManager;
