//! WebSocket transport: upgrade handler, session loop, socket writer.

pub mod connection;
pub mod send;

pub use connection::ws_handler;
