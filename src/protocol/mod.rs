//! Wire types for the realtime room protocol: JSON events over WebSocket.

pub mod client_events;
pub mod models;
pub mod server_events;
