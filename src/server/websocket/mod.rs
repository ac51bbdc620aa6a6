//! Real-time progress channel.
//!
//! Relays download progress events to the WebSocket clients of the job's
//! owner. Clients that are not connected just miss the events; polling the
//! job covers them.

mod handler;

pub use handler::{ws_handler, CONNECTED_MESSAGE_TYPE};
