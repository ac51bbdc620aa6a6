pub mod config;
mod download_routes;
pub mod error;
mod http_layers;
pub mod metrics;
pub mod owner;
pub mod server;
pub mod state;
mod stream_track;
mod track_routes;
mod validate_routes;
mod websocket;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorCategory, ErrorCode, HEADER_REQUEST_ID};
pub use http_layers::*;
pub use owner::{Owner, ANONYMOUS_OWNER, HEADER_USER_ID};
pub use server::{make_app, run_server};
pub use state::ServerState;
pub use stream_track::ByteRange;
pub use websocket::CONNECTED_MESSAGE_TYPE;
