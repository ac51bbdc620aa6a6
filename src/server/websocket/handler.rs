//! WebSocket route handler.
//!
//! Handles the upgrade, relays the owner's progress events and cleans up
//! when either side goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, warn};

use crate::download_manager::{ProgressEvent, ProgressNotifier};
use crate::server::metrics;
use crate::server::owner::Owner;

pub const CONNECTED_MESSAGE_TYPE: &str = "connected";

#[derive(Debug, Serialize)]
struct Connected<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    user_id: &'a str,
    server_version: String,
}

/// WebSocket upgrade handler for `GET /ws/progress`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    owner: Owner,
    State(notifier): State<ProgressNotifier>,
) -> Response {
    debug!("WebSocket upgrade for {}", owner.as_str());
    // Subscribe before upgrading so no event published in between is lost.
    let events = notifier.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, owner, events))
}

/// Counts a socket as open for as long as it lives.
struct ConnectionGauge;

impl ConnectionGauge {
    fn open() -> Self {
        metrics::ws_connected();
        Self
    }
}

impl Drop for ConnectionGauge {
    fn drop(&mut self) {
        metrics::ws_disconnected();
    }
}

async fn handle_socket(
    socket: WebSocket,
    owner: Owner,
    events: broadcast::Receiver<ProgressEvent>,
) {
    let _gauge = ConnectionGauge::open();
    debug!("WebSocket connected: {}", owner.as_str());
    let (mut ws_sink, mut ws_stream) = socket.split();

    let connected = Connected {
        message_type: CONNECTED_MESSAGE_TYPE,
        user_id: owner.as_str(),
        server_version: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
    };
    if !send_json(&mut ws_sink, &connected).await {
        return;
    }

    let outgoing = tokio::spawn(forward_events(ws_sink, events, owner.clone()));

    // Clients never need to talk; anything but a close frame is ignored.
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error for {}: {}", owner.as_str(), e);
                break;
            }
        }
    }

    debug!("WebSocket disconnected: {}", owner.as_str());
    outgoing.abort();
}

/// Forwards every event owned by `owner` until the socket or the channel
/// closes.
async fn forward_events(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut events: broadcast::Receiver<ProgressEvent>,
    owner: Owner,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if event.user_id != owner.as_str() {
                    continue;
                }
                if !send_json(&mut ws_sink, &event).await {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "Progress subscriber for {} lagged, {} events dropped",
                    owner.as_str(),
                    skipped
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Returns false once the socket is gone.
async fn send_json<T: Serialize>(ws_sink: &mut SplitSink<WebSocket, Message>, msg: &T) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => ws_sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WebSocket message: {}", e);
            true
        }
    }
}
