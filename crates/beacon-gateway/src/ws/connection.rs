use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beacon_core::types::{ConnId, Identity};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::hub::{ConnectionManager, HandshakeError, Transport};
use crate::ws::send;

/// How long a closing session waits for its writer to flush.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

impl HandshakeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandshakeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// `GET /ws?token=...`. The credential is checked before the upgrade is
/// accepted; rejected clients get a JSON error and never reach the hub.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let manager = state.manager.clone();
    let identity = match manager.authenticate(query.token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "handshake rejected");
            return e.into_response();
        }
    };

    match upgrade {
        Ok(ws) => ws
            .on_upgrade(move |socket| run_session(socket, manager, identity))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Per-connection loop. Reads drive the hub; writes go through the
/// connection's queue and a dedicated writer task.
///
/// The loop also ends when the hub drops the connection on its own
/// (delivery failure, heartbeat, shutdown). Both socket halves are
/// released on the way out.
async fn run_session(socket: WebSocket, manager: Arc<ConnectionManager>, identity: Identity) {
    let _socket = manager.track_socket();
    let (sink, mut stream) = socket.split();
    let (transport, queue) = Transport::channel(manager.queue_capacity());
    let dropped_by_hub = transport.close_signal();
    let mut writer = tokio::spawn(send::write_loop(sink, queue));

    let conn_id = match manager.register(identity, transport) {
        Ok(id) => id,
        Err(e) => {
            info!(error = %e, "dropping upgraded socket");
            writer.abort();
            return;
        }
    };

    let mut writer_done = false;
    loop {
        tokio::select! {
            msg = stream.next() => {
                if !handle_inbound(&manager, &conn_id, msg) {
                    break;
                }
            }
            _ = dropped_by_hub.cancelled() => {
                debug!(conn_id = %conn_id, "connection dropped by hub");
                break;
            }
            _ = &mut writer => {
                // writer ended: queue closed, close frame sent, or socket error
                writer_done = true;
                manager.on_error(&conn_id, "socket writer stopped");
                break;
            }
        }
    }

    // a writer stuck on a client that stopped reading is abandoned here
    if !writer_done && tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        warn!(conn_id = %conn_id, "socket writer did not drain, aborting");
        writer.abort();
    }
    debug!(conn_id = %conn_id, "session ended");
}

/// Returns false once the session should stop reading.
fn handle_inbound(
    manager: &ConnectionManager,
    conn_id: &ConnId,
    msg: Option<Result<Message, axum::Error>>,
) -> bool {
    match msg {
        Some(Ok(Message::Text(text))) => {
            manager.on_message(conn_id, text.as_str());
            manager.is_connected(conn_id)
        }
        Some(Ok(Message::Pong(_))) => {
            manager.mark_alive(conn_id);
            true
        }
        // axum answers pings itself
        Some(Ok(Message::Ping(_))) => true,
        // binary frames are not part of the protocol; answered like garbage text
        Some(Ok(Message::Binary(_))) => {
            manager.on_message(conn_id, "");
            manager.is_connected(conn_id)
        }
        Some(Ok(Message::Close(frame))) => {
            let (code, reason) = match &frame {
                Some(f) => (Some(f.code), f.reason.as_str()),
                None => (None, ""),
            };
            manager.on_close(conn_id, code, reason);
            false
        }
        Some(Err(e)) => {
            manager.on_error(conn_id, &e.to_string());
            false
        }
        None => {
            manager.on_close(conn_id, None, "");
            false
        }
    }
}
