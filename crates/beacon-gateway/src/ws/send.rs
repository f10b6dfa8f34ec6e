use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::hub::Outbound;

/// Map one queued frame onto the wire.
pub fn to_message(frame: Outbound) -> Message {
    match frame {
        Outbound::Text(text) => Message::Text(text.to_string().into()),
        Outbound::Ping => Message::Ping(Bytes::new()),
        Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}

/// Drain a connection's outbound queue into its socket.
///
/// Ends when the queue closes, after a `Close` frame is written, or on the
/// first write error. The sink is closed on the way out.
pub async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = queue.recv().await {
        let closing = matches!(frame, Outbound::Close { .. });
        if let Err(e) = sink.send(to_message(frame)).await {
            debug!(error = %e, "socket write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frame_carries_code_and_reason() {
        let msg = to_message(Outbound::Close {
            code: 1001,
            reason: "Server shutting down".into(),
        });
        match msg {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1001);
                assert_eq!(frame.reason.as_str(), "Server shutting down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_and_ping_map_through() {
        match to_message(Outbound::Text("{\"type\":\"pong\"}".into())) {
            Message::Text(text) => assert_eq!(text.as_str(), "{\"type\":\"pong\"}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(to_message(Outbound::Ping), Message::Ping(_)));
    }
}
