use beacon_core::types::Principal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::methods;

/// Raw inbound frame: parse the `type` discriminator first, then extract body.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// Why an inbound text frame could not be turned into a [`ClientFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Not JSON, not an object, or no string `type` field.
    #[error("Invalid message format")]
    Malformed,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {frame_type} message: {reason}")]
    InvalidBody { frame_type: String, reason: String },
}

/// Client → Server control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Wire: `{ "type": "ping" }`
    Ping,
    /// Wire: `{ "type": "subscribe", "channel": "inventory.changes", "filters": {"lotId": 5} }`
    Subscribe { channel: String, filters: Value },
    /// Wire: `{ "type": "unsubscribe", "channel": "inventory.changes" }`
    Unsubscribe { channel: String },
}

#[derive(Deserialize)]
struct SubscribeBody {
    channel: String,
    #[serde(default)]
    filters: Value,
}

#[derive(Deserialize)]
struct UnsubscribeBody {
    channel: String,
}

impl ClientFrame {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame = serde_json::from_str(text).map_err(|_| FrameError::Malformed)?;
        frame.into_client_frame()
    }
}

impl InboundFrame {
    /// Interpret the body according to the `type` discriminator.
    pub fn into_client_frame(self) -> Result<ClientFrame, FrameError> {
        let invalid = |frame_type: &str, reason: String| FrameError::InvalidBody {
            frame_type: frame_type.to_string(),
            reason,
        };

        match self.frame_type.as_str() {
            methods::PING => Ok(ClientFrame::Ping),
            methods::SUBSCRIBE => {
                let body: SubscribeBody = serde_json::from_value(Value::Object(self.rest))
                    .map_err(|e| invalid(methods::SUBSCRIBE, e.to_string()))?;
                if body.channel.is_empty() {
                    return Err(invalid(methods::SUBSCRIBE, "channel must not be empty".into()));
                }
                Ok(ClientFrame::Subscribe {
                    channel: body.channel,
                    filters: body.filters,
                })
            }
            methods::UNSUBSCRIBE => {
                let body: UnsubscribeBody = serde_json::from_value(Value::Object(self.rest))
                    .map_err(|e| invalid(methods::UNSUBSCRIBE, e.to_string()))?;
                if body.channel.is_empty() {
                    return Err(invalid(
                        methods::UNSUBSCRIBE,
                        "channel must not be empty".into(),
                    ));
                }
                Ok(ClientFrame::Unsubscribe {
                    channel: body.channel,
                })
            }
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

/// Payload of `connection.established`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Established {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub user: Principal,
}

/// Server → Client message. Serialized with the `type` tag inline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "connection.established")]
    ConnectionEstablished { data: Established },

    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },

    #[serde(rename = "subscription.confirmed")]
    SubscriptionConfirmed { channel: String, filters: Value },

    #[serde(rename = "subscription.denied")]
    SubscriptionDenied {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<Value>,
        error: String,
    },

    #[serde(rename = "unsubscription.confirmed")]
    UnsubscriptionConfirmed { channel: String },

    #[serde(rename = "event")]
    Event {
        channel: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerFrame {
    pub fn pong() -> Self {
        ServerFrame::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn event(channel: impl Into<String>, data: Value) -> Self {
        ServerFrame::Event {
            channel: channel.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
        }
    }

    /// Envelope `type` value, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::ConnectionEstablished { .. } => methods::CONNECTION_ESTABLISHED,
            ServerFrame::Pong { .. } => methods::PONG,
            ServerFrame::SubscriptionConfirmed { .. } => methods::SUBSCRIPTION_CONFIRMED,
            ServerFrame::SubscriptionDenied { .. } => methods::SUBSCRIPTION_DENIED,
            ServerFrame::UnsubscriptionConfirmed { .. } => methods::UNSUBSCRIPTION_CONFIRMED,
            ServerFrame::Event { .. } => methods::EVENT,
            ServerFrame::Error { .. } => methods::ERROR,
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
