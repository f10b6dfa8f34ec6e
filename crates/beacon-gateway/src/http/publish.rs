//! Publish endpoint for collaborators in another process: POST /broadcast
//!
//! Auth: `Authorization: Bearer <publish.token>`. Without a configured
//! token the route does not exist (404).
//!
//! Request:  `{"channel": "inventory.changes", "data": {...}, "filters": {...}}`
//! Response: `202 {"recipients": 3, "matched": "exact"}`
//! Error:    `{"error": "..."}`

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::hub::Matched;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub filters: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct PublishAccepted {
    pub recipients: usize,
    pub matched: Matched,
}

#[derive(Debug, Serialize)]
pub struct PublishError {
    pub error: String,
}

type Rejection = (StatusCode, Json<PublishError>);

fn reject(status: StatusCode, error: &str) -> Rejection {
    (
        status,
        Json(PublishError {
            error: error.to_string(),
        }),
    )
}

pub async fn publish_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishAccepted>), Rejection> {
    let Some(expected) = state.config.publish.token.as_deref() else {
        return Err(reject(StatusCode::NOT_FOUND, "publishing over HTTP is disabled"));
    };
    if extract_bearer(&headers) != Some(expected) {
        warn!("POST /broadcast with bad or missing bearer token");
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "Unauthorized. Set 'Authorization: Bearer <publish-token>' header.",
        ));
    }
    if req.channel.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "channel cannot be empty"));
    }

    let report = state
        .manager
        .broadcast(&req.channel, req.data, req.filters.as_ref());
    debug!(channel = %req.channel, recipients = report.recipients, "published over HTTP");
    Ok((
        StatusCode::ACCEPTED,
        Json(PublishAccepted {
            recipients: report.recipients,
            matched: report.matched,
        }),
    ))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
