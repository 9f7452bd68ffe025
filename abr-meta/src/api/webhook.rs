//! Webhook ingestion
//!
//! `POST /webhook` accepts any JSON object from the indexer, enqueues it and
//! answers 202 immediately. A detached task waits for the resolution,
//! persists it and broadcasts the outcome.

use crate::db::requests;
use crate::error::{ApiError, ApiResult};
use crate::notification;
use crate::types::IncomingRequest;
use crate::workflow::ResolutionTicket;
use crate::AppState;
use abr_common::events::ResolverEvent;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAccepted {
    pub request_id: Uuid,
    pub status: String,
}

/// POST /webhook
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WebhookAccepted>)> {
    let Json(value) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = IncomingRequest::from_value(value)
        .ok_or_else(|| ApiError::BadRequest("Webhook body must be a JSON object".to_string()))?;

    let name = request.name().map(String::from);
    let source_url = request.source_url().map(String::from);

    let ticket = state.queue.enqueue(request.clone())?;
    let request_id = ticket.id;

    info!(
        request_id = %request_id,
        name = ?name,
        source_url = ?source_url,
        "Webhook accepted"
    );

    if let Err(e) = requests::insert_queued(&state.db, request_id, ticket.enqueued_at, &request).await {
        error!(request_id = %request_id, error = %e, "Failed to persist queued request");
        state.record_error(format!("persist {}: {}", request_id, e)).await;
    }

    state.event_bus.emit_lossy(ResolverEvent::RequestQueued {
        request_id,
        name,
        queue_depth: state.queue.depth(),
        timestamp: Utc::now(),
    });

    tokio::spawn(track_outcome(state.clone(), ticket, source_url));

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAccepted {
            request_id,
            status: "queued".to_string(),
        }),
    ))
}

/// Wait for the worker's answer, persist it and broadcast it
async fn track_outcome(state: AppState, ticket: ResolutionTicket, source_url: Option<String>) {
    let request_id = ticket.id;

    match ticket.outcome().await {
        Ok(metadata) => {
            if let Err(e) = requests::mark_resolved(&state.db, request_id, &metadata).await {
                error!(request_id = %request_id, error = %e, "Failed to persist resolved metadata");
                state.record_error(format!("persist {}: {}", request_id, e)).await;
            }

            let notification =
                notification::from_metadata(request_id, &metadata, source_url.as_deref());
            state.event_bus.emit_lossy(ResolverEvent::RequestResolved {
                request_id,
                path: metadata.provenance.path.as_str().to_string(),
                notification,
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            let message = e.to_string();
            state.record_error(format!("resolve {}: {}", request_id, message)).await;

            if let Err(db_err) = requests::mark_failed(&state.db, request_id, &message).await {
                error!(request_id = %request_id, error = %db_err, "Failed to persist failure");
            }

            state.event_bus.emit_lossy(ResolverEvent::RequestFailed {
                request_id,
                message,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_webhook))
}
