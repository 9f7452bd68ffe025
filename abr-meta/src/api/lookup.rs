//! Manual identifier lookup
//!
//! `POST /lookup` resolves an ASIN straight through the primary source,
//! bypassing the queue. It still waits on the shared rate limiter.

use crate::error::{ApiError, ApiResult};
use crate::types::{CanonicalMetadata, SourceIdentifier};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub asin: String,
}

/// POST /lookup
pub async fn lookup(
    State(state): State<AppState>,
    body: Result<Json<LookupRequest>, JsonRejection>,
) -> ApiResult<Json<CanonicalMetadata>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let identifier = SourceIdentifier::parse(&body.asin)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid ASIN: {:?}", body.asin)))?;

    info!(asin = %identifier, "Manual lookup requested");
    let metadata = state.coordinator.lookup_identifier(&identifier).await?;
    Ok(Json(metadata))
}

/// Build lookup routes
pub fn lookup_routes() -> Router<AppState> {
    Router::new().route("/lookup", post(lookup))
}
