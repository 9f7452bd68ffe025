//! abr-meta library interface
//!
//! Metadata resolution for audiobook requests: source adapters, the
//! normalizer, the coordinator and its serialization queue, plus the thin
//! HTTP surface that feeds them. Exposed as a library for integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod extractors;
pub mod fusion;
pub mod notification;
pub mod rate_limiter;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use abr_common::events::EventBus;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use workflow::{MetadataCoordinator, ResolutionQueue};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE and notification dispatch
    pub event_bus: EventBus,
    /// Producer side of the resolution queue
    pub queue: ResolutionQueue,
    /// Shared with the queue worker; used directly by manual lookups
    pub coordinator: Arc<MetadataCoordinator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        queue: ResolutionQueue,
        coordinator: Arc<MetadataCoordinator>,
    ) -> Self {
        Self {
            db,
            event_bus,
            queue,
            coordinator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::webhook_routes())
        .merge(api::request_routes())
        .merge(api::lookup_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
