//! Request row persistence
//!
//! Lifecycle: `insert_queued` when the webhook is accepted, then exactly one
//! of `mark_resolved` / `mark_failed` once the queue worker answers.

use crate::types::{CanonicalMetadata, IncomingRequest};
use abr_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Resolved,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Resolved => "resolved",
            RequestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(RequestStatus::Queued),
            "resolved" => Ok(RequestStatus::Resolved),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(Error::Internal(format!("Unknown request status: {}", other))),
        }
    }
}

/// Persisted webhook request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub payload: serde_json::Value,
    pub status: RequestStatus,
    pub metadata: Option<CanonicalMetadata>,
    pub error: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Record an accepted webhook
pub async fn insert_queued(
    pool: &SqlitePool,
    id: Uuid,
    received_at: DateTime<Utc>,
    request: &IncomingRequest,
) -> Result<()> {
    let payload = serde_json::to_string(request)
        .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO requests (id, received_at, name, source_url, payload, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(timestamp(received_at))
    .bind(request.name())
    .bind(request.source_url())
    .bind(payload)
    .bind(RequestStatus::Queued.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Store the canonical record for a request
pub async fn mark_resolved(pool: &SqlitePool, id: Uuid, metadata: &CanonicalMetadata) -> Result<()> {
    let metadata = serde_json::to_string(metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize metadata: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE requests
        SET status = ?, metadata = ?, error = NULL, resolved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(RequestStatus::Resolved.as_str())
    .bind(metadata)
    .bind(timestamp(Utc::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Request {} not found", id)));
    }
    Ok(())
}

/// Store the failure message for a request
pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET status = ?, error = ?, resolved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(RequestStatus::Failed.as_str())
    .bind(error)
    .bind(timestamp(Utc::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Request {} not found", id)));
    }
    Ok(())
}

pub async fn get_request(pool: &SqlitePool, id: Uuid) -> Result<Option<RequestRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, received_at, name, source_url, payload, status, metadata, error, resolved_at
        FROM requests
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| record_from_row(&r)).transpose()
}

/// Most recent requests first
pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<RequestRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, received_at, name, source_url, payload, status, metadata, error, resolved_at
        FROM requests
        ORDER BY received_at DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

fn record_from_row(row: &SqliteRow) -> Result<RequestRecord> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Invalid request id {:?}: {}", id, e)))?;

    let payload: String = row.get("payload");
    let payload: serde_json::Value = serde_json::from_str(&payload)
        .map_err(|e| Error::Internal(format!("Failed to deserialize payload: {}", e)))?;

    let status: String = row.get("status");

    let metadata: Option<String> = row.get("metadata");
    let metadata = metadata
        .map(|m| serde_json::from_str::<CanonicalMetadata>(&m))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize metadata: {}", e)))?;

    let received_at: String = row.get("received_at");
    let resolved_at: Option<String> = row.get("resolved_at");

    Ok(RequestRecord {
        id,
        received_at: parse_timestamp(&received_at)?,
        name: row.get("name"),
        source_url: row.get("source_url"),
        payload,
        status: status.parse()?,
        metadata,
        error: row.get("error"),
        resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp {:?}: {}", value, e)))
}
