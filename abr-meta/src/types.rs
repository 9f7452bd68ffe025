//! Core Types for the metadata resolution workflow
//!
//! - Source roles and the explicit adapter result type (`SourceError`)
//! - The inbound webhook payload (`IncomingRequest`)
//! - The canonical output record (`CanonicalMetadata`) and its provenance

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Sources
// ============================================================================

/// External sources consulted during a resolution, by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// MAM torrent page scraped for an ASIN
    Scrape,
    /// Audnex book lookup by ASIN
    Primary,
    /// Audible catalog text search
    Fallback,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Scrape, SourceKind::Primary, SourceKind::Fallback];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Scrape => "scrape",
            SourceKind::Primary => "primary",
            SourceKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a canonical field's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    Scrape,
    Primary,
    Fallback,
    /// Parsed out of the webhook payload itself
    Webhook,
}

impl From<SourceKind> for FieldOrigin {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Scrape => FieldOrigin::Scrape,
            SourceKind::Primary => FieldOrigin::Primary,
            SourceKind::Fallback => FieldOrigin::Fallback,
        }
    }
}

/// Adapter failure.
///
/// Everything except `Misconfigured` is an ordinary outcome of talking to a
/// flaky third party and makes the coordinator move on to the next source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Network error, 5xx, or connection refused
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Identifier or search produced nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Response could not be mapped (schema drift)
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Page requires a login the configured session does not have
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Call exceeded its budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Adapter cannot work with the configuration it was given
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl SourceError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SourceError::Misconfigured(_))
    }

    /// Short label recorded in provenance attempts
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "unavailable",
            SourceError::NotFound(_) => "not_found",
            SourceError::Malformed(_) => "malformed",
            SourceError::NotAuthenticated(_) => "not_authenticated",
            SourceError::Timeout(_) => "timeout",
            SourceError::Misconfigured(_) => "misconfigured",
        }
    }

    /// Classify a reqwest failure.
    ///
    /// The request URL is dropped from the message since it can carry
    /// credentials in its query string.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

/// Result of a single adapter call
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that abort one resolution (never the worker loop)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolverError {
    #[error("configuration error in {source_kind} adapter: {message}")]
    Configuration {
        source_kind: SourceKind,
        message: String,
    },

    #[error("resolution task panicked: {0}")]
    WorkerPanic(String),

    /// The worker shut down before answering
    #[error("resolution cancelled before completion")]
    Cancelled,
}

// ============================================================================
// Identifiers
// ============================================================================

/// ASIN-like catalog identifier: 10 uppercase ASCII alphanumerics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIdentifier(String);

impl SourceIdentifier {
    /// Validate and normalize (uppercase) a candidate identifier
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim().to_ascii_uppercase();
        if candidate.len() == 10 && candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(candidate))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number that providers send either as JSON number or numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            LooseNumber::Number(n) => Some(*n),
            LooseNumber::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|n| n.is_finite())
    }
}

/// Treat an explicit JSON `null` like a missing field
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Incoming webhook payload
// ============================================================================

const NAME_KEYS: [&str; 5] = ["name", "title", "release_name", "releaseTitle", "torrent_name"];
const URL_KEYS: [&str; 6] = ["url", "source_url", "info_url", "infoUrl", "link", "guid"];

/// Raw webhook payload as parsed by the ingestion layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncomingRequest {
    fields: Map<String, Value>,
}

impl IncomingRequest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build from any JSON value; only objects are accepted
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Release name (the field the title/author heuristic works on)
    pub fn name(&self) -> Option<&str> {
        NAME_KEYS.iter().find_map(|key| self.string_field(key))
    }

    /// Torrent page URL, only if it is an http(s) URL
    pub fn source_url(&self) -> Option<&str> {
        URL_KEYS.iter().find_map(|key| {
            self.string_field(key)
                .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        })
    }

    /// Explicit author sent by the indexer, if any
    pub fn author_hint(&self) -> Option<String> {
        for key in ["author", "authors"] {
            match self.fields.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                Some(Value::Array(items)) => {
                    let names: Vec<&str> = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .collect();
                    if !names.is_empty() {
                        return Some(names.join(", "));
                    }
                }
                _ => {}
            }
        }
        None
    }

    pub fn size_bytes(&self) -> Option<u64> {
        match self.fields.get("size")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        for key in ["tags", "indexer_tags"] {
            match self.fields.get(key) {
                Some(Value::String(s)) => {
                    return s
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect();
                }
                Some(Value::Array(items)) => {
                    return items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect();
                }
                _ => {}
            }
        }
        Vec::new()
    }
}

// ============================================================================
// Canonical output
// ============================================================================

/// Canonical metadata fields tracked in provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Subtitle,
    Author,
    Narrators,
    Publisher,
    Description,
    Series,
    Genres,
    Duration,
    Cover,
    Language,
    ReleaseDate,
    Rating,
    SourceIdentifier,
}

/// Fallback path that produced the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Scrape found an identifier and the primary API answered
    Primary,
    /// Scrape worked, primary failed, fallback search answered
    FallbackAfterPrimary,
    /// Scrape failed, fallback search answered
    FallbackAfterScrape,
    /// Nothing external answered; built from the webhook payload alone
    PayloadOnly,
}

impl ResolutionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionPath::Primary => "primary",
            ResolutionPath::FallbackAfterPrimary => "fallback_after_primary",
            ResolutionPath::FallbackAfterScrape => "fallback_after_scrape",
            ResolutionPath::PayloadOnly => "payload_only",
        }
    }

    pub fn confidence(self) -> Confidence {
        match self {
            ResolutionPath::Primary => Confidence::High,
            ResolutionPath::FallbackAfterPrimary | ResolutionPath::FallbackAfterScrape => {
                Confidence::Medium
            }
            ResolutionPath::PayloadOnly => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// One adapter call made during a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub source: SourceKind,
    /// Adapter name, e.g. "Audnex"
    #[serde(default)]
    pub adapter: String,
    /// "ok" or the SourceError kind
    pub outcome: String,
}

/// Which source produced which field, and how the record was reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub path: ResolutionPath,
    pub fields: BTreeMap<Field, FieldOrigin>,
    pub attempts: Vec<Attempt>,
}

impl Provenance {
    pub fn confidence(&self) -> Confidence {
        self.path.confidence()
    }

    pub fn origin_of(&self, field: Field) -> Option<FieldOrigin> {
        self.fields.get(&field).copied()
    }
}

/// The normalized record handed to persistence, notification and UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    pub title: String,
    /// Display string; all authors joined with ", "
    pub author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub narrators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_sequence: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub genres: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_identifier: Option<SourceIdentifier>,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> IncomingRequest {
        IncomingRequest::from_value(value).unwrap()
    }

    #[test]
    fn source_identifier_validation() {
        assert_eq!(
            SourceIdentifier::parse(" b08g9prs1k ").unwrap().as_str(),
            "B08G9PRS1K"
        );
        assert!(SourceIdentifier::parse("B08G9PRS1").is_none());
        assert!(SourceIdentifier::parse("B08G9PRS1K2").is_none());
        assert!(SourceIdentifier::parse("B08G9-RS1K").is_none());
    }

    #[test]
    fn name_prefers_name_then_title() {
        let req = request(json!({"title": "From Title", "name": "  "}));
        assert_eq!(req.name(), Some("From Title"));

        let req = request(json!({"title": "From Title", "name": "From Name"}));
        assert_eq!(req.name(), Some("From Name"));
    }

    #[test]
    fn source_url_skips_non_http_values() {
        let req = request(json!({"guid": "abc-123", "link": "https://www.myanonamouse.net/t/1"}));
        assert_eq!(req.source_url(), Some("https://www.myanonamouse.net/t/1"));
    }

    #[test]
    fn author_hint_accepts_string_or_array() {
        assert_eq!(
            request(json!({"author": "Andy Weir"})).author_hint().as_deref(),
            Some("Andy Weir")
        );
        assert_eq!(
            request(json!({"authors": ["A", " ", "B"]})).author_hint().as_deref(),
            Some("A, B")
        );
        assert_eq!(request(json!({"authors": []})).author_hint(), None);
    }

    #[test]
    fn size_and_tags_are_lenient() {
        let req = request(json!({"size": "1048576", "tags": "English, m4b"}));
        assert_eq!(req.size_bytes(), Some(1_048_576));
        assert_eq!(req.tags(), vec!["English".to_string(), "m4b".to_string()]);
    }

    #[test]
    fn non_object_payload_rejected() {
        assert!(IncomingRequest::from_value(json!(["a"])).is_none());
    }

    #[test]
    fn loose_number_parses_strings() {
        assert_eq!(LooseNumber::Text("4.5".into()).as_f64(), Some(4.5));
        assert_eq!(LooseNumber::Text("n/a".into()).as_f64(), None);
        assert_eq!(LooseNumber::Number(3.0).as_f64(), Some(3.0));
    }

    #[test]
    fn only_misconfiguration_is_fatal() {
        assert!(SourceError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(SourceError::NotAuthenticated("login".into()).is_recoverable());
        assert!(!SourceError::Misconfigured("no cookie".into()).is_recoverable());
    }
}
