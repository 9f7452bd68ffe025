//! Notification payload derivation
//!
//! Turns a canonical record into the channel-neutral `NotificationPayload`
//! that notification dispatch and the web UI receive over the event bus.

use crate::types::CanonicalMetadata;
use abr_common::events::NotificationPayload;
use uuid::Uuid;

/// Longest description snippet, in characters
pub const DESCRIPTION_SNIPPET_CHARS: usize = 300;

const ELLIPSIS: char = '…';

/// Derive the notification payload for a resolved request
pub fn from_metadata(
    request_id: Uuid,
    metadata: &CanonicalMetadata,
    source_url: Option<&str>,
) -> NotificationPayload {
    NotificationPayload {
        request_id,
        headline: format!("{} by {}", metadata.title, metadata.author),
        title: metadata.title.clone(),
        author: metadata.author.clone(),
        narrators: (!metadata.narrators.is_empty()).then(|| metadata.narrators.join(", ")),
        series: series_line(metadata),
        duration: metadata.duration_minutes.map(format_duration),
        description: metadata
            .description
            .as_deref()
            .map(|d| truncate_at_word(d, DESCRIPTION_SNIPPET_CHARS)),
        cover_url: metadata.cover_url.clone(),
        source_url: source_url.map(String::from),
        confidence: metadata.provenance.confidence().as_str().to_string(),
    }
}

/// "Series Name #N", or just the name when the position is unknown
fn series_line(metadata: &CanonicalMetadata) -> Option<String> {
    let name = metadata.series_name.as_deref()?;
    Some(match metadata.series_sequence.as_deref() {
        Some(sequence) => format!("{} #{}", name, sequence),
        None => name.to_string(),
    })
}

/// 745 → "12h 25m", 45 → "45m"
pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours == 0 {
        format!("{}m", rest)
    } else {
        format!("{}h {}m", hours, rest)
    }
}

/// Cut `text` to at most `max_chars` characters (ellipsis included), at a
/// word boundary when there is one
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(1);
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];

    let snippet = match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };

    format!(
        "{}{}",
        snippet.trim_end_matches(|c: char| c.is_whitespace() || c == ',' || c == ';'),
        ELLIPSIS
    )
}
