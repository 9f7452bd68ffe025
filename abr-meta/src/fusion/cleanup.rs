//! Text and value cleanup shared by the per-provider mappings
//!
//! Everything here is pure: strings in, strings (or nothing) out.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::BTreeSet;

static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(?:br|p|div|li|ul|ol|h[1-6]|tr|blockquote)\b[^>]*>")
        .expect("block break regex should compile")
});

/// Tag-shaped runs only, so a decoded `a < b and c > d` keeps its words
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z!][^<>]*>").expect("tag regex should compile"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

static SERIES_WITH_BOOK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[,:]?\s*(?:book|vol\.?|volume|part|#)\s*(\d+(?:\.\d+)?)\s*$")
        .expect("series regex should compile")
});

static SEQUENCE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("sequence regex should compile"));

/// Names providers use when nobody is credited
const PLACEHOLDER_NAMES: &[&str] = &[
    "uncredited",
    "unknown",
    "unknown author",
    "unknown narrator",
    "n/a",
    "-",
];

/// Upper bound of the 0-5 star scale
pub const MAX_RATING: f32 = 5.0;

/// Duration as reported by a provider, tagged with its unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationValue {
    Minutes(f64),
    Seconds(f64),
    Milliseconds(f64),
}

impl DurationValue {
    /// Whole minutes, rounded. Zero, negative and non-finite values are dropped.
    pub fn to_minutes(self) -> Option<u32> {
        let minutes = match self {
            DurationValue::Minutes(m) => m,
            DurationValue::Seconds(s) => s / 60.0,
            DurationValue::Milliseconds(ms) => ms / 60_000.0,
        };
        if !minutes.is_finite() || minutes <= 0.0 {
            return None;
        }
        let rounded = minutes.round().max(1.0);
        if rounded > u32::MAX as f64 {
            None
        } else {
            Some(rounded as u32)
        }
    }
}

/// Collapse runs of whitespace and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Trimmed, collapsed, `None` when nothing is left
pub fn clean_text(text: Option<&str>) -> Option<String> {
    text.map(collapse_whitespace).filter(|s| !s.is_empty())
}

/// HTML (or entity-encoded HTML) to plain text.
///
/// Entities are decoded first and tags stripped afterwards, so markup that
/// arrives encoded (`&lt;script&gt;`) is removed too. No `<` or `>` survives.
pub fn html_to_text(html: &str) -> String {
    let spaced = BLOCK_BREAK.replace_all(html, " ");

    let fragment = Html::parse_fragment(&spaced);
    let decoded: String = fragment.root_element().text().collect();

    let stripped = TAG.replace_all(&decoded, " ");
    let no_brackets = stripped.replace(['<', '>'], " ");

    collapse_whitespace(&no_brackets)
}

/// `html_to_text`, `None` when nothing is left
pub fn clean_html(html: Option<&str>) -> Option<String> {
    html.map(html_to_text).filter(|s| !s.is_empty())
}

pub fn is_placeholder(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered.is_empty() || PLACEHOLDER_NAMES.contains(&lowered.as_str())
}

/// Clean a list of person names: trim, drop placeholders, dedupe
/// case-insensitively keeping first occurrence order
pub fn clean_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    names
        .into_iter()
        .map(html_to_text)
        .filter(|name| !is_placeholder(name))
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

/// Genre names → ordered, deduplicated set
pub fn clean_genres<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty())
        .collect()
}

/// `"Book 3"` → `"3"`, `"2.5"` → `"2.5"`, `"07"` → `"7"`
pub fn clean_sequence(raw: &str) -> Option<String> {
    let number = SEQUENCE_NUMBER.find(raw)?.as_str();
    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (number, None),
    };

    let whole = whole.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };

    Some(match fraction {
        Some(f) if f.chars().any(|c| c != '0') => format!("{}.{}", whole, f.trim_end_matches('0')),
        _ => whole.to_string(),
    })
}

/// `"The Expanse, Book 3"` → (`"The Expanse"`, `Some("3")`)
///
/// Names without a trailing book marker come back unchanged.
pub fn parse_series(raw: &str) -> (String, Option<String>) {
    let cleaned = collapse_whitespace(raw);
    if let Some(caps) = SERIES_WITH_BOOK.captures(&cleaned) {
        let name = caps[1].trim().trim_end_matches([',', ':']).trim();
        if !name.is_empty() {
            return (name.to_string(), clean_sequence(&caps[2]));
        }
    }
    (cleaned, None)
}

/// Series name + optional explicit position
pub fn clean_series(name: &str, position: Option<&str>) -> Option<(String, Option<String>)> {
    let (name, embedded) = parse_series(&html_to_text(name));
    if name.is_empty() {
        return None;
    }
    let sequence = position.and_then(clean_sequence).or(embedded);
    Some((name, sequence))
}

/// Clamp to the 0-5 star scale
pub fn clamp_rating(rating: f64) -> Option<f32> {
    if !rating.is_finite() {
        return None;
    }
    Some((rating as f32).clamp(0.0, MAX_RATING))
}

/// Normalize to `YYYY-MM-DD` when the value is recognizable.
///
/// Unrecognized but non-empty values are kept as sent.
pub fn normalize_release_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }

    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    for format in ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    Some(trimmed.to_string())
}

/// Lowercased language name (`"English"` → `"english"`)
pub fn normalize_language(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw).to_lowercase();
    (!cleaned.is_empty()).then_some(cleaned)
}
