//! Best-effort title/author extraction from indexer release names
//!
//! `"The Wolf's Advance by Shane Purdy [English / m4b]"` →
//! title `"The Wolf's Advance"`, author `"Shane Purdy"`.
//!
//! Rules, in order:
//! 1. Drop `[...]` and `{...}` groups.
//! 2. Drop `(...)` groups that only hold format or language markers.
//! 3. Drop bare format tokens (m4b, mp3, unabridged, 64kbps, ...).
//! 4. Dotted scene names (`The.Martian.2014`) become space separated.
//! 5. Split on the last ` by ` → `title by author`; otherwise on the first
//!    dash separator → `author - title`. Only a lowercase (or all-caps) `by`
//!    with at most four words after it counts, so title-case names such as
//!    `Stand By Me` stay whole. A lowercase `by` inside an authorless title
//!    still splits; there is no telling those apart from the name alone.

use crate::types::IncomingRequest;
use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}").expect("bracket regex should compile"));

static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("paren regex should compile"));

static FORMAT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:m4b|m4a|mp3|flac|aac|ogg|opus|epub|pdf|mobi|azw3|unabridged|abridged|audiobook|retail|\d+\s?kbps)\b",
    )
    .expect("format token regex should compile")
});

static BY_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\s+(?:by|BY)\s+(.+)$").expect("by regex should compile"));

static DASH_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—]\s+").expect("dash regex should compile"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Longest author credit accepted after ` by `
const MAX_AUTHOR_WORDS: usize = 4;

/// Words that mark a parenthesized group as tagging rather than title text
const MARKER_WORDS: &[&str] = &[
    "english", "german", "french", "spanish", "italian", "dutch", "japanese", "m4b", "m4a",
    "mp3", "flac", "aac", "ogg", "opus", "epub", "pdf", "unabridged", "abridged", "audiobook",
    "retail", "kbps", "vbr", "cbr",
];

/// Result of parsing a release name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub author: Option<String>,
}

/// Parse a release name into title and (maybe) author.
///
/// The title falls back to the cleaned name, and to the raw trimmed name if
/// cleaning removed everything. It is empty only when the input is blank.
pub fn parse_release_name(name: &str) -> ParsedName {
    let cleaned = clean_release_name(name);

    if let Some(caps) = BY_SEPARATOR.captures(&cleaned) {
        let title = trim_separators(&caps[1]);
        let author = trim_separators(&caps[2]);
        let author_words = author.split_whitespace().count();
        if !title.is_empty() && (1..=MAX_AUTHOR_WORDS).contains(&author_words) {
            return ParsedName {
                title,
                author: Some(author),
            };
        }
    }

    if let Some(m) = DASH_SEPARATOR.find(&cleaned) {
        let author = trim_separators(&cleaned[..m.start()]);
        let title = trim_separators(&cleaned[m.end()..]);
        if !title.is_empty() && !author.is_empty() {
            return ParsedName {
                title,
                author: Some(author),
            };
        }
    }

    let title = trim_separators(&cleaned);
    ParsedName {
        title: if title.is_empty() {
            collapse(name.trim())
        } else {
            title
        },
        author: None,
    }
}

/// Title/author guess for a webhook payload.
///
/// An explicit author sent by the indexer overrides the parsed one.
pub fn parse_request(request: &IncomingRequest) -> ParsedName {
    let mut parsed = parse_release_name(request.name().unwrap_or_default());
    if let Some(hint) = request.author_hint() {
        parsed.author = Some(hint);
    }
    parsed
}

/// Strip tags, markers and separators noise, collapse whitespace
pub fn clean_release_name(name: &str) -> String {
    let without_brackets = BRACKETED.replace_all(name, " ");

    let without_markers = PARENTHESIZED.replace_all(&without_brackets, |caps: &regex::Captures| {
        if is_marker_group(&caps[1]) {
            " ".to_string()
        } else {
            caps[0].to_string()
        }
    });

    let without_tokens = FORMAT_TOKEN.replace_all(&without_markers, " ");

    let spaced = if !without_tokens.trim().contains(' ') && without_tokens.contains('.') {
        without_tokens.replace(['.', '_'], " ")
    } else {
        without_tokens.replace('_', " ")
    };

    collapse(&spaced)
}

fn is_marker_group(inner: &str) -> bool {
    let words: Vec<String> = inner
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    !words.is_empty()
        && words.iter().all(|w| {
            MARKER_WORDS.contains(&w.as_str())
                || w.ends_with("kbps")
                || w.chars().all(|c| c.is_ascii_digit())
        })
}

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

fn trim_separators(s: &str) -> String {
    collapse(s)
        .trim_matches(|c: char| c == '-' || c == '–' || c == '—' || c == ',' || c == ':' || c == '/' || c.is_whitespace())
        .to_string()
}
