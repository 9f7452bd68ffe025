//! Metadata normalization
//!
//! Provider payloads → `MetadataDraft` (partial, per-field origin) →
//! `CanonicalMetadata` (guaranteed title and author).
//!
//! Pure: no I/O, no clocks. The same inputs always give the same record.

pub mod cleanup;
pub mod normalizer;

pub use normalizer::{finalize, normalize};

use crate::types::{Field, FieldOrigin, SourceIdentifier};
use std::collections::{BTreeMap, BTreeSet};

/// Partially filled record built from one provider payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDraft {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub series_name: Option<String>,
    pub series_sequence: Option<String>,
    pub genres: BTreeSet<String>,
    pub duration_minutes: Option<u32>,
    pub cover_url: Option<String>,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<f32>,
    pub source_identifier: Option<SourceIdentifier>,

    /// Origin of every populated field
    pub origins: BTreeMap<Field, FieldOrigin>,
}

impl MetadataDraft {
    /// Attach an identifier found elsewhere (the scrape) unless the payload
    /// already carried one
    pub fn with_identifier(mut self, identifier: SourceIdentifier, origin: FieldOrigin) -> Self {
        if self.source_identifier.is_none() {
            self.source_identifier = Some(identifier);
            self.origins.insert(Field::SourceIdentifier, origin);
        }
        self
    }

    /// Record origins for every field that ended up populated
    fn mark_populated(&mut self, origin: FieldOrigin) {
        let populated = [
            (Field::Title, self.title.is_some()),
            (Field::Subtitle, self.subtitle.is_some()),
            (Field::Author, !self.authors.is_empty()),
            (Field::Narrators, !self.narrators.is_empty()),
            (Field::Publisher, self.publisher.is_some()),
            (Field::Description, self.description.is_some()),
            (Field::Series, self.series_name.is_some()),
            (Field::Genres, !self.genres.is_empty()),
            (Field::Duration, self.duration_minutes.is_some()),
            (Field::Cover, self.cover_url.is_some()),
            (Field::Language, self.language.is_some()),
            (Field::ReleaseDate, self.release_date.is_some()),
            (Field::Rating, self.rating.is_some()),
            (Field::SourceIdentifier, self.source_identifier.is_some()),
        ];

        for (field, present) in populated {
            if present {
                self.origins.insert(field, origin);
            }
        }
    }
}
