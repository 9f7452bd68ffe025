//! Provider payload → canonical record mapping
//!
//! One mapping function per `ProviderPayload` variant; shared cleanup lives
//! in `cleanup`. `finalize` fills the required fields from the webhook
//! payload when the providers left them empty.

use super::cleanup::{
    clamp_rating, clean_genres, clean_html, clean_names, clean_series, clean_text,
    collapse_whitespace, is_placeholder, normalize_language, normalize_release_date,
    DurationValue,
};
use super::MetadataDraft;
use crate::extractors::audible_client::AudibleProduct;
use crate::extractors::audnex_client::AudnexBook;
use crate::extractors::{parse_request, ProviderPayload};
use crate::types::{
    Attempt, CanonicalMetadata, Field, FieldOrigin, IncomingRequest, LooseNumber, Provenance,
    ResolutionPath, SourceIdentifier,
};
use std::collections::BTreeMap;
use tracing::debug;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Preferred Audible cover size
const PREFERRED_IMAGE_SIZE: &str = "500";

/// Map a provider payload onto canonical fields
pub fn normalize(payload: &ProviderPayload) -> MetadataDraft {
    let mut draft = match payload {
        ProviderPayload::Audnex(book) => from_audnex(book),
        ProviderPayload::Audible(product) => from_audible(product),
    };
    draft.mark_populated(payload.source_kind().into());

    debug!(
        source = %payload.source_kind(),
        fields = draft.origins.len(),
        title = ?draft.title,
        "Normalized provider payload"
    );
    draft
}

fn from_audnex(book: &AudnexBook) -> MetadataDraft {
    let series = book
        .series_primary
        .as_ref()
        .or(book.series_secondary.as_ref())
        .and_then(|s| clean_series(&s.name, s.position.as_deref()));
    let (series_name, series_sequence) = split_series(series);

    MetadataDraft {
        title: clean_html(book.title.as_deref()),
        subtitle: clean_html(book.subtitle.as_deref()),
        authors: clean_names(book.authors.iter().map(|p| p.name.as_str())),
        narrators: clean_names(book.narrators.iter().map(|p| p.name.as_str())),
        publisher: clean_text(book.publisher_name.as_deref()),
        description: clean_html(book.summary.as_deref())
            .or_else(|| clean_html(book.description.as_deref())),
        series_name,
        series_sequence,
        genres: clean_genres(
            book.genres
                .iter()
                .filter(|g| g.kind.as_deref().map_or(true, |k| k.eq_ignore_ascii_case("genre")))
                .map(|g| g.name.as_str()),
        ),
        duration_minutes: minutes(book.runtime_length_min.as_ref()),
        cover_url: clean_text(book.image.as_deref()),
        language: book.language.as_deref().and_then(normalize_language),
        release_date: book.release_date.as_deref().and_then(normalize_release_date),
        rating: book
            .rating
            .as_ref()
            .and_then(LooseNumber::as_f64)
            .and_then(clamp_rating),
        source_identifier: book.asin.as_deref().and_then(SourceIdentifier::parse),
        origins: BTreeMap::new(),
    }
}

fn from_audible(product: &AudibleProduct) -> MetadataDraft {
    let series = product
        .series
        .first()
        .and_then(|s| clean_series(&s.title, s.sequence.as_deref()));
    let (series_name, series_sequence) = split_series(series);

    let rating = product
        .rating
        .as_ref()
        .and_then(|r| r.overall_distribution.as_ref())
        .and_then(|d| {
            d.display_average_rating
                .as_ref()
                .and_then(LooseNumber::as_f64)
                .or_else(|| d.average_rating.as_ref().and_then(LooseNumber::as_f64))
        })
        .and_then(clamp_rating);

    MetadataDraft {
        title: clean_html(product.title.as_deref()),
        subtitle: clean_html(product.subtitle.as_deref()),
        authors: clean_names(product.authors.iter().map(|p| p.name.as_str())),
        narrators: clean_names(product.narrators.iter().map(|p| p.name.as_str())),
        publisher: clean_text(product.publisher_name.as_deref()),
        description: clean_html(product.publisher_summary.as_deref())
            .or_else(|| clean_html(product.merchandising_summary.as_deref())),
        series_name,
        series_sequence,
        genres: clean_genres(
            product
                .category_ladders
                .iter()
                .flat_map(|ladder| ladder.ladder.iter())
                .map(|category| category.name.as_str()),
        ),
        duration_minutes: minutes(product.runtime_length_min.as_ref()),
        cover_url: pick_cover(product),
        language: product.language.as_deref().and_then(normalize_language),
        release_date: product
            .release_date
            .as_deref()
            .or(product.issue_date.as_deref())
            .and_then(normalize_release_date),
        rating,
        source_identifier: product.asin.as_deref().and_then(SourceIdentifier::parse),
        origins: BTreeMap::new(),
    }
}

fn split_series(series: Option<(String, Option<String>)>) -> (Option<String>, Option<String>) {
    match series {
        Some((name, sequence)) => (Some(name), sequence),
        None => (None, None),
    }
}

/// Both providers report runtime in minutes
fn minutes(value: Option<&LooseNumber>) -> Option<u32> {
    value
        .and_then(LooseNumber::as_f64)
        .and_then(|m| DurationValue::Minutes(m).to_minutes())
}

/// The 500px image, else the largest one listed
fn pick_cover(product: &AudibleProduct) -> Option<String> {
    let images = &product.product_images;
    images
        .get(PREFERRED_IMAGE_SIZE)
        .or_else(|| {
            images
                .iter()
                .filter_map(|(size, url)| size.parse::<u32>().ok().map(|px| (px, url)))
                .max_by_key(|(px, _)| *px)
                .map(|(_, url)| url)
        })
        .or_else(|| images.values().next())
        .and_then(|url| clean_text(Some(url.as_str())))
}

/// Turn a draft into the canonical record.
///
/// Title and author fall back to the webhook payload (release-name
/// heuristic, explicit author hint) and finally to fixed placeholders, so
/// both are always non-empty.
pub fn finalize(
    draft: MetadataDraft,
    request: &IncomingRequest,
    path: ResolutionPath,
    attempts: Vec<Attempt>,
) -> CanonicalMetadata {
    let guess = parse_request(request);
    let mut origins = draft.origins;

    let title = match draft.title {
        Some(title) => title,
        None => {
            origins.insert(Field::Title, FieldOrigin::Webhook);
            clean_text(Some(guess.title.as_str())).unwrap_or_else(|| UNKNOWN_TITLE.to_string())
        }
    };

    let (author, authors) = if draft.authors.is_empty() {
        origins.insert(Field::Author, FieldOrigin::Webhook);
        match guess
            .author
            .as_deref()
            .map(collapse_whitespace)
            .filter(|a| !is_placeholder(a))
        {
            Some(author) => (author.clone(), vec![author]),
            None => (UNKNOWN_AUTHOR.to_string(), Vec::new()),
        }
    } else {
        (draft.authors.join(", "), draft.authors)
    };

    CanonicalMetadata {
        title,
        author,
        authors,
        subtitle: draft.subtitle,
        narrators: draft.narrators,
        publisher: draft.publisher,
        description: draft.description,
        series_name: draft.series_name,
        series_sequence: draft.series_sequence,
        genres: draft.genres,
        duration_minutes: draft.duration_minutes,
        cover_url: draft.cover_url,
        language: draft.language,
        release_date: draft.release_date,
        rating: draft.rating,
        source_identifier: draft.source_identifier,
        provenance: Provenance {
            path,
            fields: origins,
            attempts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::audible_client::{
        AudibleCategory, AudibleCategoryLadder, AudibleContributor, AudibleRating,
        AudibleRatingDistribution, AudibleSeries,
    };
    use crate::extractors::audnex_client::{AudnexGenre, AudnexPerson, AudnexSeries};
    use crate::types::SourceKind;
    use serde_json::json;

    fn person(name: &str) -> AudnexPerson {
        AudnexPerson {
            asin: None,
            name: name.to_string(),
        }
    }

    fn audnex_book() -> AudnexBook {
        AudnexBook {
            asin: Some("B08G9PRS1K".to_string()),
            title: Some("Project Hail Mary".to_string()),
            authors: vec![person("Andy Weir")],
            narrators: vec![person("Ray Porter"), person("Uncredited")],
            publisher_name: Some("Audible Studios".to_string()),
            summary: Some("<p><b>Ryland Grace</b> is the sole survivor &amp; last hope.</p>".to_string()),
            series_primary: Some(AudnexSeries {
                asin: None,
                name: "Hail Mary".to_string(),
                position: Some("Book 1".to_string()),
            }),
            genres: vec![
                AudnexGenre {
                    asin: None,
                    name: "Science Fiction & Fantasy".to_string(),
                    kind: Some("genre".to_string()),
                },
                AudnexGenre {
                    asin: None,
                    name: "Hard Science Fiction".to_string(),
                    kind: Some("tag".to_string()),
                },
            ],
            runtime_length_min: Some(LooseNumber::Number(970.0)),
            image: Some("https://m.media-amazon.com/images/I/91vS2L5YfEL.jpg".to_string()),
            language: Some("English".to_string()),
            release_date: Some("2021-05-04T00:00:00.000Z".to_string()),
            rating: Some(LooseNumber::Text("4.9".to_string())),
            ..Default::default()
        }
    }

    fn request(value: serde_json::Value) -> IncomingRequest {
        IncomingRequest::from_value(value).unwrap()
    }

    #[test]
    fn audnex_mapping() {
        let draft = normalize(&ProviderPayload::Audnex(audnex_book()));

        assert_eq!(draft.title.as_deref(), Some("Project Hail Mary"));
        assert_eq!(draft.authors, vec!["Andy Weir".to_string()]);
        assert_eq!(draft.narrators, vec!["Ray Porter".to_string()]);
        assert_eq!(
            draft.description.as_deref(),
            Some("Ryland Grace is the sole survivor & last hope.")
        );
        assert_eq!(draft.series_name.as_deref(), Some("Hail Mary"));
        assert_eq!(draft.series_sequence.as_deref(), Some("1"));
        assert_eq!(draft.genres.len(), 1);
        assert_eq!(draft.duration_minutes, Some(970));
        assert_eq!(draft.language.as_deref(), Some("english"));
        assert_eq!(draft.release_date.as_deref(), Some("2021-05-04"));
        assert_eq!(draft.rating, Some(4.9));
        assert_eq!(draft.origins.get(&Field::Title), Some(&FieldOrigin::Primary));
        assert_eq!(draft.origins.get(&Field::Subtitle), None);
    }

    #[test]
    fn audible_mapping() {
        let product = AudibleProduct {
            asin: Some("B0CHYQ2RZ5".to_string()),
            title: Some("The Wolf's Advance".to_string()),
            authors: vec![AudibleContributor {
                asin: None,
                name: "Shane Purdy".to_string(),
            }],
            publisher_summary: Some("&lt;script&gt;alert(1)&lt;/script&gt;<p>War comes.</p>".to_string()),
            series: vec![AudibleSeries {
                asin: None,
                title: "Wolf Saga, Book 2".to_string(),
                sequence: None,
            }],
            runtime_length_min: Some(LooseNumber::Text("745".to_string())),
            product_images: [
                ("252".to_string(), "https://img/small.jpg".to_string()),
                ("1024".to_string(), "https://img/large.jpg".to_string()),
            ]
            .into_iter()
            .collect(),
            issue_date: Some("2023-10-12".to_string()),
            rating: Some(AudibleRating {
                overall_distribution: Some(AudibleRatingDistribution {
                    average_rating: Some(LooseNumber::Number(4.61)),
                    display_average_rating: None,
                }),
            }),
            category_ladders: vec![AudibleCategoryLadder {
                root: Some("Genres".to_string()),
                ladder: vec![
                    AudibleCategory {
                        id: None,
                        name: "Science Fiction & Fantasy".to_string(),
                    },
                    AudibleCategory {
                        id: None,
                        name: "Fantasy".to_string(),
                    },
                ],
            }],
            ..Default::default()
        };

        let draft = normalize(&ProviderPayload::Audible(product));

        assert_eq!(draft.series_name.as_deref(), Some("Wolf Saga"));
        assert_eq!(draft.series_sequence.as_deref(), Some("2"));
        assert_eq!(draft.cover_url.as_deref(), Some("https://img/large.jpg"));
        assert_eq!(draft.duration_minutes, Some(745));
        assert_eq!(draft.release_date.as_deref(), Some("2023-10-12"));
        assert_eq!(draft.rating, Some(4.61));
        assert!(draft.genres.contains("Fantasy"));

        let description = draft.description.unwrap();
        assert!(!description.contains('<') && !description.contains('>'));
        assert!(!description.contains("script"));
        assert!(description.contains("War comes."));
        assert_eq!(draft.origins.get(&Field::Title), Some(&FieldOrigin::Fallback));
    }

    #[test]
    fn normalize_is_deterministic() {
        let payload = ProviderPayload::Audnex(audnex_book());
        let req = request(json!({"name": "Project Hail Mary by Andy Weir"}));

        let first = finalize(normalize(&payload), &req, ResolutionPath::Primary, Vec::new());
        let second = finalize(normalize(&payload), &req, ResolutionPath::Primary, Vec::new());

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn finalize_uses_webhook_when_draft_empty() {
        let req = request(json!({"name": "The Wolf's Advance by Shane Purdy [English / m4b]"}));
        let attempts = vec![
            Attempt {
                source: SourceKind::Scrape,
                adapter: "MAM".to_string(),
                outcome: "not_found".to_string(),
            },
            Attempt {
                source: SourceKind::Fallback,
                adapter: "Audible".to_string(),
                outcome: "unavailable".to_string(),
            },
        ];

        let record = finalize(MetadataDraft::default(), &req, ResolutionPath::PayloadOnly, attempts);

        assert_eq!(record.title, "The Wolf's Advance");
        assert_eq!(record.author, "Shane Purdy");
        assert_eq!(record.provenance.origin_of(Field::Title), Some(FieldOrigin::Webhook));
        assert_eq!(record.provenance.origin_of(Field::Author), Some(FieldOrigin::Webhook));
        assert_eq!(record.provenance.attempts.len(), 2);
    }

    #[test]
    fn finalize_last_resort_placeholders() {
        let record = finalize(
            MetadataDraft::default(),
            &request(json!({})),
            ResolutionPath::PayloadOnly,
            Vec::new(),
        );
        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.author, UNKNOWN_AUTHOR);
        assert!(record.authors.is_empty());
    }

    #[test]
    fn provider_authors_joined_for_display() {
        let mut book = audnex_book();
        book.authors.push(person("Second Author"));
        let record = finalize(
            normalize(&ProviderPayload::Audnex(book)),
            &request(json!({"name": "ignored by someone"})),
            ResolutionPath::Primary,
            Vec::new(),
        );
        assert_eq!(record.author, "Andy Weir, Second Author");
        assert_eq!(record.provenance.origin_of(Field::Author), Some(FieldOrigin::Primary));
    }

    #[test]
    fn scraped_identifier_attached_when_payload_has_none() {
        let id = SourceIdentifier::parse("B0CHYQ2RZ5").unwrap();
        let draft = MetadataDraft::default().with_identifier(id.clone(), FieldOrigin::Scrape);
        assert_eq!(draft.source_identifier, Some(id));
        assert_eq!(draft.origins.get(&Field::SourceIdentifier), Some(&FieldOrigin::Scrape));
    }
}
