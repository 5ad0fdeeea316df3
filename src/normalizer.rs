use crate::venue::{RawVenue, VenueCategory, VenueRecord};

const MAX_PRICE_LEVEL: u8 = 4;
const RATING_CEILING: f64 = 5.0;

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

const BUSINESS_SUFFIXES: &[&str] = &[
    "restaurant",
    "restaurants",
    "bar",
    "cafe",
    "café",
    "grill",
    "kitchen",
    "diner",
    "bistro",
    "eatery",
    "pub",
    "tavern",
    "inc",
    "llc",
    "ltd",
    "co",
];

/// Dedup key for a display name: lower-cased, punctuation-free, without a leading
/// article or trailing generic business words. Empty when nothing alphanumeric remains.
pub fn identity_key(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    while tokens.len() > 1 && LEADING_ARTICLES.contains(&tokens[0]) {
        tokens.remove(0);
    }
    while tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|last| BUSINESS_SUFFIXES.contains(last))
    {
        tokens.pop();
    }

    tokens.concat()
}

pub fn same_venue(left: &VenueRecord, right: &VenueRecord) -> bool {
    left.category == right.category && left.normalized_identity == right.normalized_identity
}

pub fn normalize(raw: RawVenue, source_tag: &str, category: VenueCategory) -> Option<VenueRecord> {
    let name = raw
        .name
        .as_deref()
        .map(collapse_whitespace)
        .filter(|value| !value.is_empty())?;
    let normalized_identity = identity_key(&name);
    if normalized_identity.is_empty() {
        return None;
    }

    let native_id = raw.native_id.trim();
    let id = if native_id.is_empty() {
        format!("{source_tag}-{normalized_identity}")
    } else {
        format!("{source_tag}-{native_id}")
    };

    Some(VenueRecord {
        id,
        name,
        normalized_identity,
        category,
        address: raw
            .address
            .as_deref()
            .map(collapse_whitespace)
            .unwrap_or_default(),
        rating: scale_rating(raw.rating, raw.rating_scale),
        price_level: raw.price_level.unwrap_or(0).min(MAX_PRICE_LEVEL),
        photo_url: raw
            .photo_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        open_now: raw.open_now,
        is_upcoming: raw.is_upcoming,
        source_tag: source_tag.to_string(),
    })
}

fn scale_rating(rating: Option<f64>, scale: Option<f64>) -> Option<f64> {
    let rating = rating.filter(|value| value.is_finite())?;
    let scale = scale
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or(RATING_CEILING);
    let scaled = rating / scale * RATING_CEILING;
    Some(((scaled * 10.0).round() / 10.0).clamp(0.0, RATING_CEILING))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
