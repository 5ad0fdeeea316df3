use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const FALLBACK_ID_PREFIX: &str = "fallback-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueCategory {
    Restaurant,
    Activity,
    Event,
}

impl VenueCategory {
    pub const ALL: [VenueCategory; 3] = [
        VenueCategory::Restaurant,
        VenueCategory::Activity,
        VenueCategory::Event,
    ];

    pub fn as_tag(&self) -> &'static str {
        match self {
            VenueCategory::Restaurant => "restaurant",
            VenueCategory::Activity => "activity",
            VenueCategory::Event => "event",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "restaurant" | "restaurants" => Ok(VenueCategory::Restaurant),
            "activity" | "activities" => Ok(VenueCategory::Activity),
            "event" | "events" => Ok(VenueCategory::Event),
            _ => Err(AppError::InvalidRequest(format!(
                "invalid venue category: {value}"
            ))),
        }
    }
}

impl fmt::Display for VenueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRecord {
    pub id: String,
    pub name: String,
    pub normalized_identity: String,
    pub category: VenueCategory,
    pub address: String,
    pub rating: Option<f64>,
    pub price_level: u8,
    pub photo_url: Option<String>,
    pub open_now: Option<bool>,
    pub is_upcoming: Option<bool>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub source_tag: String,
}

impl VenueRecord {
    pub fn is_fallback(&self) -> bool {
        self.id.starts_with(FALLBACK_ID_PREFIX)
    }
}

/// Provider-neutral shape every client maps its payload into before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawVenue {
    pub native_id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub rating: Option<f64>,
    /// Upper bound of the provider's rating scale; 5.0 when unset.
    pub rating_scale: Option<f64>,
    pub price_level: Option<u8>,
    pub photo_url: Option<String>,
    pub open_now: Option<bool>,
    pub is_upcoming: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_category_tags_case_insensitively() {
        assert_eq!(
            VenueCategory::parse(" Restaurants ").unwrap(),
            VenueCategory::Restaurant
        );
        assert_eq!(VenueCategory::parse("EVENT").unwrap(), VenueCategory::Event);
        assert!(matches!(
            VenueCategory::parse("museum"),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn serializes_without_source_tag() {
        let record = VenueRecord {
            id: "yelp-1".into(),
            name: "Alma".into(),
            normalized_identity: "alma".into(),
            category: VenueCategory::Restaurant,
            address: String::new(),
            rating: Some(4.5),
            price_level: 2,
            photo_url: None,
            open_now: Some(true),
            is_upcoming: None,
            source_tag: "yelp".into(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["category"], "restaurant");
        assert_eq!(value["normalizedIdentity"], "alma");
        assert!(value.get("sourceTag").is_none());
        assert!(!record.is_fallback());
    }
}
