use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{FetchRequest, VenueProvider};
use crate::errors::{AppError, AppResult};
use crate::venue::{RawVenue, VenueCategory};

const MAX_RESULT_COUNT: usize = 20;
const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.rating,places.priceLevel,places.currentOpeningHours,places.photos";

/// Places text search. Serves both restaurant and activity adapters; the query
/// phrase changes with the requested category. The API has no offset, so repeated
/// pages come back as duplicates and are collapsed downstream.
pub struct GooglePlacesClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl GooglePlacesClient {
    pub fn new(http: Client, api_key: SecretString, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn text_query(category: VenueCategory, location: &str) -> String {
        match category {
            VenueCategory::Restaurant => format!("restaurants in {location}"),
            VenueCategory::Activity => format!("things to do in {location}"),
            VenueCategory::Event => format!("event venues in {location}"),
        }
    }

    fn photo_url(&self, photo_name: &str) -> String {
        format!("{}/v1/{photo_name}/media?maxWidthPx=640", self.base_url)
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(rename = "textQuery")]
    text_query: &'a str,
    #[serde(rename = "maxResultCount")]
    max_result_count: usize,
}

#[derive(Deserialize)]
struct Response {
    places: Option<Vec<ResponsePlace>>,
}

#[derive(Deserialize)]
struct ResponsePlace {
    id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<ResponseText>,
    #[serde(rename = "formattedAddress")]
    formatted_address: Option<String>,
    rating: Option<f64>,
    #[serde(rename = "priceLevel")]
    price_level: Option<String>,
    #[serde(rename = "currentOpeningHours")]
    current_opening_hours: Option<OpeningHours>,
    photos: Option<Vec<ResponsePhoto>>,
}

#[derive(Deserialize)]
struct ResponseText {
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpeningHours {
    #[serde(rename = "openNow")]
    open_now: Option<bool>,
}

#[derive(Deserialize)]
struct ResponsePhoto {
    name: Option<String>,
}

#[async_trait]
impl VenueProvider for GooglePlacesClient {
    fn source_tag(&self) -> &'static str {
        "google"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>> {
        let query = Self::text_query(request.category, request.location);
        let body = RequestBody {
            text_query: &query,
            max_result_count: request.limit.clamp(1, MAX_RESULT_COUNT),
        };

        let response = self
            .http
            .post(format!("{}/v1/places:searchText", self.base_url))
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response
            .json()
            .await
            .map_err(|err| AppError::Provider(format!("malformed places payload: {err}")))?;

        Ok(parsed
            .places
            .unwrap_or_default()
            .into_iter()
            .filter_map(|place| {
                let native_id = place.id?;
                Some(RawVenue {
                    native_id,
                    name: place.display_name.and_then(|text| text.text),
                    address: place.formatted_address,
                    rating: place.rating,
                    rating_scale: None,
                    price_level: place.price_level.as_deref().and_then(parse_price_level),
                    photo_url: place
                        .photos
                        .and_then(|photos| photos.into_iter().find_map(|photo| photo.name))
                        .map(|name| self.photo_url(&name)),
                    open_now: place.current_opening_hours.and_then(|hours| hours.open_now),
                    is_upcoming: None,
                })
            })
            .collect())
    }
}

fn parse_price_level(value: &str) -> Option<u8> {
    match value {
        "PRICE_LEVEL_FREE" => Some(0),
        "PRICE_LEVEL_INEXPENSIVE" => Some(1),
        "PRICE_LEVEL_MODERATE" => Some(2),
        "PRICE_LEVEL_EXPENSIVE" => Some(3),
        "PRICE_LEVEL_VERY_EXPENSIVE" => Some(4),
        _ => None,
    }
}
