use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{join_address, FetchRequest, VenueProvider};
use crate::errors::{AppError, AppResult};
use crate::venue::{RawVenue, VenueCategory};

const MAX_PAGE_SIZE: usize = 50;
// Yelp rejects searches where offset + limit exceeds this.
const MAX_RESULT_WINDOW: usize = 1000;

pub struct YelpClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl YelpClient {
    pub fn new(http: Client, api_key: SecretString, base_url: &str) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
}

#[derive(Deserialize)]
struct Business {
    id: String,
    name: Option<String>,
    rating: Option<f64>,
    price: Option<String>,
    image_url: Option<String>,
    is_closed: Option<bool>,
    location: Option<BusinessLocation>,
    #[serde(default)]
    business_hours: Vec<BusinessHours>,
}

#[derive(Deserialize)]
struct BusinessHours {
    is_open_now: Option<bool>,
}

#[derive(Deserialize)]
struct BusinessLocation {
    #[serde(default)]
    display_address: Vec<String>,
}

#[async_trait]
impl VenueProvider for YelpClient {
    fn source_tag(&self) -> &'static str {
        "yelp"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>> {
        let categories = match request.category {
            VenueCategory::Restaurant => "restaurants",
            VenueCategory::Activity => "active,arts",
            VenueCategory::Event => {
                return Err(AppError::Provider("yelp does not serve events".into()))
            }
        };
        if request.offset >= MAX_RESULT_WINDOW {
            return Ok(Vec::new());
        }
        let limit = request
            .limit
            .clamp(1, MAX_PAGE_SIZE)
            .min(MAX_RESULT_WINDOW - request.offset);

        let response = self
            .http
            .get(format!("{}/v3/businesses/search", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .query(&[
                ("location", request.location.to_string()),
                ("categories", categories.to_string()),
                ("limit", limit.to_string()),
                ("offset", request.offset.to_string()),
                ("sort_by", "best_match".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|err| AppError::Provider(format!("malformed yelp payload: {err}")))?;

        Ok(parsed
            .businesses
            .into_iter()
            .filter(|business| business.is_closed != Some(true))
            .map(|business| RawVenue {
                native_id: business.id,
                name: business.name,
                address: business.location.and_then(|location| {
                    join_address(location.display_address.iter().map(|line| Some(line.as_str())))
                }),
                rating: business.rating,
                rating_scale: None,
                price_level: business.price.as_deref().map(dollar_price_level),
                photo_url: business.image_url,
                open_now: business
                    .business_hours
                    .iter()
                    .find_map(|hours| hours.is_open_now),
                is_upcoming: None,
            })
            .collect())
    }
}

fn dollar_price_level(value: &str) -> u8 {
    value.chars().filter(|c| *c == '$').count().min(4) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_dollar_signs() {
        assert_eq!(dollar_price_level("$$"), 2);
        assert_eq!(dollar_price_level("$$$$$"), 4);
        assert_eq!(dollar_price_level(""), 0);
    }
}
