use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{join_address, price_level_from_amount, split_location, FetchRequest, VenueProvider};
use crate::errors::{AppError, AppResult};
use crate::venue::{RawVenue, VenueCategory};

const MAX_PAGE_SIZE: usize = 200;

pub struct TicketmasterClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl TicketmasterClient {
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
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedEvents>,
}

#[derive(Deserialize)]
struct EmbeddedEvents {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct Event {
    id: String,
    name: Option<String>,
    #[serde(default)]
    images: Vec<Image>,
    dates: Option<Dates>,
    #[serde(rename = "priceRanges", default)]
    price_ranges: Vec<PriceRange>,
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedVenues>,
}

#[derive(Deserialize)]
struct Image {
    url: Option<String>,
}

#[derive(Deserialize)]
struct Dates {
    start: Option<StartDate>,
}

#[derive(Deserialize)]
struct StartDate {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    #[serde(rename = "localDate")]
    local_date: Option<String>,
}

#[derive(Deserialize)]
struct PriceRange {
    min: Option<f64>,
}

#[derive(Deserialize)]
struct EmbeddedVenues {
    #[serde(default)]
    venues: Vec<Venue>,
}

#[derive(Deserialize)]
struct Venue {
    name: Option<String>,
    address: Option<VenueAddress>,
    city: Option<VenueCity>,
}

#[derive(Deserialize)]
struct VenueAddress {
    line1: Option<String>,
}

#[derive(Deserialize)]
struct VenueCity {
    name: Option<String>,
}

#[async_trait]
impl VenueProvider for TicketmasterClient {
    fn source_tag(&self) -> &'static str {
        "ticketmaster"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>> {
        if request.category != VenueCategory::Event {
            return Err(AppError::Provider(format!(
                "ticketmaster does not serve {}",
                request.category
            )));
        }
        let size = request.limit.clamp(1, MAX_PAGE_SIZE);
        let page = request.offset / size;
        let location = split_location(request.location);

        let mut query = vec![
            ("apikey", self.api_key.expose_secret().to_string()),
            ("city", location.city.to_string()),
            ("size", size.to_string()),
            ("page", page.to_string()),
            ("sort", "date,asc".to_string()),
        ];
        if let Some(state) = location.state {
            query.push(("stateCode", state.to_ascii_uppercase()));
        }

        let response = self
            .http
            .get(format!("{}/discovery/v2/events.json", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let parsed: SearchResponse = response.json().await.map_err(|err| {
            AppError::Provider(format!("malformed ticketmaster payload: {err}"))
        })?;

        let now = Utc::now();
        Ok(parsed
            .embedded
            .map(|embedded| embedded.events)
            .unwrap_or_default()
            .into_iter()
            .map(|event| {
                let venue = event
                    .embedded
                    .and_then(|embedded| embedded.venues.into_iter().next());
                let address = venue.and_then(|venue| {
                    join_address([
                        venue.name.as_deref(),
                        venue.address.as_ref().and_then(|a| a.line1.as_deref()),
                        venue.city.as_ref().and_then(|c| c.name.as_deref()),
                    ])
                });
                let lowest_price = event
                    .price_ranges
                    .iter()
                    .filter_map(|range| range.min)
                    .reduce(f64::min);
                RawVenue {
                    native_id: event.id,
                    name: event.name,
                    address,
                    rating: None,
                    rating_scale: None,
                    price_level: price_level_from_amount(lowest_price),
                    photo_url: event.images.into_iter().find_map(|image| image.url),
                    open_now: None,
                    is_upcoming: event
                        .dates
                        .and_then(|dates| dates.start)
                        .and_then(|start| is_upcoming(&start, now)),
                }
            })
            .collect())
    }
}

fn is_upcoming(start: &StartDate, now: DateTime<Utc>) -> Option<bool> {
    if let Some(when) = start
        .date_time
        .as_deref()
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
    {
        return Some(when.with_timezone(&Utc) >= now);
    }
    start
        .local_date
        .as_deref()
        .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
        .map(|date| date >= now.date_naive())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn prefers_precise_start_time() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let start = StartDate {
            date_time: Some("2024-06-01T02:00:00Z".into()),
            local_date: Some("2024-06-01".into()),
        };
        assert_eq!(is_upcoming(&start, now), Some(false));

        let day_only = StartDate {
            date_time: None,
            local_date: Some("2024-06-01".into()),
        };
        assert_eq!(is_upcoming(&day_only, now), Some(true));
    }
}
