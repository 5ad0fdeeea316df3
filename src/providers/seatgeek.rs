use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{join_address, price_level_from_amount, split_location, FetchRequest, VenueProvider};
use crate::errors::{AppError, AppResult};
use crate::venue::{RawVenue, VenueCategory};

const MAX_PAGE_SIZE: usize = 100;
// Event scores are reported on a 0..1 popularity scale.
const SCORE_SCALE: f64 = 1.0;

pub struct SeatGeekClient {
    http: Client,
    client_id: SecretString,
    base_url: String,
}

impl SeatGeekClient {
    pub fn new(http: Client, client_id: SecretString, base_url: &str) -> Self {
        Self {
            http,
            client_id,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct Event {
    id: u64,
    title: Option<String>,
    datetime_utc: Option<String>,
    score: Option<f64>,
    venue: Option<Venue>,
    #[serde(default)]
    performers: Vec<Performer>,
    stats: Option<Stats>,
}

#[derive(Deserialize)]
struct Venue {
    name: Option<String>,
    address: Option<String>,
    extended_address: Option<String>,
}

#[derive(Deserialize)]
struct Performer {
    image: Option<String>,
}

#[derive(Deserialize)]
struct Stats {
    lowest_price: Option<f64>,
}

#[async_trait]
impl VenueProvider for SeatGeekClient {
    fn source_tag(&self) -> &'static str {
        "seatgeek"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>> {
        if request.category != VenueCategory::Event {
            return Err(AppError::Provider(format!(
                "seatgeek does not serve {}",
                request.category
            )));
        }
        let per_page = request.limit.clamp(1, MAX_PAGE_SIZE);
        let page = request.offset / per_page + 1;
        let location = split_location(request.location);

        let mut query = vec![
            ("client_id", self.client_id.expose_secret().to_string()),
            ("venue.city", location.city.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(state) = location.state {
            query.push(("venue.state", state.to_ascii_uppercase()));
        }

        let response = self
            .http
            .get(format!("{}/2/events", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let parsed: EventsResponse = response
            .json()
            .await
            .map_err(|err| AppError::Provider(format!("malformed seatgeek payload: {err}")))?;

        let now = Utc::now().naive_utc();
        Ok(parsed
            .events
            .into_iter()
            .map(|event| RawVenue {
                native_id: event.id.to_string(),
                name: event.title,
                address: event.venue.and_then(|venue| {
                    join_address([
                        venue.name.as_deref(),
                        venue.address.as_deref(),
                        venue.extended_address.as_deref(),
                    ])
                }),
                rating: event.score.filter(|score| *score > 0.0),
                rating_scale: Some(SCORE_SCALE),
                price_level: price_level_from_amount(
                    event.stats.and_then(|stats| stats.lowest_price),
                ),
                photo_url: event
                    .performers
                    .into_iter()
                    .find_map(|performer| performer.image),
                open_now: None,
                is_upcoming: event
                    .datetime_utc
                    .as_deref()
                    .and_then(|value| {
                        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok()
                    })
                    .map(|start| start >= now),
            })
            .collect())
    }
}
