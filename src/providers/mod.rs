mod google;
mod seatgeek;
mod ticketmaster;
mod yelp;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::normalizer::normalize;
use crate::venue::{RawVenue, VenueCategory, VenueRecord};

pub use google::GooglePlacesClient;
pub use seatgeek::SeatGeekClient;
pub use ticketmaster::TicketmasterClient;
pub use yelp::YelpClient;

const USER_AGENT: &str = "venue-feed/0.1.0";

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub location: &'a str,
    pub category: VenueCategory,
    pub limit: usize,
    pub offset: usize,
    pub exclude_ids: &'a HashSet<String>,
}

#[async_trait]
pub trait VenueProvider: Send + Sync {
    fn source_tag(&self) -> &'static str;

    async fn fetch(&self, request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>>;
}

/// Binds a provider to one category and turns its output into normalized records.
/// Provider failures stop here: they are logged and become an empty result.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn VenueProvider>,
    category: VenueCategory,
    weight: u32,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn VenueProvider>, category: VenueCategory, weight: u32) -> Self {
        Self {
            provider,
            category,
            weight: weight.max(1),
        }
    }

    pub fn category(&self) -> VenueCategory {
        self.category
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn source_tag(&self) -> &'static str {
        self.provider.source_tag()
    }

    pub async fn fetch(
        &self,
        location: &str,
        limit: usize,
        offset: usize,
        exclude_ids: &HashSet<String>,
    ) -> Vec<VenueRecord> {
        if limit == 0 {
            return Vec::new();
        }

        let source = self.source_tag();
        let request = FetchRequest {
            location,
            category: self.category,
            limit,
            offset,
            exclude_ids,
        };
        match self.provider.fetch(&request).await {
            Ok(raw) => {
                let received = raw.len();
                let records: Vec<VenueRecord> = raw
                    .into_iter()
                    .filter_map(|item| normalize(item, source, self.category))
                    .filter(|record| !exclude_ids.contains(&record.id))
                    .take(limit)
                    .collect();
                trace!(
                    source,
                    category = %self.category,
                    received,
                    kept = records.len(),
                    "provider batch normalized"
                );
                records
            }
            Err(err) => {
                warn!(
                    ?err,
                    source,
                    category = %self.category,
                    location,
                    "provider fetch failed; contributing no venues"
                );
                Vec::new()
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: Vec<ProviderAdapter>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.provider_timeout())
            .build()
            .map_err(|err| AppError::Config(format!("unable to build provider http client: {err}")))?;
        let mut registry = Self::new();

        match config.google_places_api_key.clone() {
            Some(key) => {
                let google = Arc::new(GooglePlacesClient::new(
                    http.clone(),
                    key,
                    &config.google_places_base_url,
                ));
                registry.register(ProviderAdapter::new(
                    google.clone(),
                    VenueCategory::Restaurant,
                    7,
                ));
                registry.register(ProviderAdapter::new(google, VenueCategory::Activity, 10));
            }
            None => debug!("google places key missing; restaurant and activity source skipped"),
        }

        match config.yelp_api_key.clone() {
            Some(key) => registry.register(ProviderAdapter::new(
                Arc::new(YelpClient::new(http.clone(), key, &config.yelp_base_url)),
                VenueCategory::Restaurant,
                3,
            )),
            None => debug!("yelp key missing; restaurant source skipped"),
        }

        match config.ticketmaster_api_key.clone() {
            Some(key) => registry.register(ProviderAdapter::new(
                Arc::new(TicketmasterClient::new(
                    http.clone(),
                    key,
                    &config.ticketmaster_base_url,
                )),
                VenueCategory::Event,
                6,
            )),
            None => debug!("ticketmaster key missing; event source skipped"),
        }

        match config.seatgeek_client_id.clone() {
            Some(key) => registry.register(ProviderAdapter::new(
                Arc::new(SeatGeekClient::new(http, key, &config.seatgeek_base_url)),
                VenueCategory::Event,
                4,
            )),
            None => debug!("seatgeek client id missing; event source skipped"),
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: ProviderAdapter) {
        self.adapters.push(adapter);
    }

    pub fn with(mut self, adapter: ProviderAdapter) -> Self {
        self.register(adapter);
        self
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Adapters for `category`, highest-coverage (largest weight) first.
    pub fn adapters_for(&self, category: VenueCategory) -> Vec<&ProviderAdapter> {
        let mut matching: Vec<&ProviderAdapter> = self
            .adapters
            .iter()
            .filter(|adapter| adapter.category == category)
            .collect();
        matching.sort_by(|a, b| b.weight.cmp(&a.weight));
        matching
    }
}

pub(crate) struct LocationParts<'a> {
    pub city: &'a str,
    pub state: Option<&'a str>,
}

// "Minneapolis, MN" -> city + two-letter state; anything else is treated as a bare city.
pub(crate) fn split_location(location: &str) -> LocationParts<'_> {
    let mut parts = location.split(',').map(str::trim);
    let city = parts.next().unwrap_or_default();
    let state = parts
        .next()
        .filter(|value| value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()));
    LocationParts { city, state }
}

pub(crate) fn price_level_from_amount(amount: Option<f64>) -> Option<u8> {
    let amount = amount.filter(|value| value.is_finite())?;
    let level = match amount {
        a if a <= 0.0 => 0,
        a if a < 25.0 => 1,
        a if a < 75.0 => 2,
        a if a < 150.0 => 3,
        _ => 4,
    };
    Some(level)
}

pub(crate) fn join_address<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::errors::AppError;

    struct ScriptedProvider {
        responses: Mutex<Vec<AppResult<Vec<RawVenue>>>>,
    }

    #[async_trait]
    impl VenueProvider for ScriptedProvider {
        fn source_tag(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, _request: &FetchRequest<'_>) -> AppResult<Vec<RawVenue>> {
            self.responses.lock().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn raw(id: &str, name: Option<&str>) -> RawVenue {
        RawVenue {
            native_id: id.into(),
            name: name.map(str::to_string),
            ..RawVenue::default()
        }
    }

    #[tokio::test]
    async fn absorbs_provider_failures() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![Err(AppError::Provider("boom".into()))]),
        };
        let adapter = ProviderAdapter::new(Arc::new(provider), VenueCategory::Event, 1);
        let records = adapter.fetch("Duluth, MN", 10, 0, &HashSet::new()).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn normalizes_filters_and_caps_output() {
        let provider = ScriptedProvider {
            responses: Mutex::new(vec![Ok(vec![
                raw("1", Some("Alpha")),
                raw("2", None),
                raw("3", Some("Bravo")),
                raw("4", Some("Charlie")),
                raw("5", Some("Delta")),
            ])]),
        };
        let adapter = ProviderAdapter::new(Arc::new(provider), VenueCategory::Activity, 1);
        let exclude: HashSet<String> = ["scripted-3".to_string()].into_iter().collect();
        let records = adapter.fetch("Duluth, MN", 2, 0, &exclude).await;
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["scripted-1", "scripted-4"]);
        assert!(records
            .iter()
            .all(|r| r.category == VenueCategory::Activity && r.source_tag == "scripted"));
    }

    #[test]
    fn orders_adapters_by_weight() {
        let light = ScriptedProvider {
            responses: Mutex::new(Vec::new()),
        };
        let heavy = ScriptedProvider {
            responses: Mutex::new(Vec::new()),
        };
        let registry = ProviderRegistry::new()
            .with(ProviderAdapter::new(
                Arc::new(light),
                VenueCategory::Restaurant,
                3,
            ))
            .with(ProviderAdapter::new(
                Arc::new(heavy),
                VenueCategory::Restaurant,
                7,
            ));
        let weights: Vec<u32> = registry
            .adapters_for(VenueCategory::Restaurant)
            .iter()
            .map(|a| a.weight())
            .collect();
        assert_eq!(weights, vec![7, 3]);
        assert!(registry.adapters_for(VenueCategory::Event).is_empty());
    }

    #[test]
    fn splits_city_and_state() {
        let parts = split_location("Minneapolis, MN");
        assert_eq!(parts.city, "Minneapolis");
        assert_eq!(parts.state, Some("MN"));
        let bare = split_location("Paris, France");
        assert_eq!(bare.city, "Paris");
        assert_eq!(bare.state, None);
        assert_eq!(price_level_from_amount(Some(60.0)), Some(2));
        assert_eq!(
            join_address([Some("First Avenue"), None, Some(" 701 N 1st Ave ")]),
            Some("First Avenue, 701 N 1st Ave".to_string())
        );
    }

    #[test]
    fn registers_only_configured_providers() {
        let mut config = AppConfig::default();
        config.yelp_api_key = Some("key".to_string().into());
        config.seatgeek_client_id = Some("client".to_string().into());
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.adapters_for(VenueCategory::Restaurant).len(), 1);
        assert_eq!(registry.adapters_for(VenueCategory::Event).len(), 1);
        assert!(registry.adapters_for(VenueCategory::Activity).is_empty());
    }
}
