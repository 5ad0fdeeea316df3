use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, warn};

use crate::venue::VenueCategory;

const DEFAULT_POOL_TARGET_SIZE: usize = 150;
const DEFAULT_POOL_TTL_SECS: u64 = 30 * 60;
const DEFAULT_EXHAUSTION_RATIO: f64 = 0.5;
const MAX_POOL_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_IDLE_EVICTION_FACTOR: u32 = 1_000;

pub const GOOGLE_PLACES_BASE_URL: &str = "https://places.googleapis.com";
pub const YELP_BASE_URL: &str = "https://api.yelp.com";
pub const TICKETMASTER_BASE_URL: &str = "https://app.ticketmaster.com";
pub const SEATGEEK_BASE_URL: &str = "https://api.seatgeek.com";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub pool_target_size: usize,
    pub pool_ttl_secs: u64,
    pub pool_exhaustion_ratio: f64,
    pub pool_idle_eviction_factor: u32,
    pub pool_max_entries: usize,
    pub category_priority: Vec<VenueCategory>,
    pub feed_rate_limit_per_minute: u32,
    pub max_page_size: usize,
    pub provider_http_timeout_secs: u64,
    pub google_places_api_key: Option<SecretString>,
    pub yelp_api_key: Option<SecretString>,
    pub ticketmaster_api_key: Option<SecretString>,
    pub seatgeek_client_id: Option<SecretString>,
    pub google_places_base_url: String,
    pub yelp_base_url: String,
    pub ticketmaster_base_url: String,
    pub seatgeek_base_url: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub pool_target_size: usize,
    pub pool_ttl_secs: u64,
    pub pool_exhaustion_ratio: f64,
    pub pool_idle_eviction_factor: u32,
    pub pool_max_entries: usize,
    pub category_priority: Vec<VenueCategory>,
    pub feed_rate_limit_per_minute: u32,
    pub max_page_size: usize,
    pub has_google_places_key: bool,
    pub has_yelp_key: bool,
    pub has_ticketmaster_key: bool,
    pub has_seatgeek_client_id: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            pool_target_size: parse_usize("POOL_TARGET_SIZE", DEFAULT_POOL_TARGET_SIZE).max(1),
            pool_ttl_secs: parse_u64("POOL_TTL_SECS", DEFAULT_POOL_TTL_SECS)
                .clamp(1, MAX_POOL_TTL_SECS),
            pool_exhaustion_ratio: parse_f64("POOL_EXHAUSTION_RATIO", DEFAULT_EXHAUSTION_RATIO)
                .clamp(0.0, 1.0),
            pool_idle_eviction_factor: parse_u32("POOL_IDLE_EVICTION_FACTOR", 4)
                .clamp(1, MAX_IDLE_EVICTION_FACTOR),
            pool_max_entries: parse_usize("POOL_MAX_ENTRIES", 256).max(1),
            category_priority: parse_priority("CATEGORY_PRIORITY"),
            feed_rate_limit_per_minute: parse_u32("FEED_RATE_LIMIT_PER_MINUTE", 60).max(1),
            max_page_size: parse_usize("MAX_PAGE_SIZE", 100).max(1),
            provider_http_timeout_secs: parse_u64("PROVIDER_HTTP_TIMEOUT_SECS", 10).max(1),
            google_places_api_key: parse_secret("GOOGLE_PLACES_API_KEY"),
            yelp_api_key: parse_secret("YELP_API_KEY"),
            ticketmaster_api_key: parse_secret("TICKETMASTER_API_KEY"),
            seatgeek_client_id: parse_secret("SEATGEEK_CLIENT_ID"),
            google_places_base_url: parse_url("GOOGLE_PLACES_BASE_URL", GOOGLE_PLACES_BASE_URL),
            yelp_base_url: parse_url("YELP_BASE_URL", YELP_BASE_URL),
            ticketmaster_base_url: parse_url("TICKETMASTER_BASE_URL", TICKETMASTER_BASE_URL),
            seatgeek_base_url: parse_url("SEATGEEK_BASE_URL", SEATGEEK_BASE_URL),
        }
    }

    pub fn pool_ttl(&self) -> Duration {
        Duration::from_secs(self.pool_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_http_timeout_secs)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            pool_target_size: self.pool_target_size,
            pool_ttl_secs: self.pool_ttl_secs,
            pool_exhaustion_ratio: self.pool_exhaustion_ratio,
            pool_idle_eviction_factor: self.pool_idle_eviction_factor,
            pool_max_entries: self.pool_max_entries,
            category_priority: self.category_priority.clone(),
            feed_rate_limit_per_minute: self.feed_rate_limit_per_minute,
            max_page_size: self.max_page_size,
            has_google_places_key: self.google_places_api_key.is_some(),
            has_yelp_key: self.yelp_api_key.is_some(),
            has_ticketmaster_key: self.ticketmaster_api_key.is_some(),
            has_seatgeek_client_id: self.seatgeek_client_id.is_some(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool_target_size: DEFAULT_POOL_TARGET_SIZE,
            pool_ttl_secs: DEFAULT_POOL_TTL_SECS,
            pool_exhaustion_ratio: DEFAULT_EXHAUSTION_RATIO,
            pool_idle_eviction_factor: 4,
            pool_max_entries: 256,
            category_priority: VenueCategory::ALL.to_vec(),
            feed_rate_limit_per_minute: 60,
            max_page_size: 100,
            provider_http_timeout_secs: 10,
            google_places_api_key: None,
            yelp_api_key: None,
            ticketmaster_api_key: None,
            seatgeek_client_id: None,
            google_places_base_url: GOOGLE_PLACES_BASE_URL.into(),
            yelp_base_url: YELP_BASE_URL.into(),
            ticketmaster_base_url: TICKETMASTER_BASE_URL.into(),
            seatgeek_base_url: SEATGEEK_BASE_URL.into(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn parse_secret(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn parse_url(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// Categories missing from the configured list keep their default relative order
// after the listed ones, so every category always receives a quota.
fn parse_priority(key: &str) -> Vec<VenueCategory> {
    let Ok(raw) = env::var(key) else {
        return VenueCategory::ALL.to_vec();
    };

    let mut order = Vec::with_capacity(VenueCategory::ALL.len());
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match VenueCategory::parse(tag) {
            Ok(category) if !order.contains(&category) => order.push(category),
            Ok(_) => {}
            Err(err) => warn!(?err, key, "ignoring unknown category in priority list"),
        }
    }
    for category in VenueCategory::ALL {
        if !order.contains(&category) {
            order.push(category);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for one test and removes them again on drop.
    struct ScopedEnv(Vec<&'static str>);

    impl ScopedEnv {
        fn set(vars: &[(&'static str, &str)]) -> Self {
            for (key, value) in vars {
                env::set_var(key, value);
            }
            Self(vars.iter().map(|(key, _)| *key).collect())
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for key in &self.0 {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn builds_public_profile_without_secrets() {
        let _env = ScopedEnv::set(&[
            ("YELP_API_KEY", "secret"),
            ("GOOGLE_PLACES_API_KEY", "secret"),
            ("POOL_TARGET_SIZE", "90"),
            ("POOL_TTL_SECS", "99999999999999999"),
            ("POOL_IDLE_EVICTION_FACTOR", "3000000000"),
            ("CATEGORY_PRIORITY", "event, restaurant, bogus"),
            ("YELP_BASE_URL", "http://127.0.0.1:9000/"),
        ]);

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.pool_target_size, 90);
        assert!(public.has_google_places_key);
        assert!(public.has_yelp_key);
        assert!(config.yelp_api_key.is_some());
        assert_eq!(config.yelp_base_url, "http://127.0.0.1:9000");
        assert_eq!(
            public.category_priority,
            vec![
                VenueCategory::Event,
                VenueCategory::Restaurant,
                VenueCategory::Activity
            ]
        );
        assert_eq!(public.pool_ttl_secs, MAX_POOL_TTL_SECS);
        assert_eq!(config.pool_ttl().as_secs(), MAX_POOL_TTL_SECS);
        assert_eq!(public.pool_idle_eviction_factor, MAX_IDLE_EVICTION_FACTOR);
    }

    #[test]
    fn scoped_variables_are_removed_after_the_test() {
        {
            let _env = ScopedEnv::set(&[("VENUE_FEED_SCOPED_FLAG", "1")]);
            assert!(env::var("VENUE_FEED_SCOPED_FLAG").is_ok());
        }
        assert!(env::var("VENUE_FEED_SCOPED_FLAG").is_err());
    }
}
