mod aggregator;
mod config;
mod errors;
mod fallback;
mod normalizer;
mod pagination;
mod pool;
mod providers;
mod throttle;
mod venue;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use aggregator::{split_by_weight, AggregateRequest, SourceAggregator};
pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use fallback::FallbackSynthesizer;
pub use normalizer::{identity_key, normalize, same_venue};
pub use pagination::{PaginationController, PaginationSettings, VenuePage, VenueQuery};
pub use pool::{pool_key, PoolState, PoolStats, PoolStore, PoolStoreSettings, VenuePool};
pub use providers::{
    FetchRequest, GooglePlacesClient, ProviderAdapter, ProviderRegistry, SeatGeekClient,
    TicketmasterClient, VenueProvider, YelpClient,
};
pub use throttle::RequestThrottle;
pub use venue::{RawVenue, VenueCategory, VenueRecord, FALLBACK_ID_PREFIX};

pub struct VenueFeed {
    config: AppConfig,
    controller: PaginationController,
    fallback: FallbackSynthesizer,
    throttle: RequestThrottle,
}

impl VenueFeed {
    pub fn from_env() -> AppResult<Self> {
        init_tracing();
        Self::from_config(AppConfig::from_env())
    }

    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let registry = ProviderRegistry::from_config(&config)?;
        debug!(adapters = registry.len(), "provider registry ready");
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: AppConfig, registry: ProviderRegistry) -> Self {
        let aggregator = SourceAggregator::new(registry, config.category_priority.clone());
        Self::with_aggregator(config, aggregator, FallbackSynthesizer::new())
    }

    pub fn with_aggregator(
        config: AppConfig,
        aggregator: SourceAggregator,
        fallback: FallbackSynthesizer,
    ) -> Self {
        let store = PoolStore::new(PoolStoreSettings::from_config(&config));
        let controller = PaginationController::new(
            Arc::new(store),
            Arc::new(aggregator),
            PaginationSettings {
                pool_target_size: config.pool_target_size,
                exhaustion_ratio: config.pool_exhaustion_ratio,
                max_page_size: config.max_page_size,
            },
        );
        let throttle = RequestThrottle::per_minute(config.feed_rate_limit_per_minute);
        Self {
            config,
            controller,
            fallback,
            throttle,
        }
    }

    pub fn public_config(&self) -> PublicAppConfig {
        self.config.public_profile()
    }

    pub fn controller(&self) -> &PaginationController {
        &self.controller
    }

    /// Rate-limited page read for `caller`.
    pub async fn next_venues(&self, caller: &str, query: &VenueQuery) -> AppResult<VenuePage> {
        self.throttle.check(caller)?;
        self.controller.next_page(query).await
    }

    /// Like `next_venues`, but a short page for a category-filtered query is topped
    /// up with synthetic venues after the real ones.
    pub async fn next_venues_or_fallback(
        &self,
        caller: &str,
        query: &VenueQuery,
    ) -> AppResult<VenuePage> {
        let mut page = self.next_venues(caller, query).await?;
        let Some(category) = query.category else {
            return Ok(page);
        };
        let wanted = query.count.clamp(1, self.config.max_page_size.max(1));
        if page.venues.len() < wanted {
            let missing = wanted - page.venues.len();
            debug!(
                location = query.location.as_str(),
                category = %category,
                missing,
                "topping up page with fallback venues"
            );
            page.venues
                .extend(self.fallback.synthesize(&query.location, category, missing));
        }
        Ok(page)
    }

    pub fn reset_pool(&self, location: &str) {
        self.controller.reset_pool(location);
    }

    pub fn pool_stats(&self, location: &str) -> Option<PoolStats> {
        self.controller.get_pool_stats(location)
    }

    pub fn synthesize_fallback(
        &self,
        location: &str,
        category: VenueCategory,
        count: usize,
    ) -> Vec<VenueRecord> {
        self.fallback.synthesize(location, category, count)
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,venue_feed=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
