use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{AggregateRequest, SourceAggregator};
use crate::errors::{AppError, AppResult};
use crate::pool::{pool_key, PoolState, PoolStats, PoolStore, VenuePool};
use crate::venue::{VenueCategory, VenueRecord};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueQuery {
    pub location: String,
    pub count: usize,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
    #[serde(default)]
    pub category: Option<VenueCategory>,
}

impl VenueQuery {
    pub fn new(location: impl Into<String>, count: usize) -> Self {
        Self {
            location: location.into(),
            count,
            exclude_ids: Vec::new(),
            category: None,
        }
    }

    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn in_category(mut self, category: VenueCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePage {
    pub venues: Vec<VenueRecord>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    pub pool_target_size: usize,
    pub exhaustion_ratio: f64,
    pub max_page_size: usize,
}

pub struct PaginationController {
    store: Arc<PoolStore>,
    aggregator: Arc<SourceAggregator>,
    settings: PaginationSettings,
}

impl PaginationController {
    pub fn new(
        store: Arc<PoolStore>,
        aggregator: Arc<SourceAggregator>,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            store,
            aggregator,
            settings,
        }
    }

    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    pub async fn get_next_venues(
        &self,
        location: &str,
        count: usize,
        exclude_ids: &[String],
    ) -> AppResult<VenuePage> {
        let query = VenueQuery::new(location, count).excluding(exclude_ids.iter().cloned());
        self.next_page(&query).await
    }

    pub async fn next_page(&self, query: &VenueQuery) -> AppResult<VenuePage> {
        let key = pool_key(&query.location, query.category)
            .ok_or_else(|| AppError::InvalidRequest("location is required".into()))?;
        let location = query.location.trim();
        let count = query.count.clamp(1, self.settings.max_page_size.max(1));
        let exclude: HashSet<String> = query.exclude_ids.iter().cloned().collect();

        self.store.sweep(Utc::now());
        let guard = self.store.guard(&key);
        let _lock = guard.lock().await;

        match self.store.state(&key, Utc::now()) {
            PoolState::Missing => {
                debug!(pool = %key, "creating venue pool");
                self.populate(&key, location, query.category, &exclude).await;
            }
            PoolState::Stale => {
                debug!(pool = %key, "replacing stale venue pool");
                self.populate(&key, location, query.category, &exclude).await;
            }
            PoolState::Fresh | PoolState::Exhausted => {}
        }

        let needs_refill = self
            .store
            .with_pool(&key, |pool| {
                !pool.is_exhausted() && pool.available_count(&exclude) < count
            })
            .unwrap_or(false);
        if needs_refill {
            self.refill(&key, location, query.category, &exclude).await;
        }

        let page = match self.store.with_pool(&key, |pool| VenuePage {
            venues: pool.take_next(count, &exclude),
            has_more: pool.has_more(),
        }) {
            Some(page) => page,
            None => {
                // Reset while this request was in flight; the next call repopulates.
                warn!(pool = %key, "venue pool removed mid-request");
                VenuePage {
                    venues: Vec::new(),
                    has_more: true,
                }
            }
        };
        debug!(
            pool = %key,
            returned = page.venues.len(),
            has_more = page.has_more,
            "served venue page"
        );
        Ok(page)
    }

    pub fn reset_pool(&self, location: &str) {
        if let Some(key) = pool_key(location, None) {
            let removed = self.store.remove_location(&key);
            info!(pool = %key, removed, "venue pool reset");
        }
    }

    pub fn get_pool_stats(&self, location: &str) -> Option<PoolStats> {
        self.pool_stats_for(location, None)
    }

    pub fn pool_stats_for(
        &self,
        location: &str,
        category: Option<VenueCategory>,
    ) -> Option<PoolStats> {
        pool_key(location, category).and_then(|key| self.store.stats(&key))
    }

    async fn populate(
        &self,
        key: &str,
        location: &str,
        category: Option<VenueCategory>,
        exclude: &HashSet<String>,
    ) {
        let requested = self.settings.pool_target_size;
        let batch = self
            .aggregator
            .aggregate_with(&AggregateRequest {
                location,
                total: requested,
                offset: 0,
                category,
                exclude_ids: exclude,
            })
            .await;

        let now = Utc::now();
        let mut pool = VenuePool::new(now);
        let added = pool.merge(batch);
        pool.record_refill(requested, added, self.settings.exhaustion_ratio, now);
        if pool.is_exhausted() {
            info!(pool = %key, requested, added, "venue pool exhausted on creation");
        }
        self.store.replace(key, pool);
    }

    async fn refill(
        &self,
        key: &str,
        location: &str,
        category: Option<VenueCategory>,
        exclude: &HashSet<String>,
    ) {
        let Some((mut known, offset)) = self.store.with_pool(key, |pool| {
            let known: HashSet<String> = pool.ids().map(str::to_string).collect();
            (known, pool.total_fetched())
        }) else {
            return;
        };
        known.extend(exclude.iter().cloned());

        let requested = self.settings.pool_target_size;
        debug!(pool = %key, requested, offset, "refilling venue pool");
        let batch = self
            .aggregator
            .aggregate_with(&AggregateRequest {
                location,
                total: requested,
                offset,
                category,
                exclude_ids: &known,
            })
            .await;

        let ratio = self.settings.exhaustion_ratio;
        let mut batch = Some(batch);
        self.store.with_pool(key, |pool| {
            let added = pool.merge(batch.take().unwrap_or_default());
            pool.record_refill(requested, added, ratio, Utc::now());
            if pool.is_exhausted() {
                info!(pool = %key, requested, added, "venue pool exhausted");
            }
        });

        if let Some(batch) = batch {
            warn!(pool = %key, "venue pool removed during refill; storing refill batch");
            let now = Utc::now();
            let mut pool = VenuePool::new(now);
            let added = pool.merge(batch);
            pool.record_refill(requested, added, ratio, now);
            self.store.replace(key, pool);
        }
    }
}
