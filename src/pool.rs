use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::venue::{VenueCategory, VenueRecord};

// Applied when the configured TTL does not fit a chrono duration.
const TTL_CEILING_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Missing,
    Stale,
    Fresh,
    Exhausted,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub size: usize,
    pub cursor_position: usize,
    pub has_more: bool,
    pub exhausted: bool,
    pub total_fetched: usize,
}

#[derive(Debug, Clone)]
pub struct VenuePool {
    venues: Vec<VenueRecord>,
    identities: HashSet<(String, VenueCategory)>,
    ids: HashSet<String>,
    cursor: usize,
    total_fetched: usize,
    last_refreshed_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    exhausted: bool,
}

impl VenuePool {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            venues: Vec::new(),
            identities: HashSet::new(),
            ids: HashSet::new(),
            cursor: 0,
            total_fetched: 0,
            last_refreshed_at: now,
            last_accessed_at: now,
            exhausted: false,
        }
    }

    pub fn venues(&self) -> &[VenueRecord] {
        &self.venues
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_fetched(&self) -> usize {
        self.total_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_refreshed_at > ttl
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.venues.iter().map(|venue| venue.id.as_str())
    }

    /// Appends records whose id and (identity, category) are new to the whole pool.
    /// Returns how many were added.
    pub fn merge(&mut self, batch: Vec<VenueRecord>) -> usize {
        let mut added = 0;
        for record in batch {
            if self.ids.contains(&record.id) {
                continue;
            }
            let identity = (record.normalized_identity.clone(), record.category);
            if !self.identities.insert(identity) {
                continue;
            }
            self.ids.insert(record.id.clone());
            self.venues.push(record);
            added += 1;
        }
        self.total_fetched += added;
        added
    }

    /// Stamps a completed provider pass. Exhaustion is sticky: once a pass yields
    /// less than `ratio` of what was requested the pool never refetches.
    pub fn record_refill(
        &mut self,
        requested: usize,
        added: usize,
        ratio: f64,
        now: DateTime<Utc>,
    ) {
        self.last_refreshed_at = now;
        if (added as f64) < requested as f64 * ratio {
            self.exhausted = true;
        }
    }

    pub fn available_count(&self, exclude_ids: &HashSet<String>) -> usize {
        self.unseen(exclude_ids).count()
    }

    /// Returns up to `count` unseen records and moves the cursor just past the last
    /// one returned, located by id so excluded records never shift it further.
    pub fn take_next(&mut self, count: usize, exclude_ids: &HashSet<String>) -> Vec<VenueRecord> {
        let picked: Vec<VenueRecord> = self.unseen(exclude_ids).take(count).cloned().collect();
        if let Some(last) = picked.last() {
            if let Some(position) = self.venues.iter().position(|venue| venue.id == last.id) {
                self.cursor = position + 1;
            }
        }
        picked
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.venues.len() || !self.exhausted
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.venues.len(),
            cursor_position: self.cursor,
            has_more: self.has_more(),
            exhausted: self.exhausted,
            total_fetched: self.total_fetched,
        }
    }

    fn unseen<'a>(
        &'a self,
        exclude_ids: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a VenueRecord> + 'a {
        self.venues[self.cursor.min(self.venues.len())..]
            .iter()
            .filter(move |venue| !exclude_ids.contains(&venue.id))
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    #[cfg(test)]
    pub fn backdate(&mut self, by: Duration) {
        self.last_refreshed_at -= by;
        self.last_accessed_at -= by;
    }
}

/// Case-insensitive, whitespace-collapsed cache key; `None` for a blank location.
pub fn pool_key(location: &str, category: Option<VenueCategory>) -> Option<String> {
    let base = location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if base.is_empty() {
        return None;
    }
    Some(match category {
        Some(category) => format!("{base}#{}", category.as_tag()),
        None => base,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStoreSettings {
    pub ttl: Duration,
    pub idle_eviction_factor: u32,
    pub max_entries: usize,
}

impl PoolStoreSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let ttl = Duration::from_std(config.pool_ttl())
            .unwrap_or_else(|_| Duration::days(TTL_CEILING_DAYS));
        Self {
            ttl,
            idle_eviction_factor: config.pool_idle_eviction_factor,
            max_entries: config.pool_max_entries,
        }
    }

    /// `None` when `ttl × idle_eviction_factor` overflows; such pools are never idle.
    fn idle_limit(&self) -> Option<Duration> {
        i32::try_from(self.idle_eviction_factor)
            .ok()
            .and_then(|factor| self.ttl.checked_mul(factor))
    }
}

pub struct PoolStore {
    pools: Mutex<HashMap<String, VenuePool>>,
    guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    settings: PoolStoreSettings,
}

impl PoolStore {
    pub fn new(settings: PoolStoreSettings) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }

    /// Per-key lock serializing population and refill of one pool.
    pub fn guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut guards = self.guards.lock();
        Arc::clone(
            guards
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    pub fn state(&self, key: &str, now: DateTime<Utc>) -> PoolState {
        let pools = self.pools.lock();
        match pools.get(key) {
            None => PoolState::Missing,
            Some(pool) if pool.is_exhausted() => PoolState::Exhausted,
            Some(pool) if pool.is_stale(self.settings.ttl, now) => PoolState::Stale,
            Some(_) => PoolState::Fresh,
        }
    }

    pub fn with_pool<R>(&self, key: &str, f: impl FnOnce(&mut VenuePool) -> R) -> Option<R> {
        let mut pools = self.pools.lock();
        pools.get_mut(key).map(|pool| {
            pool.touch(Utc::now());
            f(pool)
        })
    }

    /// Stores `pool` under `key`, replacing any previous generation.
    pub fn replace(&self, key: &str, pool: VenuePool) {
        {
            let mut pools = self.pools.lock();
            pools.insert(key.to_string(), pool);
        }
        self.sweep(Utc::now());
    }

    /// Drops the base pool for a location along with its category-filtered variants.
    pub fn remove_location(&self, base_key: &str) -> usize {
        let prefix = format!("{base_key}#");
        let removed = {
            let mut pools = self.pools.lock();
            let before = pools.len();
            pools.retain(|key, _| key != base_key && !key.starts_with(&prefix));
            before - pools.len()
        };
        self.prune_guards();
        removed
    }

    pub fn stats(&self, key: &str) -> Option<PoolStats> {
        self.pools.lock().get(key).map(VenuePool::stats)
    }

    /// Evicts pools idle longer than `idle_eviction_factor × ttl`, then the least
    /// recently used ones until at most `max_entries` remain. Pools whose guard is
    /// held by an in-flight request are skipped, so the bound can be exceeded until
    /// those requests finish.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let busy = self.busy_keys();
        let idle_limit = self.settings.idle_limit();
        let evicted = {
            let mut pools = self.pools.lock();
            let before = pools.len();
            if let Some(idle_limit) = idle_limit {
                pools.retain(|key, pool| {
                    busy.contains(key) || now - pool.last_accessed_at <= idle_limit
                });
            }

            if pools.len() > self.settings.max_entries {
                let mut by_access: Vec<(String, DateTime<Utc>)> = pools
                    .iter()
                    .filter(|(key, _)| !busy.contains(*key))
                    .map(|(key, pool)| (key.clone(), pool.last_accessed_at))
                    .collect();
                by_access.sort_by_key(|(_, accessed)| *accessed);
                let excess = pools.len() - self.settings.max_entries;
                for (key, _) in by_access.into_iter().take(excess) {
                    pools.remove(&key);
                }
            }
            before - pools.len()
        };

        if evicted > 0 {
            info!(evicted, "evicted idle venue pools");
            self.prune_guards();
        }
        evicted
    }

    // A guard still referenced elsewhere belongs to an in-flight request.
    fn busy_keys(&self) -> HashSet<String> {
        self.guards
            .lock()
            .iter()
            .filter(|(_, guard)| Arc::strong_count(guard) > 1)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn prune_guards(&self) {
        let live: HashSet<String> = self.pools.lock().keys().cloned().collect();
        let mut guards = self.guards.lock();
        let before = guards.len();
        guards.retain(|key, guard| live.contains(key) || Arc::strong_count(guard) > 1);
        let pruned = before - guards.len();
        if pruned > 0 {
            debug!(pruned, "released pool guards");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, identity: &str, category: VenueCategory) -> VenueRecord {
        VenueRecord {
            id: id.into(),
            name: identity.into(),
            normalized_identity: identity.into(),
            category,
            address: String::new(),
            rating: None,
            price_level: 0,
            photo_url: None,
            open_now: None,
            is_upcoming: None,
            source_tag: "test".into(),
        }
    }

    fn settings(max_entries: usize) -> PoolStoreSettings {
        PoolStoreSettings {
            ttl: Duration::minutes(30),
            idle_eviction_factor: 2,
            max_entries,
        }
    }

    #[test]
    fn merge_enforces_identity_uniqueness_against_whole_pool() {
        let mut pool = VenuePool::new(Utc::now());
        let first = pool.merge(vec![
            record("a-1", "blueplate", VenueCategory::Restaurant),
            record("a-2", "stonearch", VenueCategory::Activity),
        ]);
        let second = pool.merge(vec![
            record("b-9", "blueplate", VenueCategory::Restaurant),
            record("b-10", "blueplate", VenueCategory::Event),
            record("a-2", "other", VenueCategory::Activity),
        ]);
        assert_eq!(first, 2);
        assert_eq!(second, 1);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.total_fetched(), 3);
        assert_eq!(pool.venues()[0].id, "a-1");
    }

    #[test]
    fn cursor_advances_by_identity_not_arithmetic() {
        let mut pool = VenuePool::new(Utc::now());
        pool.merge(
            (0..6)
                .map(|i| record(&format!("v-{i}"), &format!("v{i}"), VenueCategory::Activity))
                .collect(),
        );
        let exclude: HashSet<String> = ["v-0".to_string(), "v-2".to_string()].into_iter().collect();

        let page = pool.take_next(2, &exclude);
        let ids: Vec<&str> = page.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v-1", "v-3"]);
        assert_eq!(pool.cursor(), 4);

        let rest = pool.take_next(10, &HashSet::new());
        assert_eq!(rest.len(), 2);
        assert_eq!(pool.cursor(), 6);
        assert!(pool.has_more());
        pool.record_refill(10, 0, 0.5, Utc::now());
        assert!(!pool.has_more());
    }

    #[test]
    fn exhaustion_is_sticky() {
        let mut pool = VenuePool::new(Utc::now());
        pool.record_refill(150, 74, 0.5, Utc::now());
        assert!(pool.is_exhausted());
        pool.record_refill(150, 150, 0.5, Utc::now());
        assert!(pool.is_exhausted());

        let mut healthy = VenuePool::new(Utc::now());
        healthy.record_refill(150, 75, 0.5, Utc::now());
        assert!(!healthy.is_exhausted());
    }

    #[test]
    fn normalizes_keys() {
        assert_eq!(
            pool_key("  Minneapolis,   MN ", None).as_deref(),
            Some("minneapolis, mn")
        );
        assert_eq!(
            pool_key("minneapolis, mn", Some(VenueCategory::Event)).as_deref(),
            Some("minneapolis, mn#event")
        );
        assert_eq!(pool_key("   ", None), None);
    }

    #[test]
    fn reports_state_transitions() {
        let store = PoolStore::new(settings(8));
        let now = Utc::now();
        assert_eq!(store.state("duluth", now), PoolState::Missing);

        store.replace("duluth", VenuePool::new(now));
        assert_eq!(store.state("duluth", now), PoolState::Fresh);
        assert_eq!(
            store.state("duluth", now + Duration::minutes(31)),
            PoolState::Stale
        );

        store.with_pool("duluth", |pool| pool.record_refill(10, 0, 0.5, now));
        assert_eq!(
            store.state("duluth", now + Duration::minutes(31)),
            PoolState::Exhausted
        );
    }

    #[test]
    fn sweeps_idle_and_least_recently_used_pools() {
        let store = PoolStore::new(settings(2));
        let mut idle = VenuePool::new(Utc::now());
        idle.backdate(Duration::minutes(61));
        store.replace("idle", idle);
        assert_eq!(store.len(), 0);

        let now = Utc::now();
        store.replace("first", VenuePool::new(now - Duration::minutes(3)));
        store.replace("second", VenuePool::new(now - Duration::minutes(2)));
        store.with_pool("first", |_| ());
        store.replace("third", VenuePool::new(now - Duration::minutes(1)));
        assert_eq!(store.len(), 2);
        assert!(store.stats("first").is_some());
        assert!(store.stats("second").is_none());
        assert!(store.stats("third").is_some());
    }

    #[test]
    fn never_evicts_pools_with_a_request_in_flight() {
        let store = PoolStore::new(settings(1));
        let now = Utc::now();
        store.replace("alpha", VenuePool::new(now - Duration::minutes(2)));
        let alpha_guard = store.guard("alpha");
        let alpha_lock = alpha_guard.try_lock().unwrap();
        let bravo_guard = store.guard("bravo");
        let bravo_lock = bravo_guard.try_lock().unwrap();

        store.replace("bravo", VenuePool::new(now));
        assert!(store.stats("alpha").is_some());
        assert!(store.stats("bravo").is_some());

        drop(alpha_lock);
        drop(alpha_guard);
        drop(bravo_lock);
        drop(bravo_guard);
        store.sweep(Utc::now());
        assert_eq!(store.len(), 1);
        assert!(store.stats("bravo").is_some());
    }

    #[test]
    fn oversized_eviction_factor_keeps_pools() {
        let store = PoolStore::new(PoolStoreSettings {
            ttl: Duration::minutes(30),
            idle_eviction_factor: 3_000_000_000,
            max_entries: 8,
        });
        store.replace("fargo, nd", VenuePool::new(Utc::now()));
        assert_eq!(store.sweep(Utc::now() + Duration::days(30)), 0);
        assert!(store.stats("fargo, nd").is_some());
    }

    #[test]
    fn clamps_out_of_range_ttl_from_config() {
        let config = AppConfig {
            pool_ttl_secs: u64::MAX,
            pool_idle_eviction_factor: u32::MAX,
            ..AppConfig::default()
        };
        let settings = PoolStoreSettings::from_config(&config);
        assert_eq!(settings.ttl, Duration::days(TTL_CEILING_DAYS));
        assert_eq!(settings.idle_limit(), None);

        let defaults = PoolStoreSettings::from_config(&AppConfig::default());
        assert_eq!(defaults.ttl, Duration::minutes(30));
        assert_eq!(defaults.idle_limit(), Some(Duration::hours(2)));
    }

    #[test]
    fn removes_location_with_category_variants() {
        let store = PoolStore::new(settings(8));
        store.replace("st. paul, mn", VenuePool::new(Utc::now()));
        store.replace("st. paul, mn#event", VenuePool::new(Utc::now()));
        store.replace("st. paul, mn2", VenuePool::new(Utc::now()));
        assert_eq!(store.remove_location("st. paul, mn"), 2);
        assert_eq!(store.len(), 1);
    }
}
