use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::providers::ProviderRegistry;
use crate::venue::{VenueCategory, VenueRecord};

#[derive(Debug, Clone, Copy)]
pub struct AggregateRequest<'a> {
    pub location: &'a str,
    pub total: usize,
    /// Records already collected for this location; spread across adapters that page.
    pub offset: usize,
    /// Restricts the whole quota to a single category.
    pub category: Option<VenueCategory>,
    pub exclude_ids: &'a HashSet<String>,
}

pub struct SourceAggregator {
    registry: ProviderRegistry,
    priority: Vec<VenueCategory>,
    rng: Arc<Mutex<StdRng>>,
}

impl SourceAggregator {
    pub fn new(registry: ProviderRegistry, priority: Vec<VenueCategory>) -> Self {
        Self::with_rng(registry, priority, StdRng::from_entropy())
    }

    pub fn with_rng(
        registry: ProviderRegistry,
        priority: Vec<VenueCategory>,
        rng: StdRng,
    ) -> Self {
        let mut order: Vec<VenueCategory> = Vec::with_capacity(VenueCategory::ALL.len());
        for category in priority.into_iter().chain(VenueCategory::ALL) {
            if !order.contains(&category) {
                order.push(category);
            }
        }
        Self {
            registry,
            priority: order,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Even split over categories; the first `total % n` categories in priority
    /// order get one extra slot so the quotas sum to `total`.
    pub fn quotas(&self, total: usize, category: Option<VenueCategory>) -> Vec<(VenueCategory, usize)> {
        if let Some(category) = category {
            return vec![(category, total)];
        }
        let count = self.priority.len();
        let base = total / count;
        let remainder = total % count;
        self.priority
            .iter()
            .enumerate()
            .map(|(idx, category)| (*category, base + usize::from(idx < remainder)))
            .collect()
    }

    pub async fn aggregate(
        &self,
        location: &str,
        total: usize,
        exclude_ids: &HashSet<String>,
    ) -> Vec<VenueRecord> {
        self.aggregate_with(&AggregateRequest {
            location,
            total,
            offset: 0,
            category: None,
            exclude_ids,
        })
        .await
    }

    pub async fn aggregate_with(&self, request: &AggregateRequest<'_>) -> Vec<VenueRecord> {
        if request.total == 0 {
            return Vec::new();
        }

        let mut calls = Vec::new();
        for (category, quota) in self.quotas(request.total, request.category) {
            let adapters = self.registry.adapters_for(category);
            if adapters.is_empty() {
                debug!(category = %category, quota, "no adapters registered for category");
                continue;
            }
            let weights: Vec<u32> = adapters.iter().map(|adapter| adapter.weight()).collect();
            let shares = split_by_weight(quota, &weights);
            debug!(category = %category, quota, ?shares, "category quota split");
            for (adapter, share) in adapters.into_iter().zip(shares) {
                let offset = request.offset * share / request.total;
                calls.push(adapter.fetch(request.location, share, offset, request.exclude_ids));
            }
        }

        let batches = join_all(calls).await;
        let mut merged = dedup_by_identity(batches.into_iter().flatten(), request.exclude_ids);
        {
            let mut rng = self.rng.lock();
            merged.shuffle(&mut *rng);
        }
        debug!(
            location = request.location,
            requested = request.total,
            returned = merged.len(),
            "aggregation complete"
        );
        merged
    }
}

/// Proportional split of `quota` by `weights`; leftover slots go to the earliest entries.
pub fn split_by_weight(quota: usize, weights: &[u32]) -> Vec<usize> {
    let total_weight: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if weights.is_empty() || total_weight == 0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<usize> = weights
        .iter()
        .map(|w| (quota as u64 * u64::from(*w) / total_weight) as usize)
        .collect();
    let mut leftover = quota - shares.iter().sum::<usize>();
    for share in shares.iter_mut() {
        if leftover == 0 {
            break;
        }
        *share += 1;
        leftover -= 1;
    }
    shares
}

// First occurrence wins; later records with the same id or identity are dropped.
fn dedup_by_identity(
    records: impl IntoIterator<Item = VenueRecord>,
    exclude_ids: &HashSet<String>,
) -> Vec<VenueRecord> {
    let mut seen_identities: HashSet<(String, VenueCategory)> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for record in records {
        if exclude_ids.contains(&record.id) || seen_ids.contains(&record.id) {
            continue;
        }
        if !seen_identities.insert((record.normalized_identity.clone(), record.category)) {
            continue;
        }
        seen_ids.insert(record.id.clone());
        merged.push(record);
    }
    merged
}
