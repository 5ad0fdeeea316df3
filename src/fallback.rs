use std::collections::HashSet;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::normalizer::identity_key;
use crate::venue::{VenueCategory, VenueRecord, FALLBACK_ID_PREFIX};

const SOURCE_TAG: &str = "fallback";
const MAX_NAME_ATTEMPTS: usize = 8;

const RESTAURANT_LEADS: &[&str] = &[
    "Golden", "Rustic", "Little", "Copper", "Harbor", "Old Town", "Juniper", "Saffron",
    "Wild Fig", "Northern",
];
const RESTAURANT_TAILS: &[&str] = &[
    "Table", "Noodle House", "Taqueria", "Smokehouse", "Trattoria", "Dumpling Co-op",
    "Oyster Room", "Supper Club", "Ramen Counter",
];
const ACTIVITY_LEADS: &[&str] = &[
    "Riverside", "Skyline", "Hidden", "Lakeside", "Maple", "Union", "Lantern", "Cedar",
];
const ACTIVITY_TAILS: &[&str] = &[
    "Climbing Gym", "Art Studio", "Escape Room", "Bowling Lanes", "Botanical Garden",
    "Pottery Workshop", "Arcade", "Kayak Rentals",
];
const EVENT_LEADS: &[&str] = &[
    "Summer", "Midnight", "Neighborhood", "Open Air", "Sunset", "Harvest", "Winter",
];
const EVENT_TAILS: &[&str] = &[
    "Jazz Night", "Food Festival", "Comedy Showcase", "Art Walk", "Farmers Market",
    "Film Screening", "Trivia Night",
];
const STREETS: &[&str] = &[
    "Main", "Oak", "Maple", "Cedar", "Park", "Lake", "Washington", "River", "Elm", "Market",
];
const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Way"];

/// Placeholder venues for a category no provider could fill. Every id starts with
/// `fallback-` so callers can tell them apart from real listings.
#[derive(Clone)]
pub struct FallbackSynthesizer {
    rng: Arc<Mutex<StdRng>>,
}

impl Default for FallbackSynthesizer {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl FallbackSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn synthesize(
        &self,
        location: &str,
        category: VenueCategory,
        count: usize,
    ) -> Vec<VenueRecord> {
        let location = location.trim();
        let (leads, tails) = fragments(category);
        let mut rng = self.rng.lock();
        let mut identities = HashSet::new();
        let mut venues = Vec::with_capacity(count);

        for index in 0..count {
            let name = pick_unique_name(&mut rng, leads, tails, &identities, index);
            identities.insert(identity_key(&name));

            let street = STREETS.choose(&mut *rng).copied().unwrap_or("Main");
            let suffix = STREET_SUFFIXES.choose(&mut *rng).copied().unwrap_or("St");
            let number: u32 = rng.gen_range(100..10_000);
            let address = if location.is_empty() {
                format!("{number} {street} {suffix}")
            } else {
                format!("{number} {street} {suffix}, {location}")
            };

            let rating = (rng.gen_range(3.5_f64..=5.0) * 10.0).round() / 10.0;
            let price_level: u8 = rng.gen_range(1..=3);
            let open_now = rng.gen_bool(0.8);
            let (open_now, is_upcoming) = match category {
                VenueCategory::Event => (None, Some(true)),
                _ => (Some(open_now), None),
            };

            venues.push(VenueRecord {
                id: fallback_id(location, category, &name, index),
                normalized_identity: identity_key(&name),
                name,
                category,
                address,
                rating: Some(rating),
                price_level,
                photo_url: None,
                open_now,
                is_upcoming,
                source_tag: SOURCE_TAG.to_string(),
            });
        }
        venues
    }
}

fn fragments(category: VenueCategory) -> (&'static [&'static str], &'static [&'static str]) {
    match category {
        VenueCategory::Restaurant => (RESTAURANT_LEADS, RESTAURANT_TAILS),
        VenueCategory::Activity => (ACTIVITY_LEADS, ACTIVITY_TAILS),
        VenueCategory::Event => (EVENT_LEADS, EVENT_TAILS),
    }
}

fn pick_unique_name(
    rng: &mut StdRng,
    leads: &[&str],
    tails: &[&str],
    taken: &HashSet<String>,
    index: usize,
) -> String {
    let mut name = String::new();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let lead = leads.choose(rng).copied().unwrap_or("Local");
        let tail = tails.choose(rng).copied().unwrap_or("Spot");
        name = format!("{lead} {tail}");
        if !taken.contains(&identity_key(&name)) {
            return name;
        }
    }
    format!("{name} No. {}", index + 1)
}

fn fallback_id(location: &str, category: VenueCategory, name: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location.to_lowercase().as_bytes());
    hasher.update(category.as_tag().as_bytes());
    hasher.update(name.as_bytes());
    hasher.update(index.to_le_bytes());
    let digest = URL_SAFE_NO_PAD.encode(hasher.finalize());
    format!("{FALLBACK_ID_PREFIX}{}-{}", category.as_tag(), &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_distinguishable_plausible_venues() {
        let synth = FallbackSynthesizer::with_rng(StdRng::seed_from_u64(42));
        let venues = synth.synthesize("Minneapolis, MN", VenueCategory::Restaurant, 40);
        assert_eq!(venues.len(), 40);

        let identities: HashSet<&str> = venues
            .iter()
            .map(|v| v.normalized_identity.as_str())
            .collect();
        let ids: HashSet<&str> = venues.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(identities.len(), 40);
        assert_eq!(ids.len(), 40);

        for venue in &venues {
            assert!(venue.is_fallback());
            assert!(venue.id.starts_with("fallback-restaurant-"));
            assert!(venue.address.ends_with(", Minneapolis, MN"));
            let rating = venue.rating.unwrap();
            assert!((3.5..=5.0).contains(&rating));
            assert!((1..=3).contains(&venue.price_level));
            assert!(venue.open_now.is_some());
        }
    }

    #[test]
    fn biases_places_toward_open() {
        let synth = FallbackSynthesizer::with_rng(StdRng::seed_from_u64(9));
        let venues = synth.synthesize("Duluth, MN", VenueCategory::Activity, 200);
        let open = venues.iter().filter(|v| v.open_now == Some(true)).count();
        assert!(open > 130 && open < 190, "open count {open}");
    }

    #[test]
    fn marks_events_upcoming() {
        let synth = FallbackSynthesizer::with_rng(StdRng::seed_from_u64(3));
        let venues = synth.synthesize("Duluth, MN", VenueCategory::Event, 3);
        assert!(venues
            .iter()
            .all(|v| v.is_upcoming == Some(true) && v.open_now.is_none()));
        assert!(synth.synthesize("Duluth, MN", VenueCategory::Event, 0).is_empty());
    }
}
