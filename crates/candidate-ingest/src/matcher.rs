use std::collections::HashSet;

use uuid::Uuid;

/// Configuration for the duplicate matcher.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Search radius for the geometric prefilter (default: 500 m)
    pub radius_meters: f64,

    /// Minimum combined similarity for a duplicate verdict (default: 0.80).
    /// A similarity exactly equal to the threshold counts as a duplicate.
    pub duplicate_threshold: f64,

    /// Weight of name similarity in the combined score (default: 0.6)
    pub name_weight: f64,

    /// Weight of geographic proximity in the combined score (default: 0.4)
    pub distance_weight: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            radius_meters: 500.0,
            duplicate_threshold: 0.80,
            name_weight: 0.6,
            distance_weight: 0.4,
        }
    }
}

/// A campsite from the authoritative inventory, as seen by the matcher.
#[derive(Debug, Clone)]
pub struct CampsiteSummary {
    /// Inventory identifier
    pub id: Uuid,
    /// Campsite name
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

/// Best inventory match for a candidate. Derived, not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    /// The matched inventory campsite
    pub campsite_id: Uuid,
    /// Combined similarity in `[0, 1]`
    pub similarity: f64,
    /// Great-circle distance between candidate and match
    pub distance_meters: f64,
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates (haversine).
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Lowercases, strips punctuation and collapses whitespace so that
/// "Pine Ridge Campground" and "pine-ridge campground" compare equal.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    out.trim_end().to_string()
}

/// Token-overlap (Jaccard) similarity over normalized name tokens.
fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;

    intersection / union
}

/// Name similarity in `[0, 1]`: the better of normalized edit distance and
/// token overlap, computed over normalized names. Token overlap keeps word
/// reorderings ("Campground Pine Ridge") from scoring poorly.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_name(a);
    let norm_b = normalize_name(b);

    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }

    let edit = strsim::normalized_levenshtein(&norm_a, &norm_b);
    let overlap = token_jaccard(&norm_a, &norm_b);

    edit.max(overlap).clamp(0.0, 1.0)
}

/// Finds the best inventory match within the configured radius.
///
/// Pure function of its inputs: re-running it over the same inventory
/// snapshot yields the identical result. Ties at the top score are broken by
/// smaller distance, then by lexicographically smaller campsite id, never
/// randomly.
pub fn best_match(
    name: &str,
    latitude: f64,
    longitude: f64,
    inventory: &[CampsiteSummary],
    config: &MatcherConfig,
) -> Option<DuplicateMatch> {
    let mut best: Option<DuplicateMatch> = None;

    for campsite in inventory {
        let distance =
            haversine_meters(latitude, longitude, campsite.latitude, campsite.longitude);
        if distance > config.radius_meters {
            continue;
        }

        let name_sim = name_similarity(name, &campsite.name);
        let proximity = 1.0 - distance / config.radius_meters;
        let similarity =
            (config.name_weight * name_sim + config.distance_weight * proximity).clamp(0.0, 1.0);

        let candidate = DuplicateMatch {
            campsite_id: campsite.id,
            similarity,
            distance_meters: distance,
        };

        best = match best {
            None => Some(candidate),
            Some(current) => {
                if candidate.similarity > current.similarity
                    || (candidate.similarity == current.similarity
                        && (candidate.distance_meters < current.distance_meters
                            || (candidate.distance_meters == current.distance_meters
                                && candidate.campsite_id < current.campsite_id)))
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }

    best
}

/// Whether a match qualifies as a duplicate. The threshold boundary is
/// inclusive: a similarity exactly at the threshold is a duplicate.
pub fn is_duplicate(best: &DuplicateMatch, config: &MatcherConfig) -> bool {
    best.similarity >= config.duplicate_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campsite(id: u128, name: &str, latitude: f64, longitude: f64) -> CampsiteSummary {
        CampsiteSummary {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine_meters(45.0, -110.0, 45.0, -110.0), 0.0);
    }

    #[test]
    fn haversine_known_distance() {
        // One degree of latitude is roughly 111 km.
        let d = haversine_meters(45.0, -110.0, 46.0, -110.0);
        assert!((d - 111_195.0).abs() < 500.0, "got {}", d);
    }

    #[test]
    fn normalize_name_strips_punctuation_and_case() {
        assert_eq!(
            normalize_name("  Pine-Ridge   CAMPGROUND! "),
            "pine ridge campground"
        );
        assert_eq!(normalize_name("---"), "");
    }

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_similarity("Pine Ridge Campground", "pine ridge campground"), 1.0);
    }

    #[test]
    fn reordered_tokens_score_high() {
        let sim = name_similarity("Campground Pine Ridge", "Pine Ridge Campground");
        assert_eq!(sim, 1.0); // identical token sets
    }

    #[test]
    fn unrelated_names_score_low() {
        let sim = name_similarity("Pine Ridge Campground", "Lakeside RV Resort");
        assert!(sim < 0.5, "got {}", sim);
    }

    #[test]
    fn clean_duplicate_scores_similarity_one() {
        // Same coordinates (0 m away), identical name: similarity must be
        // exactly 1.0 and qualify as a duplicate.
        let config = MatcherConfig::default();
        let inventory = vec![campsite(1, "Pine Ridge Campground", 45.0, -110.0)];

        let best = best_match("Pine Ridge Campground", 45.0, -110.0, &inventory, &config)
            .expect("match expected");

        assert_eq!(best.similarity, 1.0);
        assert_eq!(best.distance_meters, 0.0);
        assert!(is_duplicate(&best, &config));
    }

    #[test]
    fn no_inventory_in_radius_is_not_a_duplicate() {
        let config = MatcherConfig::default();
        // ~1.1 km north, well outside the 500 m radius.
        let inventory = vec![campsite(1, "Pine Ridge Campground", 45.01, -110.0)];

        let best = best_match("Pine Ridge Campground", 45.0, -110.0, &inventory, &config);
        assert!(best.is_none());
    }

    #[test]
    fn similarity_exactly_at_threshold_is_a_duplicate() {
        let config = MatcherConfig::default();
        let at_threshold = DuplicateMatch {
            campsite_id: Uuid::from_u128(1),
            similarity: 0.80,
            distance_meters: 100.0,
        };
        let below = DuplicateMatch {
            similarity: 0.7999,
            ..at_threshold.clone()
        };

        assert!(is_duplicate(&at_threshold, &config));
        assert!(!is_duplicate(&below, &config));
    }

    #[test]
    fn ties_break_by_distance_then_id() {
        let config = MatcherConfig::default();

        // Two identically named campsites at the same spot as the candidate:
        // identical similarity and distance, so the smaller id must win.
        let inventory = vec![
            campsite(2, "Pine Ridge Campground", 45.0, -110.0),
            campsite(1, "Pine Ridge Campground", 45.0, -110.0),
        ];
        let best = best_match("Pine Ridge Campground", 45.0, -110.0, &inventory, &config)
            .expect("match expected");
        assert_eq!(best.campsite_id, Uuid::from_u128(1));

        // Reordering the inventory must not change the verdict.
        let reversed: Vec<_> = inventory.iter().rev().cloned().collect();
        let best_rev = best_match("Pine Ridge Campground", 45.0, -110.0, &reversed, &config)
            .expect("match expected");
        assert_eq!(best_rev.campsite_id, Uuid::from_u128(1));
    }

    #[test]
    fn matching_is_idempotent() {
        let config = MatcherConfig::default();
        let inventory = vec![
            campsite(1, "Pine Ridge Campground", 45.001, -110.0),
            campsite(2, "Pine Ridge Camp", 45.0005, -110.0),
        ];

        let first = best_match("Pine Ridge Campground", 45.0, -110.0, &inventory, &config);
        for _ in 0..10 {
            let again = best_match("Pine Ridge Campground", 45.0, -110.0, &inventory, &config);
            assert_eq!(first, again);
        }
    }
}
