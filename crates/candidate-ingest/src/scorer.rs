use crate::matcher::normalize_name;
use crate::types::Candidate;

/// Version of the scoring function. Recomputing a score with unchanged
/// inputs and an unchanged version must yield an identical value; any change
/// to the weights or heuristics below is a version bump.
pub const SCORER_VERSION: u32 = 1;

/// Number of external ratings at which the rating-volume signal saturates.
const RATING_SATURATION_COUNT: f64 = 50.0;

/// Tokens that mark a name as placeholder data rather than a real campsite.
const PLACEHOLDER_TOKENS: &[&str] = &["test", "todo", "unknown", "placeholder", "tbd", "n a"];

/// Fixed weights for the confidence score components.
#[derive(Debug, Clone)]
pub struct ScorerWeights {
    /// Weight of required-field completeness (default: 0.5)
    pub completeness: f64,
    /// Weight of external rating volume (default: 0.3)
    pub rating_volume: f64,
    /// Weight of textual quality heuristics (default: 0.2)
    pub text_quality: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            completeness: 0.5,
            rating_volume: 0.3,
            text_quality: 0.2,
        }
    }
}

/// The signals the scorer reads from a candidate. Borrowed so the scorer can
/// run over a not-yet-persisted sync record or a stored candidate alike.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    /// Place name
    pub name: &'a str,
    /// Street address, if known
    pub address: Option<&'a str>,
    /// Contact phone, if known
    pub phone: Option<&'a str>,
    /// Website URL, if known
    pub website: Option<&'a str>,
    /// Whether usable coordinates are present
    pub has_coordinates: bool,
    /// Aggregate external rating, if any
    pub rating: Option<f64>,
    /// Number of external ratings, if any
    pub rating_count: Option<i32>,
}

impl<'a> ScoreInputs<'a> {
    /// Builds score inputs from a stored candidate, for rescoring passes.
    pub fn from_candidate(candidate: &'a Candidate) -> Self {
        Self {
            name: &candidate.name,
            address: candidate.address.as_deref(),
            phone: candidate.phone.as_deref(),
            website: candidate.website.as_deref(),
            has_coordinates: candidate.latitude.is_finite() && candidate.longitude.is_finite(),
            rating: candidate.rating,
            rating_count: candidate.rating_count,
        }
    }
}

/// Computes the confidence score in `[0, 1]` for a candidate.
///
/// A weighted sum of independently normalized signals with no randomness and
/// no dependency on wall-clock time: identical inputs always produce the
/// identical score.
pub fn confidence_score(inputs: &ScoreInputs<'_>, weights: &ScorerWeights) -> f64 {
    let score = weights.completeness * completeness(inputs)
        + weights.rating_volume * rating_volume(inputs)
        + weights.text_quality * text_quality(inputs.name);

    score.clamp(0.0, 1.0)
}

/// Fraction of required fields present: address, coordinates, and at least
/// one contact method (phone or website).
fn completeness(inputs: &ScoreInputs<'_>) -> f64 {
    let has_address = inputs.address.is_some_and(|a| !a.trim().is_empty());
    let has_contact = inputs.phone.is_some_and(|p| !p.trim().is_empty())
        || inputs.website.is_some_and(|w| !w.trim().is_empty());

    let present = [has_address, inputs.has_coordinates, has_contact]
        .iter()
        .filter(|p| **p)
        .count();

    present as f64 / 3.0
}

/// Saturating rating-volume signal: `min(1, rating_count / 50)`, zero when
/// the directory reported no ratings at all.
fn rating_volume(inputs: &ScoreInputs<'_>) -> f64 {
    match (inputs.rating, inputs.rating_count) {
        (Some(_), Some(count)) if count > 0 => (count as f64 / RATING_SATURATION_COUNT).min(1.0),
        _ => 0.0,
    }
}

/// Textual quality heuristics: name length sanity and absence of placeholder
/// tokens.
fn text_quality(name: &str) -> f64 {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return 0.0;
    }

    let mut quality: f64 = 1.0;

    if normalized.len() < 4 || normalized.len() > 80 {
        quality -= 0.5;
    }

    // Multi-word placeholders ("n a", from "N/A") span two tokens, so
    // adjacent pairs are checked alongside single tokens.
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let has_placeholder = tokens
        .iter()
        .any(|token| PLACEHOLDER_TOKENS.contains(token))
        || tokens.windows(2).any(|pair| {
            let joined = pair.join(" ");
            PLACEHOLDER_TOKENS.contains(&joined.as_str())
        });

    if has_placeholder {
        quality -= 0.5;
    }

    quality.max(0.0)
}
