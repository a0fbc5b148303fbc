use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::IngestError;

/// A normalized place record pulled from the external directory, before it
/// becomes a candidate.
#[derive(Debug, Clone)]
pub struct RawPlace {
    /// Directory identifier, used as the candidate's `external_ref`
    pub external_ref: String,
    /// Place name
    pub name: String,
    /// Street address, if present
    pub address: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Contact phone, if present
    pub phone: Option<String>,
    /// Website URL, if present
    pub website: Option<String>,
    /// Aggregate rating, if present
    pub rating: Option<f64>,
    /// Number of ratings, if present
    pub rating_count: Option<i32>,
}

/// The external place-discovery source, accessed pull/batch.
#[async_trait::async_trait]
pub trait PlaceSource: Send + Sync {
    /// Fetches one page of campsite-category places. An empty page means the
    /// source is exhausted.
    async fn fetch_batch(&self, offset: u32, limit: u32) -> Result<Vec<RawPlace>, IngestError>;
}

/// Client for the external place-directory API.
pub struct PlaceDirectoryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// One page of place records from the directory.
#[derive(Debug, Deserialize)]
struct PlaceListResponse {
    results: Vec<PlaceRecord>,
}

/// A single place record as the directory serves it.
#[derive(Debug, Deserialize)]
struct PlaceRecord {
    #[serde(rename = "placeId")]
    place_id: String,

    name: Option<String>,

    address: Option<String>,

    #[serde(rename = "lat")]
    latitude: Option<f64>,

    #[serde(rename = "lon")]
    longitude: Option<f64>,

    phone: Option<String>,

    website: Option<String>,

    rating: Option<f64>,

    #[serde(rename = "ratingCount")]
    rating_count: Option<i32>,
}

impl PlaceDirectoryClient {
    /// Creates a new directory client. Requests are bounded by a 30 s
    /// timeout so a hung directory never stalls a sync run indefinitely.
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent("campsite-atlas/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IngestError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Drops records that are unusable as candidates (no id, name or
    /// coordinates) and normalizes the rest.
    fn normalize_record(record: PlaceRecord) -> Option<RawPlace> {
        let name = record.name.as_deref().map(str::trim).unwrap_or_default();
        if record.place_id.is_empty() || name.is_empty() {
            warn!(place_id = %record.place_id, "Skipping directory record without a name");
            return None;
        }

        let (latitude, longitude) = match (record.latitude, record.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => (lat, lon),
            _ => {
                warn!(place_id = %record.place_id, "Skipping directory record without coordinates");
                return None;
            }
        };

        Some(RawPlace {
            external_ref: record.place_id,
            name: name.to_string(),
            address: record
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            latitude,
            longitude,
            phone: record.phone.filter(|p| !p.trim().is_empty()),
            website: record.website.filter(|w| !w.trim().is_empty()),
            rating: record.rating,
            rating_count: record.rating_count,
        })
    }
}

#[async_trait::async_trait]
impl PlaceSource for PlaceDirectoryClient {
    async fn fetch_batch(&self, offset: u32, limit: u32) -> Result<Vec<RawPlace>, IngestError> {
        debug!(offset, limit, "Fetching places from directory");

        let url = format!("{}/places", self.base_url);

        let mut params = vec![
            ("category", "campsite".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];

        if let Some(ref api_key) = self.api_key {
            params.push(("apikey", api_key.clone()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| IngestError::Upstream(format!("Directory request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            match status.as_u16() {
                429 => return Err(IngestError::RateLimited),
                401 | 403 => return Err(IngestError::AuthenticationFailed),
                _ => return Err(IngestError::Upstream(format!("HTTP {}", status))),
            }
        }

        let page: PlaceListResponse = response
            .json()
            .await
            .map_err(|e| IngestError::DataFormat(format!("Failed to parse directory page: {}", e)))?;

        Ok(page
            .results
            .into_iter()
            .filter_map(Self::normalize_record)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(place_id: &str, name: Option<&str>, lat: Option<f64>, lon: Option<f64>) -> PlaceRecord {
        PlaceRecord {
            place_id: place_id.to_string(),
            name: name.map(str::to_string),
            address: Some("  12 Forest Rd  ".to_string()),
            latitude: lat,
            longitude: lon,
            phone: Some("".to_string()),
            website: Some("https://example.org".to_string()),
            rating: Some(4.5),
            rating_count: Some(12),
        }
    }

    #[test]
    fn normalize_trims_and_keeps_usable_records() {
        let place = PlaceDirectoryClient::normalize_record(record(
            "dir:1",
            Some("  Pine Ridge Campground "),
            Some(45.0),
            Some(-110.0),
        ))
        .expect("record is usable");

        assert_eq!(place.external_ref, "dir:1");
        assert_eq!(place.name, "Pine Ridge Campground");
        assert_eq!(place.address.as_deref(), Some("12 Forest Rd"));
        assert_eq!(place.phone, None); // empty phone dropped
        assert_eq!(place.website.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn normalize_drops_unusable_records() {
        assert!(
            PlaceDirectoryClient::normalize_record(record("dir:1", None, Some(45.0), Some(-110.0)))
                .is_none()
        );
        assert!(
            PlaceDirectoryClient::normalize_record(record("dir:1", Some("Camp"), None, Some(-110.0)))
                .is_none()
        );
        assert!(
            PlaceDirectoryClient::normalize_record(record(
                "dir:1",
                Some("Camp"),
                Some(f64::NAN),
                Some(-110.0)
            ))
            .is_none()
        );
    }

    #[test]
    fn directory_page_deserializes() {
        let body = serde_json::json!({
            "results": [
                {
                    "placeId": "dir:42",
                    "name": "Lakeside Camp",
                    "lat": 44.5,
                    "lon": -109.9,
                    "ratingCount": 8,
                    "rating": 4.1
                }
            ]
        });

        let page: PlaceListResponse = serde_json::from_value(body).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].place_id, "dir:42");
        assert_eq!(page.results[0].rating_count, Some(8));
    }
}
