use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::matcher::{CampsiteSummary, haversine_meters};
use crate::types::{Candidate, IngestError};

/// Fields handed to the campsite-creation collaborator when an approved
/// candidate is imported into the inventory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NewCampsite {
    /// Campsite name
    pub name: String,
    /// Street address
    pub address: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Contact phone
    pub phone: Option<String>,
    /// Website URL
    pub website: Option<String>,
    /// The candidate this campsite originated from
    pub source_candidate_id: Uuid,
}

impl NewCampsite {
    /// Builds the creation payload from an approved candidate's normalized
    /// fields.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            name: candidate.name.clone(),
            address: candidate.address.clone(),
            latitude: candidate.latitude,
            longitude: candidate.longitude,
            phone: candidate.phone.clone(),
            website: candidate.website.clone(),
            source_candidate_id: candidate.id,
        }
    }
}

/// Read access to the authoritative campsite inventory, as the duplicate
/// matcher needs it.
#[async_trait::async_trait]
pub trait CampsiteInventory: Send + Sync {
    /// Campsites within `radius_meters` of the given coordinates.
    async fn campsites_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<CampsiteSummary>, IngestError>;
}

/// The campsite-creation collaborator: materializes a new inventory record
/// and returns its identifier. Retryable with the same payload; the review
/// state machine keeps its own at-most-once guard on top.
#[async_trait::async_trait]
pub trait CampsiteCreator: Send + Sync {
    /// Creates a campsite, returning the new inventory id.
    async fn create_campsite(&self, campsite: &NewCampsite) -> Result<Uuid, IngestError>;
}

/// Postgres-backed inventory access and campsite creation.
pub struct PgCampsiteDirectory {
    pool: PgPool,
}

impl PgCampsiteDirectory {
    /// Creates a directory over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Meters per degree of latitude; longitude shrinks with cos(latitude).
const METERS_PER_DEGREE: f64 = 111_320.0;

#[async_trait::async_trait]
impl CampsiteInventory for PgCampsiteDirectory {
    async fn campsites_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<CampsiteSummary>, IngestError> {
        // Bounding-box prefilter in SQL, exact haversine cut here.
        let lat_delta = radius_meters / METERS_PER_DEGREE;
        let lon_scale = latitude.to_radians().cos().abs().max(1e-6);
        let lon_delta = radius_meters / (METERS_PER_DEGREE * lon_scale);

        let rows = sqlx::query(
            r#"
            SELECT id, name, latitude, longitude
            FROM campsites
            WHERE latitude BETWEEN $1 AND $2
              AND longitude BETWEEN $3 AND $4
            "#,
        )
        .bind(latitude - lat_delta)
        .bind(latitude + lat_delta)
        .bind(longitude - lon_delta)
        .bind(longitude + lon_delta)
        .fetch_all(&self.pool)
        .await?;

        let campsites = rows
            .into_iter()
            .map(|row| CampsiteSummary {
                id: row.get("id"),
                name: row.get("name"),
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
            })
            .filter(|c| {
                haversine_meters(latitude, longitude, c.latitude, c.longitude) <= radius_meters
            })
            .collect();

        Ok(campsites)
    }
}

#[async_trait::async_trait]
impl CampsiteCreator for PgCampsiteDirectory {
    async fn create_campsite(&self, campsite: &NewCampsite) -> Result<Uuid, IngestError> {
        let row = sqlx::query(
            r#"
            INSERT INTO campsites (name, address, latitude, longitude, phone, website, source_candidate_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&campsite.name)
        .bind(&campsite.address)
        .bind(campsite.latitude)
        .bind(campsite.longitude)
        .bind(&campsite.phone)
        .bind(&campsite.website)
        .bind(campsite.source_candidate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }
}

/// In-memory inventory for tests and local development.
#[derive(Default)]
pub struct MemoryCampsiteInventory {
    campsites: Vec<CampsiteSummary>,
}

impl MemoryCampsiteInventory {
    /// Creates an inventory over a fixed campsite snapshot.
    pub fn new(campsites: Vec<CampsiteSummary>) -> Self {
        Self { campsites }
    }
}

#[async_trait::async_trait]
impl CampsiteInventory for MemoryCampsiteInventory {
    async fn campsites_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<CampsiteSummary>, IngestError> {
        Ok(self
            .campsites
            .iter()
            .filter(|c| {
                haversine_meters(latitude, longitude, c.latitude, c.longitude) <= radius_meters
            })
            .cloned()
            .collect())
    }
}

/// Campsite creator that always succeeds with fresh ids. Used in tests.
#[derive(Default)]
pub struct MockCampsiteCreator {
    created: tokio::sync::Mutex<Vec<NewCampsite>>,
}

impl MockCampsiteCreator {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// The payloads this mock has accepted so far.
    pub async fn created(&self) -> Vec<NewCampsite> {
        self.created.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl CampsiteCreator for MockCampsiteCreator {
    async fn create_campsite(&self, campsite: &NewCampsite) -> Result<Uuid, IngestError> {
        self.created.lock().await.push(campsite.clone());
        Ok(Uuid::new_v4())
    }
}

/// Campsite creator that always fails with an upstream error. Used in tests
/// for the approved-but-not-imported recovery path.
pub struct FailingCampsiteCreator;

#[async_trait::async_trait]
impl CampsiteCreator for FailingCampsiteCreator {
    async fn create_campsite(&self, _campsite: &NewCampsite) -> Result<Uuid, IngestError> {
        Err(IngestError::Upstream(
            "campsite service unavailable".to_string(),
        ))
    }
}

/// Campsite creator that never responds within any reasonable timeout. Used
/// in tests for the bounded-wait guarantee.
pub struct StalledCampsiteCreator;

#[async_trait::async_trait]
impl CampsiteCreator for StalledCampsiteCreator {
    async fn create_campsite(&self, _campsite: &NewCampsite) -> Result<Uuid, IngestError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(IngestError::Upstream("unreachable".to_string()))
    }
}
