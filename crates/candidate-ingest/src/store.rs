use std::collections::HashMap;

use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Candidate, CandidateStatus, IngestError};

/// Fields persisted when the sync orchestrator creates a new candidate.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    /// Identifier in the external directory (unique across candidates)
    pub external_ref: String,
    /// Normalized place name
    pub name: String,
    /// Street address, if the directory provided one
    pub address: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Contact phone, if available
    pub phone: Option<String>,
    /// Website URL, if available
    pub website: Option<String>,
    /// Aggregate external rating
    pub rating: Option<f64>,
    /// Number of external ratings
    pub rating_count: Option<i32>,
    /// Confidence score computed at sync time
    pub confidence_score: f64,
    /// Duplicate verdict computed at sync time
    pub is_duplicate: bool,
    /// Matched campsite, set iff `is_duplicate`
    pub matched_campsite_id: Option<Uuid>,
}

/// Filter and pagination for candidate listings.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    /// Restrict to a single status
    pub status: Option<CandidateStatus>,
    /// Restrict to duplicates / non-duplicates
    pub is_duplicate: Option<bool>,
    /// Page size
    pub limit: i64,
    /// Page offset
    pub offset: i64,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            status: None,
            is_duplicate: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistence for candidate records and their lifecycle state.
///
/// Status changes go through compare-and-swap operations: a conditional
/// update that only applies when the stored status matches the expected
/// prior value, so concurrent reviewers cannot double-process a candidate.
#[async_trait::async_trait]
pub trait CandidateStore: Send + Sync {
    /// Inserts a candidate unless one with the same `external_ref` already
    /// exists. Returns the stored candidate, or `None` when skipped.
    async fn insert_if_absent(
        &self,
        candidate: NewCandidate,
    ) -> Result<Option<Candidate>, IngestError>;

    /// Whether a candidate with this external reference already exists.
    async fn external_ref_exists(&self, external_ref: &str) -> Result<bool, IngestError>;

    /// Fetches a candidate by id.
    async fn get(&self, id: Uuid) -> Result<Option<Candidate>, IngestError>;

    /// Lists candidates matching the filter, newest first, along with the
    /// total count before pagination.
    async fn list(&self, filter: &CandidateFilter) -> Result<(Vec<Candidate>, i64), IngestError>;

    /// Compare-and-swap status transition. Records the reviewing actor and,
    /// for rejections, the reason. Returns `false` when the stored status
    /// did not match `expected` (or the id does not exist); the caller
    /// re-fetches to distinguish conflict from not-found.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: CandidateStatus,
        next: CandidateStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, IngestError>;

    /// Completes an import: `approved -> imported`, storing the created
    /// campsite id. Applies at most once; returns `false` when the candidate
    /// is not in `approved` or an import was already recorded.
    async fn record_import(&self, id: Uuid, campsite_id: Uuid) -> Result<bool, IngestError>;

    /// Overwrites the matcher/scorer fields of a pending candidate during a
    /// rescoring pass.
    async fn update_match_fields(
        &self,
        id: Uuid,
        confidence_score: f64,
        is_duplicate: bool,
        matched_campsite_id: Option<Uuid>,
    ) -> Result<(), IngestError>;
}

/// PostgreSQL-backed candidate store.
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    /// Creates a store over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CANDIDATE_COLUMNS: &str = "id, external_ref, name, address, latitude, longitude, \
     phone, website, rating, rating_count, confidence_score, is_duplicate, \
     matched_campsite_id, status, rejection_reason, imported_campsite_id, \
     created_at, reviewed_at, reviewed_by";

fn candidate_from_row(row: &PgRow) -> Result<Candidate, IngestError> {
    let status_raw: String = row.get("status");
    let status = CandidateStatus::parse(&status_raw)
        .ok_or_else(|| IngestError::DataFormat(format!("Unknown status: {}", status_raw)))?;

    Ok(Candidate {
        id: row.get("id"),
        external_ref: row.get("external_ref"),
        name: row.get("name"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        phone: row.get("phone"),
        website: row.get("website"),
        rating: row.get("rating"),
        rating_count: row.get("rating_count"),
        confidence_score: row.get("confidence_score"),
        is_duplicate: row.get("is_duplicate"),
        matched_campsite_id: row.get("matched_campsite_id"),
        status,
        rejection_reason: row.get("rejection_reason"),
        imported_campsite_id: row.get("imported_campsite_id"),
        created_at: row.get("created_at"),
        reviewed_at: row.get("reviewed_at"),
        reviewed_by: row.get("reviewed_by"),
    })
}

#[async_trait::async_trait]
impl CandidateStore for PgCandidateStore {
    async fn insert_if_absent(
        &self,
        candidate: NewCandidate,
    ) -> Result<Option<Candidate>, IngestError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO candidates (
                external_ref, name, address, latitude, longitude, phone, website,
                rating, rating_count, confidence_score, is_duplicate, matched_campsite_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (external_ref) DO NOTHING
            RETURNING {CANDIDATE_COLUMNS}
            "#
        ))
        .bind(&candidate.external_ref)
        .bind(&candidate.name)
        .bind(&candidate.address)
        .bind(candidate.latitude)
        .bind(candidate.longitude)
        .bind(&candidate.phone)
        .bind(&candidate.website)
        .bind(candidate.rating)
        .bind(candidate.rating_count)
        .bind(candidate.confidence_score)
        .bind(candidate.is_duplicate)
        .bind(candidate.matched_campsite_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn external_ref_exists(&self, external_ref: &str) -> Result<bool, IngestError> {
        let row = sqlx::query("SELECT 1 AS present FROM candidates WHERE external_ref = $1")
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Candidate>, IngestError> {
        let row = sqlx::query(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn list(&self, filter: &CandidateFilter) -> Result<(Vec<Candidate>, i64), IngestError> {
        let status = filter.status.map(|s| s.as_str());

        let total_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM candidates
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::bool IS NULL OR is_duplicate = $2)
            "#,
        )
        .bind(status)
        .bind(filter.is_duplicate)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = total_row.get("total");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}
            FROM candidates
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::bool IS NULL OR is_duplicate = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(status)
        .bind(filter.is_duplicate)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(candidate_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((candidates, total))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: CandidateStatus,
        next: CandidateStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET status = $3, reviewed_at = NOW(), reviewed_by = $4, rejection_reason = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(actor)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_import(&self, id: Uuid, campsite_id: Uuid) -> Result<bool, IngestError> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET status = 'imported', imported_campsite_id = $2
            WHERE id = $1 AND status = 'approved' AND imported_campsite_id IS NULL
            "#,
        )
        .bind(id)
        .bind(campsite_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_match_fields(
        &self,
        id: Uuid,
        confidence_score: f64,
        is_duplicate: bool,
        matched_campsite_id: Option<Uuid>,
    ) -> Result<(), IngestError> {
        sqlx::query(
            r#"
            UPDATE candidates
            SET confidence_score = $2, is_duplicate = $3, matched_campsite_id = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(confidence_score)
        .bind(is_duplicate)
        .bind(matched_campsite_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory candidate store backing tests and local development.
///
/// The write lock serializes every mutation, so the compare-and-swap
/// semantics match the conditional updates of [`PgCandidateStore`].
#[derive(Default)]
pub struct MemoryCandidateStore {
    candidates: RwLock<HashMap<Uuid, Candidate>>,
}

impl MemoryCandidateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn insert_if_absent(
        &self,
        candidate: NewCandidate,
    ) -> Result<Option<Candidate>, IngestError> {
        let mut candidates = self.candidates.write().await;

        if candidates
            .values()
            .any(|c| c.external_ref == candidate.external_ref)
        {
            return Ok(None);
        }

        let stored = Candidate {
            id: Uuid::new_v4(),
            external_ref: candidate.external_ref,
            name: candidate.name,
            address: candidate.address,
            latitude: candidate.latitude,
            longitude: candidate.longitude,
            phone: candidate.phone,
            website: candidate.website,
            rating: candidate.rating,
            rating_count: candidate.rating_count,
            confidence_score: candidate.confidence_score,
            is_duplicate: candidate.is_duplicate,
            matched_campsite_id: candidate.matched_campsite_id,
            status: CandidateStatus::Pending,
            rejection_reason: None,
            imported_campsite_id: None,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };

        candidates.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn external_ref_exists(&self, external_ref: &str) -> Result<bool, IngestError> {
        let candidates = self.candidates.read().await;
        Ok(candidates.values().any(|c| c.external_ref == external_ref))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Candidate>, IngestError> {
        let candidates = self.candidates.read().await;
        Ok(candidates.get(&id).cloned())
    }

    async fn list(&self, filter: &CandidateFilter) -> Result<(Vec<Candidate>, i64), IngestError> {
        let candidates = self.candidates.read().await;

        let mut matching: Vec<Candidate> = candidates
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| filter.is_duplicate.is_none_or(|d| c.is_duplicate == d))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.max(0) as usize;
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: CandidateStatus,
        next: CandidateStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, IngestError> {
        let mut candidates = self.candidates.write().await;

        match candidates.get_mut(&id) {
            Some(candidate) if candidate.status == expected => {
                candidate.status = next;
                candidate.reviewed_at = Some(Utc::now());
                candidate.reviewed_by = Some(actor.to_string());
                candidate.rejection_reason = reason.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_import(&self, id: Uuid, campsite_id: Uuid) -> Result<bool, IngestError> {
        let mut candidates = self.candidates.write().await;

        match candidates.get_mut(&id) {
            Some(candidate)
                if candidate.status == CandidateStatus::Approved
                    && candidate.imported_campsite_id.is_none() =>
            {
                candidate.status = CandidateStatus::Imported;
                candidate.imported_campsite_id = Some(campsite_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_match_fields(
        &self,
        id: Uuid,
        confidence_score: f64,
        is_duplicate: bool,
        matched_campsite_id: Option<Uuid>,
    ) -> Result<(), IngestError> {
        let mut candidates = self.candidates.write().await;

        if let Some(candidate) = candidates.get_mut(&id)
            && candidate.status == CandidateStatus::Pending
        {
            candidate.confidence_score = confidence_score;
            candidate.is_duplicate = is_duplicate;
            candidate.matched_campsite_id = matched_campsite_id;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_candidate(external_ref: &str, name: &str) -> NewCandidate {
    NewCandidate {
        external_ref: external_ref.to_string(),
        name: name.to_string(),
        address: Some("12 Forest Rd".to_string()),
        latitude: 45.0,
        longitude: -110.0,
        phone: Some("+1 406 555 0101".to_string()),
        website: None,
        rating: Some(4.4),
        rating_count: Some(37),
        confidence_score: 0.8,
        is_duplicate: false,
        matched_campsite_id: None,
    }
}
