use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a candidate under administrative review.
///
/// Transitions are one-directional: `pending -> approved -> imported`, or
/// `pending -> rejected`. `rejected` and `imported` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// Discovered by a sync run, awaiting review
    Pending,
    /// Approved by an administrator, import not yet completed
    Approved,
    /// Rejected by an administrator (terminal)
    Rejected,
    /// Materialized as a campsite in the inventory (terminal)
    Imported,
}

impl CandidateStatus {
    /// The database/wire representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Imported => "imported",
        }
    }

    /// Parses a stored status string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CandidateStatus::Pending),
            "approved" => Some(CandidateStatus::Approved),
            "rejected" => Some(CandidateStatus::Rejected),
            "imported" => Some(CandidateStatus::Imported),
            _ => None,
        }
    }

    /// Whether no further transition is permitted from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CandidateStatus::Rejected | CandidateStatus::Imported)
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place record discovered from the external directory, pending review.
///
/// Candidates are created only by the sync orchestrator, mutated only by the
/// review state machine or a rescoring pass, and never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    /// Unique identifier for the candidate
    pub id: Uuid,
    /// Identifier of the record in the external directory (unique)
    pub external_ref: String,
    /// Normalized place name
    pub name: String,
    /// Normalized street address, when the directory provided one
    pub address: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Contact phone number, when available
    pub phone: Option<String>,
    /// Website URL, when available
    pub website: Option<String>,
    /// Aggregate rating reported by the directory
    pub rating: Option<f64>,
    /// Number of ratings behind the aggregate
    pub rating_count: Option<i32>,
    /// Deterministic quality/confidence score in `[0, 1]`
    pub confidence_score: f64,
    /// Whether a qualifying inventory match was found at scoring time
    pub is_duplicate: bool,
    /// The matched campsite, set iff `is_duplicate` is true
    pub matched_campsite_id: Option<Uuid>,
    /// Current review status
    pub status: CandidateStatus,
    /// Reason recorded on rejection
    pub rejection_reason: Option<String>,
    /// Campsite created by the import, set exactly once
    pub imported_campsite_id: Option<Uuid>,
    /// When the sync run created this candidate
    pub created_at: DateTime<Utc>,
    /// When an administrator approved or rejected it
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Which administrator reviewed it
    pub reviewed_by: Option<String>,
}

/// Custom error type for ingestion and review operations.
///
/// Every failure carries a kind and a human-readable message; nothing in this
/// crate is thrown or silently swallowed.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed request parameters, rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Candidate id does not exist
    #[error("Candidate not found")]
    NotFound,

    /// Transition attempted from a non-pending status, or a lost race
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The external directory or the campsite creator failed or timed out
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Rate limited by the external directory
    #[error("Rate limited by external directory")]
    RateLimited,

    /// Authentication failed with the external directory
    #[error("Authentication failed with external directory")]
    AuthenticationFailed,

    /// Data format error
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// A sync run already holds the run lock
    #[error("A sync run is already in progress")]
    SyncInProgress,
}

impl IngestError {
    /// Stable machine-readable tag for this error kind, used in API bodies
    /// and per-item bulk results.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Database(_) => "database_error",
            IngestError::Validation(_) => "validation_error",
            IngestError::NotFound => "candidate_not_found",
            IngestError::Conflict(_) => "conflict",
            IngestError::Upstream(_) => "upstream_failure",
            IngestError::RateLimited => "rate_limited",
            IngestError::AuthenticationFailed => "authentication_failed",
            IngestError::DataFormat(_) => "data_format_error",
            IngestError::SyncInProgress => "sync_in_progress",
        }
    }
}

impl actix_web::ResponseError for IngestError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        match self {
            IngestError::Validation(_) => HttpResponse::BadRequest().json(body),
            IngestError::NotFound => HttpResponse::NotFound().json(body),
            IngestError::Conflict(_) | IngestError::SyncInProgress => {
                HttpResponse::Conflict().json(body)
            }
            IngestError::Upstream(_) | IngestError::AuthenticationFailed => {
                HttpResponse::BadGateway().json(body)
            }
            IngestError::RateLimited => HttpResponse::TooManyRequests().json(body),
            IngestError::Database(_) | IngestError::DataFormat(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": self.kind(),
                    "message": "An internal error occurred",
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            CandidateStatus::Pending,
            CandidateStatus::Approved,
            CandidateStatus::Rejected,
            CandidateStatus::Imported,
        ] {
            assert_eq!(CandidateStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CandidateStatus::parse("published"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CandidateStatus::Pending.is_terminal());
        assert!(!CandidateStatus::Approved.is_terminal());
        assert!(CandidateStatus::Rejected.is_terminal());
        assert!(CandidateStatus::Imported.is_terminal());
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(IngestError::NotFound.kind(), "candidate_not_found");
        assert_eq!(
            IngestError::Conflict("already rejected".into()).kind(),
            "conflict"
        );
        assert_eq!(IngestError::SyncInProgress.kind(), "sync_in_progress");
    }
}
