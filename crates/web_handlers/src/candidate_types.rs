use candidate_ingest::{BulkAction, BulkItemResult, Candidate, CandidateStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Query parameters for the candidate listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListCandidatesQuery {
    /// Restrict to one review status
    pub status: Option<String>,

    /// Restrict to duplicates / non-duplicates
    #[serde(alias = "isDuplicate")]
    pub is_duplicate: Option<bool>,

    /// Page size (1..=200, default 50)
    pub limit: Option<i64>,

    /// Page offset (default 0)
    pub offset: Option<i64>,
}

/// Response structure for the candidate listing endpoint.
#[derive(Debug, Serialize)]
pub struct ListCandidatesResponse {
    /// One page of candidates, newest first
    pub candidates: Vec<Candidate>,
    /// Total count matching the filter, before pagination
    pub total: i64,
    /// Applied page size
    pub limit: i64,
    /// Applied page offset
    pub offset: i64,
}

/// Request structure for rejecting a candidate.
#[derive(Debug, Deserialize, Validate)]
pub struct RejectCandidateRequest {
    /// Why the candidate is rejected; required and non-empty
    #[validate(length(min = 1, message = "A rejection reason is required"))]
    pub reason: String,
}

/// Response structure for a successful approve-and-import.
#[derive(Debug, Serialize)]
pub struct ApproveCandidateResponse {
    /// The candidate id
    pub id: Uuid,
    /// Resulting status (`imported`)
    pub status: CandidateStatus,
    /// The campsite created in the inventory
    pub campsite_id: Uuid,
}

/// Response structure for a successful rejection.
#[derive(Debug, Serialize)]
pub struct RejectCandidateResponse {
    /// The candidate id
    pub id: Uuid,
    /// Resulting status (`rejected`)
    pub status: CandidateStatus,
    /// The recorded reason
    pub rejection_reason: Option<String>,
}

/// Request structure for bulk approve/reject.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkCandidatesRequest {
    /// Candidates to process
    #[validate(length(min = 1, message = "At least one candidate id is required"))]
    pub ids: Vec<Uuid>,

    /// Action applied to every id
    pub action: BulkAction,

    /// Shared reason, required for bulk reject
    pub reason: Option<String>,
}

/// Response structure for bulk approve/reject.
#[derive(Debug, Serialize)]
pub struct BulkCandidatesResponse {
    /// Per-id outcomes, in request order
    pub results: Vec<BulkItemResult>,
}

/// Response structure for an accepted sync trigger.
#[derive(Debug, Serialize)]
pub struct SyncStartedResponse {
    /// Always "started"
    pub status: &'static str,
}
