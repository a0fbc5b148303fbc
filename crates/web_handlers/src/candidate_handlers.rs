use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, web};
use validator::Validate;

use candidate_ingest::{
    CandidateFilter, CandidateStatus, CandidateStore, IngestError, ReviewService,
    SyncOrchestrator, apply_bulk,
};

use crate::candidate_types::*;

const MAX_PAGE_SIZE: i64 = 200;

/// The reviewing administrator's identity. Authorization happens upstream;
/// this only records who acted.
fn actor_from(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Admin-User")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("admin")
        .to_string()
}

fn parse_filter(query: &ListCandidatesQuery) -> Result<CandidateFilter, IngestError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(CandidateStatus::parse(raw).ok_or_else(|| {
            IngestError::Validation(format!("Unknown status filter: {}", raw))
        })?),
    };

    let limit = query.limit.unwrap_or(50);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(IngestError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(IngestError::Validation(
            "offset must not be negative".to_string(),
        ));
    }

    Ok(CandidateFilter {
        status,
        is_duplicate: query.is_duplicate,
        limit,
        offset,
    })
}

/// Lists candidates with status/duplicate filters and pagination.
pub async fn list_candidates(
    store: web::Data<dyn CandidateStore>,
    query: web::Query<ListCandidatesQuery>,
) -> Result<HttpResponse, IngestError> {
    let filter = parse_filter(&query)?;
    let (candidates, total) = store.list(&filter).await?;

    Ok(HttpResponse::Ok().json(ListCandidatesResponse {
        candidates,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Gets a single candidate by id.
pub async fn get_candidate(
    store: web::Data<dyn CandidateStore>,
    path: web::Path<uuid::Uuid>,
) -> Result<HttpResponse, IngestError> {
    let id = path.into_inner();
    let candidate = store.get(id).await?.ok_or(IngestError::NotFound)?;

    Ok(HttpResponse::Ok().json(candidate))
}

/// Approves a pending candidate and imports it into the inventory.
pub async fn approve_candidate(
    service: web::Data<ReviewService>,
    path: web::Path<uuid::Uuid>,
    req: HttpRequest,
) -> Result<HttpResponse, IngestError> {
    let id = path.into_inner();
    let outcome = service.approve(id, &actor_from(&req)).await?;

    Ok(HttpResponse::Ok().json(ApproveCandidateResponse {
        id: outcome.candidate.id,
        status: outcome.candidate.status,
        campsite_id: outcome.campsite_id,
    }))
}

/// Rejects a pending candidate with a required reason.
pub async fn reject_candidate(
    service: web::Data<ReviewService>,
    path: web::Path<uuid::Uuid>,
    request: web::Json<RejectCandidateRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, IngestError> {
    request
        .validate()
        .map_err(|e| IngestError::Validation(format!("Validation error: {}", e)))?;

    let id = path.into_inner();
    let candidate = service
        .reject(id, &actor_from(&req), &request.reason)
        .await?;

    Ok(HttpResponse::Ok().json(RejectCandidateResponse {
        id: candidate.id,
        status: candidate.status,
        rejection_reason: candidate.rejection_reason,
    }))
}

/// Applies approve/reject across a set of candidates with per-item
/// isolation.
pub async fn bulk_candidates(
    service: web::Data<ReviewService>,
    request: web::Json<BulkCandidatesRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, IngestError> {
    request
        .validate()
        .map_err(|e| IngestError::Validation(format!("Validation error: {}", e)))?;

    let results = apply_bulk(
        &service,
        &request.ids,
        request.action,
        request.reason.as_deref(),
        &actor_from(&req),
    )
    .await?;

    Ok(HttpResponse::Ok().json(BulkCandidatesResponse { results }))
}

/// Triggers a background sync run against the place directory. Returns 409
/// when a run already holds the lease.
pub async fn run_sync(
    orchestrator: web::Data<SyncOrchestrator>,
) -> Result<HttpResponse, IngestError> {
    let orchestrator: Arc<SyncOrchestrator> = orchestrator.into_inner();
    orchestrator.start_background().await?;

    Ok(HttpResponse::Accepted().json(SyncStartedResponse { status: "started" }))
}
