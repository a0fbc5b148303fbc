use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::review::ReviewService;
use crate::types::{CandidateStatus, IngestError};

/// The action applied across a bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Approve and import every candidate in the batch
    Approve,
    /// Reject every candidate in the batch with a shared reason
    Reject,
}

/// Per-candidate outcome of a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    /// The candidate this result is for
    pub id: Uuid,
    /// Whether the transition was applied
    pub ok: bool,
    /// Resulting status on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CandidateStatus>,
    /// Created campsite on a successful approve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campsite_id: Option<Uuid>,
    /// Error kind tag on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkItemResult {
    fn success(id: Uuid, status: CandidateStatus, campsite_id: Option<Uuid>) -> Self {
        Self {
            id,
            ok: true,
            status: Some(status),
            campsite_id,
            error: None,
            message: None,
        }
    }

    fn failure(id: Uuid, error: &IngestError) -> Self {
        Self {
            id,
            ok: false,
            status: None,
            campsite_id: None,
            error: Some(error.kind().to_string()),
            message: Some(error.to_string()),
        }
    }
}

/// Applies a single action across a set of candidate ids with per-item
/// isolation: one id failing (already processed, missing, upstream failure)
/// never prevents the rest from being processed. Each item goes through the
/// same review-service path as a single-item request, so the per-item
/// compare-and-swap guarantees are identical.
pub async fn apply_bulk(
    service: &ReviewService,
    ids: &[Uuid],
    action: BulkAction,
    reason: Option<&str>,
    actor: &str,
) -> Result<Vec<BulkItemResult>, IngestError> {
    if ids.is_empty() {
        return Err(IngestError::Validation(
            "At least one candidate id is required".to_string(),
        ));
    }

    let reason = match action {
        BulkAction::Approve => None,
        BulkAction::Reject => {
            let reason = reason.map(str::trim).unwrap_or_default();
            if reason.is_empty() {
                return Err(IngestError::Validation(
                    "A rejection reason is required for bulk reject".to_string(),
                ));
            }
            Some(reason)
        }
    };

    let mut results = Vec::with_capacity(ids.len());

    for &id in ids {
        let result = match action {
            BulkAction::Approve => service.approve(id, actor).await.map(|outcome| {
                BulkItemResult::success(id, outcome.candidate.status, Some(outcome.campsite_id))
            }),
            BulkAction::Reject => service
                .reject(id, actor, reason.unwrap_or_default())
                .await
                .map(|candidate| BulkItemResult::success(id, candidate.status, None)),
        };

        results.push(result.unwrap_or_else(|e| {
            warn!(candidate_id = %id, error = %e, "Bulk item failed");
            BulkItemResult::failure(id, &e)
        }));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::campsites::MockCampsiteCreator;
    use crate::store::{CandidateStore, MemoryCandidateStore, test_candidate};

    async fn seeded(count: usize) -> (Arc<MemoryCandidateStore>, Vec<Uuid>, ReviewService) {
        let store = Arc::new(MemoryCandidateStore::new());
        let mut ids = Vec::new();
        for i in 0..count {
            let candidate = store
                .insert_if_absent(test_candidate(
                    &format!("osm:{}", i),
                    &format!("Campground {}", i),
                ))
                .await
                .unwrap()
                .unwrap();
            ids.push(candidate.id);
        }
        let service = ReviewService::new(store.clone(), Arc::new(MockCampsiteCreator::new()));
        (store, ids, service)
    }

    #[tokio::test]
    async fn bulk_approve_isolates_failures() {
        let (store, ids, service) = seeded(4).await;

        // Pre-reject one id; the rest stay pending.
        service
            .reject(ids[1], "alice", "Not a real campsite")
            .await
            .unwrap();

        let results = apply_bulk(&service, &ids, BulkAction::Approve, None, "bob")
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        for (i, result) in results.iter().enumerate() {
            if i == 1 {
                assert!(!result.ok);
                assert_eq!(result.error.as_deref(), Some("conflict"));
            } else {
                assert!(result.ok, "item {} should succeed", i);
                assert_eq!(result.status, Some(CandidateStatus::Imported));
                assert!(result.campsite_id.is_some());
            }
        }

        // The rejected candidate was untouched.
        let rejected = store.get(ids[1]).await.unwrap().unwrap();
        assert_eq!(rejected.status, CandidateStatus::Rejected);
    }

    #[tokio::test]
    async fn bulk_reject_applies_shared_reason() {
        let (store, ids, service) = seeded(3).await;

        let results = apply_bulk(
            &service,
            &ids,
            BulkAction::Reject,
            Some("Duplicate import batch"),
            "alice",
        )
        .await
        .unwrap();

        assert!(results.iter().all(|r| r.ok));
        for id in &ids {
            let stored = store.get(*id).await.unwrap().unwrap();
            assert_eq!(stored.status, CandidateStatus::Rejected);
            assert_eq!(
                stored.rejection_reason.as_deref(),
                Some("Duplicate import batch")
            );
        }
    }

    #[tokio::test]
    async fn bulk_reject_requires_reason() {
        let (_store, ids, service) = seeded(1).await;

        let err = apply_bulk(&service, &ids, BulkAction::Reject, None, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let err = apply_bulk(&service, &ids, BulkAction::Reject, Some("  "), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn bulk_with_unknown_id_reports_not_found_for_it_only() {
        let (_store, mut ids, service) = seeded(2).await;
        ids.insert(1, Uuid::new_v4());

        let results = apply_bulk(&service, &ids, BulkAction::Approve, None, "alice")
            .await
            .unwrap();

        assert!(results[0].ok);
        assert!(!results[1].ok);
        assert_eq!(results[1].error.as_deref(), Some("candidate_not_found"));
        assert!(results[2].ok);
    }

    #[tokio::test]
    async fn bulk_with_no_ids_is_a_validation_error() {
        let (_store, _ids, service) = seeded(0).await;

        let err = apply_bulk(&service, &[], BulkAction::Approve, None, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
