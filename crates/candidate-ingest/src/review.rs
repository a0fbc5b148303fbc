use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::campsites::{CampsiteCreator, NewCampsite};
use crate::store::CandidateStore;
use crate::types::{Candidate, CandidateStatus, IngestError};

/// Result of a successful approval: the candidate after import and the
/// inventory record the import created.
#[derive(Debug, Clone)]
pub struct ApproveOutcome {
    /// The candidate, now `imported`
    pub candidate: Candidate,
    /// The campsite created in the inventory
    pub campsite_id: Uuid,
}

/// The review state machine.
///
/// Governs the one-directional transitions `pending -> approved -> imported`
/// and `pending -> rejected`. Every transition is a compare-and-swap in the
/// store, so concurrent reviewers racing on the same candidate see exactly
/// one success and otherwise a conflict, never a dropped or duplicated
/// transition.
pub struct ReviewService {
    store: Arc<dyn CandidateStore>,
    creator: Arc<dyn CampsiteCreator>,
    creation_timeout: Duration,
}

impl ReviewService {
    /// Creates a review service with the default 30 s creation timeout.
    pub fn new(store: Arc<dyn CandidateStore>, creator: Arc<dyn CampsiteCreator>) -> Self {
        Self {
            store,
            creator,
            creation_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the bound on campsite-creation calls.
    pub fn with_creation_timeout(mut self, creation_timeout: Duration) -> Self {
        self.creation_timeout = creation_timeout;
        self
    }

    /// Approves a pending candidate and imports it into the inventory.
    ///
    /// The compound operation: (a) compare-and-swap `pending -> approved`,
    /// (b) call the campsite-creation collaborator under a timeout, (c)
    /// compare-and-swap `approved -> imported` recording the campsite id.
    /// If (b) fails the candidate stays `approved`, and calling `approve`
    /// again resumes at (b) without re-running the approval check.
    pub async fn approve(&self, id: Uuid, actor: &str) -> Result<ApproveOutcome, IngestError> {
        let approved = self
            .store
            .transition_status(
                id,
                CandidateStatus::Pending,
                CandidateStatus::Approved,
                actor,
                None,
            )
            .await?;

        if !approved {
            let current = self.store.get(id).await?.ok_or(IngestError::NotFound)?;
            match current.status {
                // Prior approval whose import did not complete: resume it.
                CandidateStatus::Approved => {
                    info!(candidate_id = %id, "Resuming import of approved candidate");
                }
                status => {
                    return Err(IngestError::Conflict(format!(
                        "Candidate is {} and cannot be approved",
                        status
                    )));
                }
            }
        }

        let candidate = self.store.get(id).await?.ok_or(IngestError::NotFound)?;
        let payload = NewCampsite::from_candidate(&candidate);

        let campsite_id = match timeout(
            self.creation_timeout,
            self.creator.create_campsite(&payload),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(candidate_id = %id, "Campsite creation timed out; candidate left approved");
                return Err(IngestError::Upstream(
                    "Campsite creation timed out; approval is recorded, retry the import"
                        .to_string(),
                ));
            }
        };

        if !self.store.record_import(id, campsite_id).await? {
            // A concurrent retry finished the import first.
            return Err(IngestError::Conflict(
                "Import already recorded for this candidate".to_string(),
            ));
        }

        let candidate = self.store.get(id).await?.ok_or(IngestError::NotFound)?;
        info!(candidate_id = %id, campsite_id = %campsite_id, "Candidate imported");

        Ok(ApproveOutcome {
            candidate,
            campsite_id,
        })
    }

    /// Rejects a pending candidate with a required, non-empty reason.
    pub async fn reject(
        &self,
        id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<Candidate, IngestError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(IngestError::Validation(
                "A rejection reason is required".to_string(),
            ));
        }

        let rejected = self
            .store
            .transition_status(
                id,
                CandidateStatus::Pending,
                CandidateStatus::Rejected,
                actor,
                Some(reason),
            )
            .await?;

        if !rejected {
            let current = self.store.get(id).await?.ok_or(IngestError::NotFound)?;
            return Err(IngestError::Conflict(format!(
                "Candidate is {} and cannot be rejected",
                current.status
            )));
        }

        info!(candidate_id = %id, reviewed_by = actor, "Candidate rejected");
        self.store.get(id).await?.ok_or(IngestError::NotFound)
    }
}
