use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::campsites::CampsiteInventory;
use crate::matcher::{self, MatcherConfig};
use crate::place_client::{PlaceSource, RawPlace};
use crate::scorer::{ScoreInputs, ScorerWeights, confidence_score};
use crate::store::{CandidateFilter, CandidateStore, NewCandidate};
use crate::sync_lock::SyncLock;
use crate::types::{CandidateStatus, IngestError};

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size requested from the directory (default: 100)
    pub batch_size: u32,

    /// Upper bound on pages per run (default: 50)
    pub max_batches: u32,

    /// Bound on each directory fetch (default: 30 seconds)
    pub source_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batches: 50,
            source_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Raw records pulled from the directory
    pub fetched: u64,
    /// New candidates written to the store
    pub inserted: u64,
    /// Records skipped because their external_ref already has a candidate
    pub skipped_existing: u64,
    /// Inserted candidates flagged as likely duplicates
    pub flagged_duplicates: u64,
    /// Records that failed to process (isolated, run continues)
    pub errors: u64,
    /// Whether the run stopped at a cancellation point
    pub cancelled: bool,
}

/// Pulls place records from the external directory, deduplicates and scores
/// them, and writes new candidates to the store.
///
/// A run holds the sync lease for its whole duration, so overlapping
/// triggers cannot both insert candidates for the same external record; the
/// store's `external_ref` uniqueness guard backs that up per record.
pub struct SyncOrchestrator {
    store: Arc<dyn CandidateStore>,
    source: Arc<dyn PlaceSource>,
    inventory: Arc<dyn CampsiteInventory>,
    lock: Arc<dyn SyncLock>,
    matcher_config: MatcherConfig,
    scorer_weights: ScorerWeights,
    config: SyncConfig,
    cancel: AtomicBool,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with default matcher, scorer and sync
    /// configuration.
    pub fn new(
        store: Arc<dyn CandidateStore>,
        source: Arc<dyn PlaceSource>,
        inventory: Arc<dyn CampsiteInventory>,
        lock: Arc<dyn SyncLock>,
    ) -> Self {
        Self {
            store,
            source,
            inventory,
            lock,
            matcher_config: MatcherConfig::default(),
            scorer_weights: ScorerWeights::default(),
            config: SyncConfig::default(),
            cancel: AtomicBool::new(false),
        }
    }

    /// Overrides the matcher configuration.
    pub fn with_matcher_config(mut self, matcher_config: MatcherConfig) -> Self {
        self.matcher_config = matcher_config;
        self
    }

    /// Overrides the scorer weights.
    pub fn with_scorer_weights(mut self, scorer_weights: ScorerWeights) -> Self {
        self.scorer_weights = scorer_weights;
        self
    }

    /// Overrides the sync configuration.
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Requests cancellation. The running sync stops at the next batch
    /// boundary; candidates already committed remain valid.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Runs a full sync under the run lock, returning the report.
    /// Fails with [`IngestError::SyncInProgress`] when another run holds the
    /// lease.
    pub async fn run(&self) -> Result<SyncReport, IngestError> {
        let holder = Uuid::new_v4().to_string();

        if !self.lock.try_acquire(&holder).await? {
            return Err(IngestError::SyncInProgress);
        }

        info!(holder = %holder, "Starting candidate sync run");
        self.cancel.store(false, Ordering::Relaxed);

        let result = self.run_locked().await;

        if let Err(e) = self.lock.release(&holder).await {
            error!("Failed to release sync lock: {}", e);
        }

        match &result {
            Ok(report) => info!(
                fetched = report.fetched,
                inserted = report.inserted,
                skipped_existing = report.skipped_existing,
                flagged_duplicates = report.flagged_duplicates,
                errors = report.errors,
                cancelled = report.cancelled,
                "Candidate sync run finished"
            ),
            Err(e) => error!("Candidate sync run failed: {}", e),
        }

        result
    }

    /// Acquires the lock, then runs the sync on a background task. Returns
    /// immediately once the lease is held; the spawned run releases it.
    pub async fn start_background(self: Arc<Self>) -> Result<(), IngestError> {
        let holder = Uuid::new_v4().to_string();

        if !self.lock.try_acquire(&holder).await? {
            return Err(IngestError::SyncInProgress);
        }

        info!(holder = %holder, "Starting background candidate sync run");
        self.cancel.store(false, Ordering::Relaxed);

        tokio::spawn(async move {
            let result = self.run_locked().await;

            if let Err(e) = self.lock.release(&holder).await {
                error!("Failed to release sync lock: {}", e);
            }

            match result {
                Ok(report) => info!(
                    fetched = report.fetched,
                    inserted = report.inserted,
                    skipped_existing = report.skipped_existing,
                    errors = report.errors,
                    "Background candidate sync run finished"
                ),
                Err(e) => error!("Background candidate sync run failed: {}", e),
            }
        });

        Ok(())
    }

    /// The sync loop proper; the caller holds the run lock.
    async fn run_locked(&self) -> Result<SyncReport, IngestError> {
        let mut report = SyncReport::default();
        let batch_size = self.config.batch_size.max(1);

        for batch_index in 0..self.config.max_batches {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Sync run cancelled between batches");
                report.cancelled = true;
                break;
            }

            let offset = batch_index * batch_size;
            let batch = match timeout(
                self.config.source_timeout,
                self.source.fetch_batch(offset, batch_size),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(IngestError::Upstream(
                        "Place directory fetch timed out".to_string(),
                    ));
                }
            };

            // Only an empty page means the source is exhausted. A short page
            // is normal: the client drops unusable records after fetching, so
            // later pages may still hold candidates.
            if batch.is_empty() {
                break;
            }

            report.fetched += batch.len() as u64;

            for place in batch {
                match self.process_place(&place, &mut report).await {
                    Ok(()) => {}
                    Err(e) => {
                        // One bad record never aborts the run.
                        warn!(external_ref = %place.external_ref, error = %e, "Failed to process directory record");
                        report.errors += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Matches, scores and persists one directory record.
    async fn process_place(
        &self,
        place: &RawPlace,
        report: &mut SyncReport,
    ) -> Result<(), IngestError> {
        // Cheap existence check first; insert_if_absent remains the
        // authoritative guard against concurrent inserts.
        if self.store.external_ref_exists(&place.external_ref).await? {
            debug!(external_ref = %place.external_ref, "Candidate already known, skipping");
            report.skipped_existing += 1;
            return Ok(());
        }

        let (is_duplicate, matched_campsite_id) = self.match_against_inventory(place).await?;

        let inputs = ScoreInputs {
            name: &place.name,
            address: place.address.as_deref(),
            phone: place.phone.as_deref(),
            website: place.website.as_deref(),
            has_coordinates: true,
            rating: place.rating,
            rating_count: place.rating_count,
        };
        let score = confidence_score(&inputs, &self.scorer_weights);

        let inserted = self
            .store
            .insert_if_absent(NewCandidate {
                external_ref: place.external_ref.clone(),
                name: place.name.clone(),
                address: place.address.clone(),
                latitude: place.latitude,
                longitude: place.longitude,
                phone: place.phone.clone(),
                website: place.website.clone(),
                rating: place.rating,
                rating_count: place.rating_count,
                confidence_score: score,
                is_duplicate,
                matched_campsite_id,
            })
            .await?;

        match inserted {
            Some(candidate) => {
                debug!(
                    candidate_id = %candidate.id,
                    external_ref = %candidate.external_ref,
                    confidence = candidate.confidence_score,
                    is_duplicate = candidate.is_duplicate,
                    "Candidate created"
                );
                report.inserted += 1;
                if is_duplicate {
                    report.flagged_duplicates += 1;
                }
            }
            None => {
                // Lost an insert race with a concurrent run of the same
                // external record; the uniqueness guard kept it single.
                report.skipped_existing += 1;
            }
        }

        Ok(())
    }

    /// Runs the duplicate matcher for one record over the inventory near it.
    async fn match_against_inventory(
        &self,
        place: &RawPlace,
    ) -> Result<(bool, Option<Uuid>), IngestError> {
        let inventory = self
            .inventory
            .campsites_near(
                place.latitude,
                place.longitude,
                self.matcher_config.radius_meters,
            )
            .await?;

        let best = matcher::best_match(
            &place.name,
            place.latitude,
            place.longitude,
            &inventory,
            &self.matcher_config,
        );

        Ok(match best {
            Some(ref m) if matcher::is_duplicate(m, &self.matcher_config) => {
                (true, Some(m.campsite_id))
            }
            _ => (false, None),
        })
    }

    /// Recomputes matcher and scorer fields for all pending candidates.
    ///
    /// Both functions are deterministic over (candidate, inventory
    /// snapshot), so rescoring an unchanged candidate is a no-op. Returns
    /// the number of candidates rescored.
    pub async fn rescore_pending(&self) -> Result<u64, IngestError> {
        let mut rescored = 0u64;
        let mut offset = 0i64;
        let page_size = 200i64;

        loop {
            let (page, _total) = self
                .store
                .list(&CandidateFilter {
                    status: Some(CandidateStatus::Pending),
                    is_duplicate: None,
                    limit: page_size,
                    offset,
                })
                .await?;

            if page.is_empty() {
                break;
            }
            let page_len = page.len() as i64;

            for candidate in &page {
                let inventory = self
                    .inventory
                    .campsites_near(
                        candidate.latitude,
                        candidate.longitude,
                        self.matcher_config.radius_meters,
                    )
                    .await?;

                let best = matcher::best_match(
                    &candidate.name,
                    candidate.latitude,
                    candidate.longitude,
                    &inventory,
                    &self.matcher_config,
                );
                let (is_duplicate, matched_campsite_id) = match best {
                    Some(ref m) if matcher::is_duplicate(m, &self.matcher_config) => {
                        (true, Some(m.campsite_id))
                    }
                    _ => (false, None),
                };

                let score = confidence_score(
                    &ScoreInputs::from_candidate(candidate),
                    &self.scorer_weights,
                );

                self.store
                    .update_match_fields(candidate.id, score, is_duplicate, matched_campsite_id)
                    .await?;
                rescored += 1;
            }

            if page_len < page_size {
                break;
            }
            offset += page_len;
        }

        info!(rescored, "Rescoring pass finished");
        Ok(rescored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campsites::MemoryCampsiteInventory;
    use crate::matcher::CampsiteSummary;
    use crate::store::MemoryCandidateStore;
    use crate::sync_lock::MemorySyncLock;

    /// Place source serving fixed pages, with a switch that makes every
    /// fetch hang to exercise timeouts.
    struct FixedPlaceSource {
        pages: Vec<Vec<RawPlace>>,
        stall: bool,
    }

    impl FixedPlaceSource {
        fn new(pages: Vec<Vec<RawPlace>>) -> Self {
            Self {
                pages,
                stall: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl PlaceSource for FixedPlaceSource {
        async fn fetch_batch(&self, offset: u32, limit: u32) -> Result<Vec<RawPlace>, IngestError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let index = (offset / limit.max(1)) as usize;
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }
    }

    fn place(external_ref: &str, name: &str, latitude: f64, longitude: f64) -> RawPlace {
        RawPlace {
            external_ref: external_ref.to_string(),
            name: name.to_string(),
            address: Some("12 Forest Rd".to_string()),
            latitude,
            longitude,
            phone: Some("+1 406 555 0101".to_string()),
            website: None,
            rating: Some(4.2),
            rating_count: Some(40),
        }
    }

    fn orchestrator(
        store: Arc<MemoryCandidateStore>,
        pages: Vec<Vec<RawPlace>>,
        inventory: Vec<CampsiteSummary>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(
            store,
            Arc::new(FixedPlaceSource::new(pages)),
            Arc::new(MemoryCampsiteInventory::new(inventory)),
            Arc::new(MemorySyncLock::new()),
        )
        .with_sync_config(SyncConfig {
            batch_size: 2,
            max_batches: 10,
            source_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn sync_inserts_new_candidates_and_skips_known_refs() {
        let store = Arc::new(MemoryCandidateStore::new());

        // "dir:0" is already known from an earlier run.
        store
            .insert_if_absent(crate::store::test_candidate("dir:0", "Old Camp"))
            .await
            .unwrap();

        let pages = vec![
            vec![
                place("dir:0", "Old Camp", 45.0, -110.0),
                place("dir:1", "Pine Ridge Campground", 45.1, -110.0),
            ],
            vec![place("dir:2", "Lakeside Camp", 45.2, -110.0)],
        ];

        let orchestrator = orchestrator(store.clone(), pages, vec![]);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.errors, 0);
        assert!(!report.cancelled);

        let (all, total) = store.list(&CandidateFilter::default()).await.unwrap();
        assert_eq!(total, 3);
        assert!(all.iter().all(|c| c.status == CandidateStatus::Pending));
    }

    #[tokio::test]
    async fn resyncing_the_same_page_inserts_nothing_new() {
        let store = Arc::new(MemoryCandidateStore::new());
        let pages = vec![vec![place("dir:1", "Pine Ridge Campground", 45.1, -110.0)]];

        let first = orchestrator(store.clone(), pages.clone(), vec![]);
        let report = first.run().await.unwrap();
        assert_eq!(report.inserted, 1);

        let second = orchestrator(store.clone(), pages, vec![]);
        let report = second.run().await.unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped_existing, 1);
    }

    #[tokio::test]
    async fn short_pages_do_not_end_the_run_early() {
        let store = Arc::new(MemoryCandidateStore::new());

        // Each page comes back with one usable record out of a requested
        // batch of two, as happens when the client drops unusable records.
        // The run must keep fetching until a page is empty.
        let pages = vec![
            vec![place("dir:1", "Pine Ridge Campground", 45.0, -110.0)],
            vec![place("dir:2", "Lakeside Camp", 45.1, -110.0)],
        ];

        let orchestrator = orchestrator(store.clone(), pages, vec![]);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 2);
        let (_, total) = store.list(&CandidateFilter::default()).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn sync_flags_duplicates_against_inventory() {
        let store = Arc::new(MemoryCandidateStore::new());
        let existing = CampsiteSummary {
            id: Uuid::from_u128(7),
            name: "Pine Ridge Campground".to_string(),
            latitude: 45.0,
            longitude: -110.0,
        };

        let pages = vec![vec![
            place("dir:1", "Pine Ridge Campground", 45.0, -110.0),
            place("dir:2", "Somewhere Else Entirely", 46.0, -111.0),
        ]];

        let orchestrator = orchestrator(store.clone(), pages, vec![existing]);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.flagged_duplicates, 1);

        let (duplicates, _) = store
            .list(&CandidateFilter {
                is_duplicate: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].external_ref, "dir:1");
        assert_eq!(duplicates[0].matched_campsite_id, Some(Uuid::from_u128(7)));
    }

    #[tokio::test]
    async fn concurrent_sync_runs_are_mutually_exclusive() {
        let store = Arc::new(MemoryCandidateStore::new());
        let lock: Arc<dyn SyncLock> = Arc::new(MemorySyncLock::new());

        let orchestrator = SyncOrchestrator::new(
            store,
            Arc::new(FixedPlaceSource::new(vec![])),
            Arc::new(MemoryCampsiteInventory::new(vec![])),
            lock.clone(),
        );

        // Simulate another instance holding the lease.
        assert!(lock.try_acquire("other-instance").await.unwrap());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::SyncInProgress));

        // Once released, a run goes through and releases the lease itself.
        lock.release("other-instance").await.unwrap();
        orchestrator.run().await.unwrap();
        assert!(lock.try_acquire("post-run-check").await.unwrap());
    }

    #[tokio::test]
    async fn stalled_source_times_out_instead_of_hanging() {
        let store = Arc::new(MemoryCandidateStore::new());
        let mut source = FixedPlaceSource::new(vec![vec![place("dir:1", "Camp", 45.0, -110.0)]]);
        source.stall = true;

        let orchestrator = SyncOrchestrator::new(
            store,
            Arc::new(source),
            Arc::new(MemoryCampsiteInventory::new(vec![])),
            Arc::new(MemorySyncLock::new()),
        )
        .with_sync_config(SyncConfig {
            batch_size: 10,
            max_batches: 1,
            source_timeout: Duration::from_millis(20),
        });

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Upstream(_)));
    }

    #[tokio::test]
    async fn cancelled_run_keeps_committed_candidates() {
        let store = Arc::new(MemoryCandidateStore::new());
        let pages = vec![
            vec![
                place("dir:1", "Camp One", 45.0, -110.0),
                place("dir:2", "Camp Two", 45.1, -110.0),
            ],
            vec![place("dir:3", "Camp Three", 45.2, -110.0)],
        ];

        // Cancellation lands between batches: the first batch's inserts stay
        // committed, the second batch is never fetched.
        let cancelling = orchestrator_cancelling(store.clone(), pages);
        let report = cancelling.run().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 2);
        let (_, total) = store.list(&CandidateFilter::default()).await.unwrap();
        assert_eq!(total, 2);
    }

    /// Builds an orchestrator whose source cancels the run after serving
    /// each batch.
    fn orchestrator_cancelling(
        store: Arc<MemoryCandidateStore>,
        pages: Vec<Vec<RawPlace>>,
    ) -> Arc<SyncOrchestrator> {
        struct CancellingSource {
            inner: FixedPlaceSource,
            orchestrator: std::sync::Mutex<Option<Arc<SyncOrchestrator>>>,
        }

        #[async_trait::async_trait]
        impl PlaceSource for CancellingSource {
            async fn fetch_batch(
                &self,
                offset: u32,
                limit: u32,
            ) -> Result<Vec<RawPlace>, IngestError> {
                let batch = self.inner.fetch_batch(offset, limit).await?;
                if let Some(orchestrator) = self.orchestrator.lock().unwrap().as_ref() {
                    orchestrator.cancel();
                }
                Ok(batch)
            }
        }

        let source = Arc::new(CancellingSource {
            inner: FixedPlaceSource::new(pages),
            orchestrator: std::sync::Mutex::new(None),
        });

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                store,
                source.clone(),
                Arc::new(MemoryCampsiteInventory::new(vec![])),
                Arc::new(MemorySyncLock::new()),
            )
            .with_sync_config(SyncConfig {
                batch_size: 2,
                max_batches: 10,
                source_timeout: Duration::from_secs(5),
            }),
        );

        *source.orchestrator.lock().unwrap() = Some(orchestrator.clone());
        orchestrator
    }

    #[tokio::test]
    async fn rescoring_is_idempotent() {
        let store = Arc::new(MemoryCandidateStore::new());
        let pages = vec![vec![place("dir:1", "Pine Ridge Campground", 45.0, -110.0)]];
        let inventory = vec![CampsiteSummary {
            id: Uuid::from_u128(7),
            name: "Pine Ridge Campground".to_string(),
            latitude: 45.0,
            longitude: -110.0,
        }];

        let orchestrator = orchestrator(store.clone(), pages, inventory);
        orchestrator.run().await.unwrap();

        let (before, _) = store.list(&CandidateFilter::default()).await.unwrap();
        let rescored = orchestrator.rescore_pending().await.unwrap();
        assert_eq!(rescored, 1);
        let (after, _) = store.list(&CandidateFilter::default()).await.unwrap();

        assert_eq!(before[0].confidence_score, after[0].confidence_score);
        assert_eq!(before[0].is_duplicate, after[0].is_duplicate);
        assert_eq!(before[0].matched_campsite_id, after[0].matched_campsite_id);
    }
}
