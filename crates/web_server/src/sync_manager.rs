use std::sync::Arc;
use std::time::Duration;

use candidate_ingest::{IngestError, SyncOrchestrator};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Owns the periodic background sync against the place directory.
///
/// Each tick runs a full sync under the shared run lease; a tick that finds
/// the lease held (another instance syncing) skips quietly.
pub struct SyncManager {
    orchestrator: Arc<SyncOrchestrator>,
    handle: Option<JoinHandle<()>>,
}

impl SyncManager {
    /// Creates a manager over the shared orchestrator.
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator,
            handle: None,
        }
    }

    /// Starts the periodic sync loop.
    pub fn start(&mut self, interval_minutes: u64) {
        info!(interval_minutes, "Starting periodic candidate sync");

        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(interval_minutes.max(1) * 60));
            // The first tick fires immediately; skip it so startup stays
            // quick and the first sync runs after one full interval.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match orchestrator.run().await {
                    Ok(report) => info!(
                        inserted = report.inserted,
                        skipped_existing = report.skipped_existing,
                        errors = report.errors,
                        "Periodic sync finished"
                    ),
                    Err(IngestError::SyncInProgress) => {
                        info!("Periodic sync skipped, another run holds the lease")
                    }
                    Err(e) => error!("Periodic sync failed: {}", e),
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Stops the periodic sync loop and cancels an in-flight run at its
    /// next batch boundary.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Stopping periodic candidate sync");
            self.orchestrator.cancel();
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
