use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::IngestError;

/// Name of the lease row guarding candidate sync runs.
const SYNC_LOCK_NAME: &str = "candidate_sync";

/// Default lease length. A crashed holder's lease expires after this long,
/// so a stuck lock never blocks syncing forever.
pub const DEFAULT_LEASE_SECONDS: i64 = 900;

/// Run-level mutual exclusion for sync runs.
///
/// Implemented as an explicit acquire/release lease rather than in-process
/// state, so the exclusion holds across multiple service instances sharing
/// one store.
#[async_trait::async_trait]
pub trait SyncLock: Send + Sync {
    /// Attempts to acquire the sync lease for `holder`. Returns `false`
    /// when another holder's unexpired lease exists.
    async fn try_acquire(&self, holder: &str) -> Result<bool, IngestError>;

    /// Releases the lease if `holder` still owns it.
    async fn release(&self, holder: &str) -> Result<(), IngestError>;
}

/// Lease stored in the `sync_locks` table.
pub struct PgSyncLock {
    pool: PgPool,
    lease_seconds: i64,
}

impl PgSyncLock {
    /// Creates a lock with the default lease length.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_seconds: DEFAULT_LEASE_SECONDS,
        }
    }

    /// Overrides the lease length.
    pub fn with_lease_seconds(mut self, lease_seconds: i64) -> Self {
        self.lease_seconds = lease_seconds;
        self
    }
}

#[async_trait::async_trait]
impl SyncLock for PgSyncLock {
    async fn try_acquire(&self, holder: &str) -> Result<bool, IngestError> {
        // Insert wins when no row exists; the conditional upsert takes over
        // an expired lease. No row returned means a live lease is held.
        let row = sqlx::query(
            r#"
            INSERT INTO sync_locks (name, holder, acquired_at, expires_at)
            VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
            ON CONFLICT (name) DO UPDATE
            SET holder = EXCLUDED.holder,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE sync_locks.expires_at < NOW()
            RETURNING holder
            "#,
        )
        .bind(SYNC_LOCK_NAME)
        .bind(holder)
        .bind(self.lease_seconds as f64)
        .fetch_optional(&self.pool)
        .await?;

        let acquired = row.is_some();
        debug!(holder, acquired, "Sync lock acquisition attempt");
        Ok(acquired)
    }

    async fn release(&self, holder: &str) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM sync_locks WHERE name = $1 AND holder = $2")
            .bind(SYNC_LOCK_NAME)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Lease state for the in-memory lock.
#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// In-memory lease for tests and single-instance development.
pub struct MemorySyncLock {
    lease: Mutex<Option<Lease>>,
    lease_seconds: i64,
}

impl MemorySyncLock {
    /// Creates a lock with the default lease length.
    pub fn new() -> Self {
        Self {
            lease: Mutex::new(None),
            lease_seconds: DEFAULT_LEASE_SECONDS,
        }
    }
}

#[async_trait::async_trait]
impl SyncLock for MemorySyncLock {
    async fn try_acquire(&self, holder: &str) -> Result<bool, IngestError> {
        let mut lease = self.lease.lock().await;

        match lease.as_ref() {
            Some(current) if current.expires_at > Utc::now() => Ok(false),
            _ => {
                *lease = Some(Lease {
                    holder: holder.to_string(),
                    expires_at: Utc::now() + chrono::Duration::seconds(self.lease_seconds),
                });
                Ok(true)
            }
        }
    }

    async fn release(&self, holder: &str) -> Result<(), IngestError> {
        let mut lease = self.lease.lock().await;
        if lease.as_ref().is_some_and(|l| l.holder == holder) {
            *lease = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let lock = MemorySyncLock::new();

        assert!(lock.try_acquire("run-a").await.unwrap());
        assert!(!lock.try_acquire("run-b").await.unwrap());

        lock.release("run-a").await.unwrap();
        assert!(lock.try_acquire("run-b").await.unwrap());
    }

    #[tokio::test]
    async fn release_by_non_holder_is_a_no_op() {
        let lock = MemorySyncLock::new();

        assert!(lock.try_acquire("run-a").await.unwrap());
        lock.release("run-b").await.unwrap();
        assert!(!lock.try_acquire("run-c").await.unwrap());
    }
}
