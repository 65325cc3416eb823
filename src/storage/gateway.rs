use tracing::{error, info};

use crate::crawler::models::Apartment;
use crate::storage::postgres::ApartmentRepository;
use crate::storage::snapshot::SnapshotWriter;

/// Dedup and persistence front for the crawl. The relational store is the
/// dedup source of truth; the snapshot sink is best-effort archival and gets
/// every flush even when the store is down. With no repository at all the
/// gateway runs in file-only mode and reports every URL as new.
pub struct Gateway {
    repo: Option<Box<dyn ApartmentRepository>>,
    snapshots: SnapshotWriter,
}

impl Gateway {
    pub fn new(repo: Option<Box<dyn ApartmentRepository>>, snapshots: SnapshotWriter) -> Self {
        Self { repo, snapshots }
    }

    pub fn file_only(&self) -> bool {
        self.repo.is_none()
    }

    /// Fail-open: a lookup error is logged and the listing is treated as new.
    pub async fn exists(&self, url: &str) -> bool {
        let Some(repo) = &self.repo else {
            return false;
        };
        match repo.exists(url).await {
            Ok(known) => known,
            Err(e) => {
                error!(%url, error = %e, "Dedup lookup failed, treating listing as new");
                false
            }
        }
    }

    /// Persists one batch to both sinks. Failures are logged, never fatal;
    /// the caller clears its pending batch regardless of the outcome.
    pub async fn flush(&self, batch: &[Apartment]) {
        if batch.is_empty() {
            return;
        }

        match self.snapshots.write(batch) {
            Ok(path) => info!(count = batch.len(), path = %path.display(), "Snapshot written"),
            Err(e) => error!(error = %e, "Failed to write snapshot file"),
        }

        let Some(repo) = &self.repo else {
            info!(count = batch.len(), "Relational store unavailable, batch kept in file sink only");
            return;
        };
        match repo.save_batch(batch).await {
            Ok(saved) => info!(saved, "Batch committed to database"),
            Err(e) => error!(error = %e, "Batch rolled back, nothing from this page was committed"),
        }
    }
}
