//! Background repository scan task.
//!
//! Pages the object listing for a bill repository into a channel,
//! enabling manifest fetches to start while listing continues. The scan
//! stops after [`MAX_CHECKED_KEYS_PER_REPOSITORY`] keys so a bucket full
//! of unrelated objects cannot make ingestion arbitrarily expensive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{BillRepository, MAX_CHECKED_KEYS_PER_REPOSITORY};
use crate::store::BillStore;

/// A key where a bill object may be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillKey {
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Handle to the background scan task.
pub(crate) struct ScanTask {
    /// Receiver for listed keys. Closes when the scan finishes, hits its
    /// key budget, or fails.
    pub rx: mpsc::Receiver<BillKey>,
}

impl ScanTask {
    /// Spawn a scan of the repository's bucket and prefix.
    ///
    /// Listing errors terminate the sequence early: they are logged, and
    /// the orchestrator treats a short or empty listing as "nothing to
    /// import".
    pub(crate) fn spawn(
        store: Arc<dyn BillStore>,
        repository: &BillRepository,
        region: String,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(Self::run(
            store,
            repository.bucket.clone(),
            repository.prefix.clone(),
            region,
            tx,
            shutdown,
        ));
        Self { rx }
    }

    async fn run(
        store: Arc<dyn BillStore>,
        bucket: String,
        prefix: String,
        region: String,
        tx: mpsc::Sender<BillKey>,
        shutdown: CancellationToken,
    ) {
        debug!(bucket = %bucket, prefix = %prefix, "Scanning bill repository");

        let mut continuation: Option<String> = None;
        let mut checked = 0usize;
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let page = match store.list_page(&bucket, &prefix, continuation.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    error!(bucket = %bucket, "Failed to list objects in bill repository: {err}");
                    return;
                }
            };

            checked += page.objects.len();
            for object in page.objects {
                let bill_key = BillKey {
                    region: region.clone(),
                    bucket: bucket.clone(),
                    key: object.key,
                    last_modified: object.last_modified,
                };
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    sent = tx.send(bill_key) => if sent.is_err() {
                        return;
                    },
                }
            }

            // The budget check runs once per page, so overshoot is bounded
            // by a single page.
            if checked >= MAX_CHECKED_KEYS_PER_REPOSITORY {
                warn!(
                    bucket = %bucket,
                    checked,
                    "Checked maximum number of keys for bill repository"
                );
                return;
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => return,
            }
        }
    }
}
