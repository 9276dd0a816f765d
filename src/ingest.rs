//! Bill ingestion orchestration.
//!
//! [`read_bills`] is the crate's entry point: it resolves a region-bound
//! store client for one bill repository, scans the repository for
//! manifests, fans out one reader per report key, and delivers every
//! decoded line item to the caller's sink.
//!
//! Only credential/client resolution can fail the call. Everything
//! downstream is best-effort: a broken manifest or report part is logged
//! and skipped, and the sink simply receives fewer records.

use std::sync::Arc;

use snafu::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{AwsAccount, BillRepository, READ_BILLS_SESSION_NAME};
use crate::credentials::CredentialProvider;
use crate::error::{CredentialsSnafu, IngestError, ResolveSnafu};
use crate::manifest::{FetchTask, Manifest, is_manifest_key};
use crate::merge::FanIn;
use crate::reader::ReportReader;
use crate::record::LineItem;
use crate::scan::ScanTask;
use crate::store::{BillStore, StoreProvider};

/// Receives every decoded line item, one call per row.
///
/// The returned `bool` is part of the contract surface but is not
/// consulted to stop ingestion.
pub trait LineItemSink: Send {
    fn deliver(&mut self, item: LineItem) -> bool;
}

impl<F: FnMut(LineItem) -> bool + Send> LineItemSink for F {
    fn deliver(&mut self, item: LineItem) -> bool {
        self(item)
    }
}

/// Summary of one `read_bills` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Manifests successfully fetched and parsed.
    pub manifests: usize,
    /// Report-key streams fanned out.
    pub report_keys: usize,
    /// Line items delivered to the sink.
    pub line_items: usize,
}

/// Read every bill line item in `repository` and deliver it to `sink`.
///
/// Returns an error only when credentials or the region-bound store
/// client cannot be resolved; per-object and per-report failures are
/// absorbed and logged. `shutdown` aborts all in-flight work promptly.
pub async fn read_bills(
    credentials: &dyn CredentialProvider,
    stores: &dyn StoreProvider,
    account: &AwsAccount,
    repository: &BillRepository,
    shutdown: CancellationToken,
    sink: &mut dyn LineItemSink,
) -> Result<IngestStats, IngestError> {
    let session = credentials
        .temporary_credentials(account, READ_BILLS_SESSION_NAME)
        .await
        .context(CredentialsSnafu)?;

    // The session credentials are region-agnostic; bind them to the
    // bucket's actual region before any data call.
    let probe = stores.connect(&session, None).await.context(ResolveSnafu)?;
    let region = probe
        .bucket_region(&repository.bucket)
        .await
        .context(ResolveSnafu)?;
    let store = stores
        .connect(&session, Some(&region))
        .await
        .context(ResolveSnafu)?;
    debug!(
        bucket = %repository.bucket,
        region = %region,
        "Obtained object store client to read bills"
    );

    let scan = ScanTask::spawn(store.clone(), repository, region, shutdown.clone());
    let manifests = spawn_manifest_fetches(store.clone(), scan, shutdown.clone());
    let (mut items, dispatch) = spawn_report_readers(store, manifests, shutdown);

    let mut stats = IngestStats::default();
    while let Some(item) = items.recv().await {
        stats.line_items += 1;
        let _ = sink.deliver(item);
    }

    // The dispatcher finishes before the merged item stream closes.
    if let Ok((manifests, report_keys)) = dispatch.await {
        stats.manifests = manifests;
        stats.report_keys = report_keys;
    }
    Ok(stats)
}

/// Fan out one manifest fetch per manifest-shaped key, merged into a
/// single manifest stream.
fn spawn_manifest_fetches(
    store: Arc<dyn BillStore>,
    mut scan: ScanTask,
    shutdown: CancellationToken,
) -> mpsc::Receiver<Manifest> {
    let (merge, rx) = FanIn::new(16);
    tokio::spawn(async move {
        while let Some(bill_key) = scan.rx.recv().await {
            if shutdown.is_cancelled() {
                return;
            }
            if !is_manifest_key(&bill_key.key) {
                continue;
            }
            debug!(key = %bill_key.key, "Found manifest key");
            merge.add(FetchTask::spawn(store.clone(), bill_key));
        }
    });
    rx
}

/// Fan out one reader per report key of every manifest, merged into a
/// single line-item stream. The handle resolves to (manifests seen,
/// report keys fanned out).
fn spawn_report_readers(
    store: Arc<dyn BillStore>,
    mut manifests: mpsc::Receiver<Manifest>,
    shutdown: CancellationToken,
) -> (mpsc::Receiver<LineItem>, JoinHandle<(usize, usize)>) {
    let (merge, rx) = FanIn::new(64);
    let handle = tokio::spawn(async move {
        let mut manifest_count = 0usize;
        let mut report_count = 0usize;
        while let Some(manifest) = manifests.recv().await {
            if shutdown.is_cancelled() {
                break;
            }
            manifest_count += 1;
            debug!(
                report = %manifest.report_name,
                keys = manifest.report_keys.len(),
                "Ingesting bills for manifest"
            );
            let manifest = Arc::new(manifest);
            for key in &manifest.report_keys {
                report_count += 1;
                merge.add(ReportReader::spawn(
                    store.clone(),
                    key.clone(),
                    manifest.clone(),
                    &shutdown,
                ));
            }
        }
        (manifest_count, report_count)
    });
    (rx, handle)
}
