//! Manifest discovery and fetching.
//!
//! A Cost and Usage export delivers a small JSON manifest per billing
//! period naming the compressed report part-files. Manifest keys are
//! recognized structurally (date-range directory plus `-Manifest.json`
//! suffix) among whatever else shares the bucket.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::sync::mpsc;
use tracing::error;

use crate::config::MAX_MANIFEST_SIZE;
use crate::error::{FetchSnafu, ManifestError, ParseSnafu};
use crate::scan::BillKey;
use crate::store::BillStore;

/// Matches keys which look like Cost and Usage manifest keys, e.g.
/// `reports/20210101-20210201/nightly-Manifest.json`.
static MANIFEST_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/\d{8}-\d{8}/[^/]+-Manifest\.json$").expect("Invalid manifest key pattern")
});

/// Whether a key is shaped like a Cost and Usage manifest object.
pub fn is_manifest_key(key: &str) -> bool {
    MANIFEST_KEY_PATTERN.is_match(key)
}

/// Descriptor of one billing period's report part-files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    /// Bucket the manifest was actually fetched from. Stamped after
    /// download; the manifest body's own `bucket` field names the storage
    /// bucket, which is not necessarily the operational source bucket.
    pub source_bucket: String,
    pub bucket: String,
    pub report_keys: Vec<String>,
    pub compression: String,
    pub report_name: String,
    pub account: String,
}

/// Background fetch of a single manifest object.
pub(crate) struct FetchTask;

impl FetchTask {
    /// Spawn a fetch for the manifest at `bill_key`.
    ///
    /// The returned receiver yields the parsed manifest, or closes empty
    /// when the download or parse fails; either failure drops this
    /// manifest only.
    pub(crate) fn spawn(store: Arc<dyn BillStore>, bill_key: BillKey) -> mpsc::Receiver<Manifest> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            match Self::fetch(store.as_ref(), &bill_key).await {
                Ok(manifest) => {
                    let _ = tx.send(manifest).await;
                }
                Err(err) => error!(key = %bill_key.key, "Failed to ingest usage and cost manifest: {err}"),
            }
        });
        rx
    }

    async fn fetch(store: &dyn BillStore, bill_key: &BillKey) -> Result<Manifest, ManifestError> {
        let mut buf = vec![0u8; MAX_MANIFEST_SIZE];
        let n = store
            .download_into(&bill_key.bucket, &bill_key.key, &mut buf)
            .await
            .context(FetchSnafu {
                bucket: bill_key.bucket.clone(),
                key: bill_key.key.clone(),
            })?;

        let mut manifest: Manifest =
            serde_json::from_slice(&buf[..n]).context(ParseSnafu {
                bucket: bill_key.bucket.clone(),
                key: bill_key.key.clone(),
            })?;
        manifest.source_bucket = bill_key.bucket.clone();
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn bill_key(bucket: &str, key: &str) -> BillKey {
        BillKey {
            region: "us-east-1".to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            last_modified: None,
        }
    }

    #[test]
    fn classifies_manifest_keys() {
        assert!(is_manifest_key(
            "exports/20210101-20210201/nightly-Manifest.json"
        ));
        assert!(is_manifest_key(
            "a/very/deep/prefix/20191201-20200101/x-Manifest.json"
        ));
    }

    #[test]
    fn rejects_non_manifest_keys() {
        // Wrong case.
        assert!(!is_manifest_key(
            "exports/20210101-20210201/x-manifest.json"
        ));
        // Wrong date shape.
        assert!(!is_manifest_key("exports/2021-01-01/x-Manifest.json"));
        // Data files.
        assert!(!is_manifest_key(
            "exports/20210101-20210201/data/part-0001.csv.gz"
        ));
        // Suffix must anchor at the end of the key.
        assert!(!is_manifest_key(
            "exports/20210101-20210201/x-Manifest.json.bak"
        ));
        // The date directory must be a full path segment.
        assert!(!is_manifest_key("20210101-20210201/x-Manifest.json"));
    }

    #[test]
    fn parses_wire_shape_with_defaults() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "bucket": "storage",
                "reportKeys": ["a/part-1.csv.gz", "a/part-2.csv.gz"],
                "compression": "GZIP",
                "reportName": "nightly",
                "account": "123456789012"
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.bucket, "storage");
        assert_eq!(manifest.report_keys.len(), 2);
        assert_eq!(manifest.compression, "GZIP");
        // Not present in the body; stamped after fetch.
        assert_eq!(manifest.source_bucket, "");
    }

    #[tokio::test]
    async fn fetch_stamps_source_bucket() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        store.put_object(
            "bills",
            "exports/20210101-20210201/nightly-Manifest.json",
            r#"{"bucket":"storage","reportKeys":["k"],"compression":"GZIP","reportName":"nightly","account":"1"}"#,
        );

        let mut rx = FetchTask::spawn(
            store,
            bill_key("bills", "exports/20210101-20210201/nightly-Manifest.json"),
        );
        let manifest = rx.recv().await.unwrap();

        assert_eq!(manifest.source_bucket, "bills");
        assert_eq!(manifest.bucket, "storage");
    }

    #[tokio::test]
    async fn oversized_manifest_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");

        // Valid JSON, but larger than the fixed download buffer: the
        // truncated body cannot parse.
        let keys: Vec<String> = (0..4000).map(|i| format!("reports/part-{i:05}.csv.gz")).collect();
        let body = serde_json::to_vec(&Manifest {
            report_keys: keys,
            compression: "GZIP".to_string(),
            ..Manifest::default()
        })
        .unwrap();
        assert!(body.len() > MAX_MANIFEST_SIZE);
        store.put_object("bills", "exports/20210101-20210201/big-Manifest.json", body);

        let mut rx = FetchTask::spawn(
            store,
            bill_key("bills", "exports/20210101-20210201/big-Manifest.json"),
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn missing_manifest_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");

        let mut rx = FetchTask::spawn(
            store,
            bill_key("bills", "exports/20210101-20210201/gone-Manifest.json"),
        );
        assert!(rx.recv().await.is_none());
    }
}
