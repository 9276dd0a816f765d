//! Report part-file reader: decompress and decode one report key.
//!
//! Each report key referenced by a manifest gets its own reader task and
//! its own cancellation scope. A non-final (interim) export is detected
//! by its blank invoice ids and cancels just that stream; sibling report
//! streams are never affected.

use std::io::Read;
use std::sync::Arc;

use futures::StreamExt;
use snafu::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{DecodeSnafu, FetchBodySnafu, HeaderSnafu, ReadError, UnsupportedCompressionSnafu};
use crate::manifest::Manifest;
use crate::record::{LineItem, RecordDecoder};
use crate::store::BillStore;

/// Decompression strategy named by a manifest's compression tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compression {
    Gzip,
}

impl Compression {
    /// Select the strategy for a manifest's compression tag. Anything but
    /// gzip is unsupported and fails fast with zero records for that key.
    pub(crate) fn from_tag(tag: &str) -> Result<Self, ReadError> {
        match tag {
            "GZIP" => Ok(Self::Gzip),
            other => UnsupportedCompressionSnafu { compression: other }.fail(),
        }
    }

    /// Wrap a report body in a decompressing reader.
    pub(crate) fn reader<'a>(&self, body: &'a [u8]) -> Box<dyn Read + Send + 'a> {
        match self {
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(body)),
        }
    }
}

/// How a report stream ended. Every variant releases the stream's
/// resources the same way (by dropping them) and none is pipeline-fatal.
enum ReadOutcome {
    /// End of data.
    Completed { rows: usize },
    /// A blank invoice id marked the export as non-final.
    CanceledIncomplete { rows: usize },
    /// The caller's shutdown signal fired.
    Canceled,
}

/// Background reader for one report key.
pub(crate) struct ReportReader;

impl ReportReader {
    /// Spawn a reader for `key` and return its line-item stream.
    ///
    /// The stream gets its own cancellation scope derived from `shutdown`
    /// so that interim-report cancellation cannot touch sibling streams.
    pub(crate) fn spawn(
        store: Arc<dyn BillStore>,
        key: String,
        manifest: Arc<Manifest>,
        shutdown: &CancellationToken,
    ) -> mpsc::Receiver<LineItem> {
        let (tx, rx) = mpsc::channel(64);
        let token = shutdown.child_token();
        tokio::spawn(async move {
            match Self::run(store, &key, &manifest, &token, tx).await {
                Ok(ReadOutcome::Completed { rows }) => {
                    debug!(key = %key, rows, "Finished reading bill report part");
                }
                Ok(ReadOutcome::CanceledIncomplete { rows }) => {
                    info!(
                        key = %key,
                        report = %manifest.report_name,
                        rows,
                        "Canceled non-final report import"
                    );
                }
                Ok(ReadOutcome::Canceled) => {}
                Err(err) => error!(key = %key, "Failed to read bill report part: {err}"),
            }
        });
        rx
    }

    async fn run(
        store: Arc<dyn BillStore>,
        key: &str,
        manifest: &Manifest,
        token: &CancellationToken,
        tx: mpsc::Sender<LineItem>,
    ) -> Result<ReadOutcome, ReadError> {
        let codec = Compression::from_tag(&manifest.compression)?;

        debug!(key = %key, report = %manifest.report_name, "Reading bill report part");
        let Some(body) = Self::fetch_body(store.as_ref(), &manifest.bucket, key, token)
            .await
            .context(FetchBodySnafu {
                bucket: manifest.bucket.clone(),
                key,
            })?
        else {
            return Ok(ReadOutcome::Canceled);
        };

        let mut rows = csv::Reader::from_reader(codec.reader(&body));
        let header = rows.headers().context(HeaderSnafu { key })?.clone();
        let decoder = RecordDecoder::from_header(&header);

        let mut emitted = 0usize;
        let mut raw = csv::StringRecord::new();
        loop {
            if token.is_cancelled() {
                return Ok(ReadOutcome::Canceled);
            }
            if !rows.read_record(&mut raw).context(DecodeSnafu { key })? {
                return Ok(ReadOutcome::Completed { rows: emitted });
            }

            let item = decoder.decode(&raw);
            if item.invoice_id.is_empty() {
                // This export is still in progress; a final export will
                // supersede it. Stop this stream only.
                token.cancel();
                return Ok(ReadOutcome::CanceledIncomplete { rows: emitted });
            }

            tokio::select! {
                _ = token.cancelled() => return Ok(ReadOutcome::Canceled),
                sent = tx.send(item) => {
                    if sent.is_err() {
                        return Ok(ReadOutcome::Canceled);
                    }
                    emitted += 1;
                }
            }
        }
    }

    /// Retrieve the full report body, observing the stream's cancellation
    /// token between chunks. Returns `None` when canceled mid-transfer.
    async fn fetch_body(
        store: &dyn BillStore,
        bucket: &str,
        key: &str,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, crate::error::StoreError> {
        let mut stream = store.get_stream(bucket, key).await?;
        let mut body = Vec::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(None),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => body.extend_from_slice(&bytes),
                    Some(Err(err)) => return Err(err),
                    None => return Ok(Some(body)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;

    fn make_gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn manifest(bucket: &str, compression: &str, keys: &[&str]) -> Arc<Manifest> {
        Arc::new(Manifest {
            source_bucket: bucket.to_string(),
            bucket: bucket.to_string(),
            report_keys: keys.iter().map(|key| key.to_string()).collect(),
            compression: compression.to_string(),
            report_name: "nightly".to_string(),
            account: "123456789012".to_string(),
        })
    }

    async fn collect(mut rx: mpsc::Receiver<LineItem>) -> Vec<LineItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    const CSV_HEADER: &str = "identity/LineItemId,bill/InvoiceId,lineItem/ProductCode";

    #[test]
    fn gzip_is_the_only_supported_tag() {
        assert_eq!(Compression::from_tag("GZIP").unwrap(), Compression::Gzip);
        assert!(matches!(
            Compression::from_tag("ZIP"),
            Err(ReadError::UnsupportedCompression { .. })
        ));
        assert!(matches!(
            Compression::from_tag("gzip"),
            Err(ReadError::UnsupportedCompression { .. })
        ));
    }

    #[test]
    fn gzip_reader_roundtrip() {
        let compressed = make_gzip(b"hello,world\n");
        let mut decoded = String::new();
        Compression::Gzip
            .reader(&compressed)
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello,world\n");
    }

    #[tokio::test]
    async fn reads_every_row_of_a_final_report() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        let body = format!("{CSV_HEADER}\nli-1,INV-1,AmazonEC2\nli-2,INV-1,AmazonS3\n");
        store.put_object("bills", "part-1.csv.gz", make_gzip(body.as_bytes()));

        let rx = ReportReader::spawn(
            store,
            "part-1.csv.gz".to_string(),
            manifest("bills", "GZIP", &["part-1.csv.gz"]),
            &CancellationToken::new(),
        );
        let items = collect(rx).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].line_item_id, "li-1");
        assert_eq!(items[1].product_code, "AmazonS3");
    }

    #[tokio::test]
    async fn interim_report_stops_before_the_blank_invoice_row() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        let body = format!(
            "{CSV_HEADER}\nli-1,INV-1,AmazonEC2\nli-2,INV-1,AmazonS3\nli-3,,AmazonRDS\nli-4,INV-1,AmazonEC2\n"
        );
        store.put_object("bills", "part-1.csv.gz", make_gzip(body.as_bytes()));

        let rx = ReportReader::spawn(
            store,
            "part-1.csv.gz".to_string(),
            manifest("bills", "GZIP", &["part-1.csv.gz"]),
            &CancellationToken::new(),
        );
        let items = collect(rx).await;

        // Rows from the blank invoice id onwards are dropped, including
        // the triggering row.
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| !item.invoice_id.is_empty()));
    }

    #[tokio::test]
    async fn unsupported_compression_yields_no_records() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        store.put_object("bills", "part-1.csv.zip", b"irrelevant".as_slice());

        let rx = ReportReader::spawn(
            store,
            "part-1.csv.zip".to_string(),
            manifest("bills", "ZIP", &["part-1.csv.zip"]),
            &CancellationToken::new(),
        );
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_body_yields_no_records() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        store.put_object("bills", "part-1.csv.gz", b"not gzip at all".as_slice());

        let rx = ReportReader::spawn(
            store,
            "part-1.csv.gz".to_string(),
            manifest("bills", "GZIP", &["part-1.csv.gz"]),
            &CancellationToken::new(),
        );
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn canceled_shutdown_stops_the_stream() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("bills", "us-east-1");
        let body = format!("{CSV_HEADER}\nli-1,INV-1,AmazonEC2\n");
        store.put_object("bills", "part-1.csv.gz", make_gzip(body.as_bytes()));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let rx = ReportReader::spawn(
            store,
            "part-1.csv.gz".to_string(),
            manifest("bills", "GZIP", &["part-1.csv.gz"]),
            &shutdown,
        );
        assert!(collect(rx).await.is_empty());
    }
}
