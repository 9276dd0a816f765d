//! Error types for hail using snafu.
//!
//! Each pipeline concern gets its own error enum. Only `IngestError` ever
//! reaches the caller of [`read_bills`](crate::ingest::read_bills); the
//! rest are logged where they occur and absorbed.

use snafu::prelude::*;

// ============ Credential Errors ============

/// Errors that can occur while obtaining temporary credentials.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CredentialError {
    /// The credential provider could not issue session credentials.
    #[snafu(display("Failed to obtain temporary credentials for {role_arn}: {message}"))]
    Temporary { role_arn: String, message: String },
}

// ============ Store Errors ============

/// Errors that can occur talking to the object store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Failed to construct a store client.
    #[snafu(display("Failed to connect to object store: {message}"))]
    Connect { message: String },

    /// Object listing failed.
    #[snafu(display("Failed to list bucket {bucket}: {message}"))]
    List { bucket: String, message: String },

    /// Bounded download failed.
    #[snafu(display("Failed to download {key} from {bucket}: {message}"))]
    Download {
        bucket: String,
        key: String,
        message: String,
    },

    /// Opening an object for streaming retrieval failed.
    #[snafu(display("Failed to open {key} in {bucket}: {message}"))]
    OpenObject {
        bucket: String,
        key: String,
        message: String,
    },

    /// Reading an object body chunk failed mid-stream.
    #[snafu(display("Failed to read object body: {message}"))]
    Body { message: String },

    /// The requested object does not exist.
    #[snafu(display("Object {key} not found in {bucket}"))]
    NotFound { bucket: String, key: String },

    /// Bucket-location lookup failed.
    #[snafu(display("Failed to resolve region for bucket {bucket}: {message}"))]
    BucketLocation { bucket: String, message: String },
}

// ============ Manifest Errors ============

/// Errors that drop a single manifest without affecting its siblings.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ManifestError {
    /// The manifest object could not be downloaded.
    #[snafu(display("Failed to download manifest {key} from {bucket}: {source}"))]
    Fetch {
        bucket: String,
        key: String,
        source: StoreError,
    },

    /// The manifest body is not valid manifest JSON. Bodies larger than the
    /// fixed download buffer arrive truncated and fail here.
    #[snafu(display("Failed to parse manifest {key} from {bucket}: {source}"))]
    Parse {
        bucket: String,
        key: String,
        source: serde_json::Error,
    },
}

// ============ Report Read Errors ============

/// Errors that end a single report-key stream without affecting its siblings.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReadError {
    /// The manifest names a compression scheme this reader does not support.
    #[snafu(display("Unsupported compression scheme {compression:?}"))]
    UnsupportedCompression { compression: String },

    /// The report body could not be retrieved.
    #[snafu(display("Failed to fetch report body {key} from {bucket}: {source}"))]
    FetchBody {
        bucket: String,
        key: String,
        source: StoreError,
    },

    /// The header row could not be read.
    #[snafu(display("Failed to read report header for {key}: {source}"))]
    Header { key: String, source: csv::Error },

    /// A data row failed to decode against the header.
    #[snafu(display("Failed to decode report row in {key}: {source}"))]
    Decode { key: String, source: csv::Error },
}

// ============ Ingest Error (top-level) ============

/// The only error surfaced by `read_bills`: client resolution failures.
/// Everything downstream of a resolved client is best-effort.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// Temporary credentials could not be obtained for the repository's account.
    #[snafu(display("Failed to obtain credentials for bill repository"))]
    Credentials { source: CredentialError },

    /// A region-bound object store client could not be resolved.
    #[snafu(display("Failed to resolve object store client for bill repository"))]
    Resolve { source: StoreError },
}
