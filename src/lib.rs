//! Hail: streaming ingestion of Cost and Usage billing exports.
//!
//! This crate handles:
//! - Scanning a bill repository (bucket + prefix) for manifest objects,
//!   within a fixed key budget
//! - Fetching and parsing Cost and Usage manifests
//! - Decompressing and decoding the gzip CSV report parts they reference
//! - Detecting interim (non-final) exports and canceling just that stream
//! - Fanning every decoded line item into a caller-supplied sink
//!
//! Ingestion is best-effort: below client resolution, a broken manifest
//! or report part is logged and skipped without blocking the rest of a
//! repository.

pub mod config;
pub mod credentials;
pub mod error;
pub mod ingest;
pub mod manifest;
pub mod merge;
pub mod reader;
pub mod record;
pub mod scan;
pub mod store;

// Re-export commonly used items
pub use config::{
    AwsAccount, BillRepository, MAX_CHECKED_KEYS_PER_REPOSITORY, MAX_MANIFEST_SIZE,
    READ_BILLS_SESSION_NAME,
};
pub use credentials::{
    CredentialProvider, SessionCredentials, StaticCredentialProvider, StsCredentialProvider,
};
pub use error::IngestError;
pub use ingest::{IngestStats, LineItemSink, read_bills};
pub use manifest::{Manifest, is_manifest_key};
pub use merge::FanIn;
pub use record::LineItem;
pub use scan::BillKey;
pub use store::{
    BillStore, ListPage, ListedObject, MemoryStore, MemoryStoreProvider, ObjectStream, S3Store,
    S3StoreProvider, StoreProvider,
};
