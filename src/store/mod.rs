//! Object store abstraction for bill repositories.
//!
//! The pipeline talks to storage through the [`BillStore`] trait so the
//! same code runs against S3 in production and the in-memory backend in
//! tests. A [`StoreProvider`] turns session credentials into a
//! region-bound client; the region itself comes from
//! [`BillStore::bucket_region`], never from account configuration.

mod memory;
mod s3;

pub use memory::{MemoryStore, MemoryStoreProvider};
pub use s3::{S3Store, S3StoreProvider};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::credentials::SessionCredentials;
use crate::error::StoreError;

/// A chunked object body. Consumers read it chunk by chunk and may drop
/// it early to abandon the transfer.
pub type ObjectStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// One object returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    /// Token for the next page, if the listing was truncated.
    pub continuation: Option<String>,
}

/// Client surface the ingestion pipeline needs from an object store.
///
/// Implementations must be safe for concurrent use; the pipeline shares
/// one client across all of its tasks.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// List one page of objects under `prefix`, resuming from
    /// `continuation` when given.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Download at most `buf.len()` bytes of an object into `buf`,
    /// returning the number of bytes written. Objects larger than the
    /// buffer are truncated transparently.
    async fn download_into(
        &self,
        bucket: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, StoreError>;

    /// Open an object for streaming retrieval.
    async fn get_stream(&self, bucket: &str, key: &str) -> Result<ObjectStream, StoreError>;

    /// Resolve the region a bucket resides in.
    async fn bucket_region(&self, bucket: &str) -> Result<String, StoreError>;
}

/// Binds session credentials to a store client.
///
/// `region: None` yields a probe client suitable only for bucket-location
/// lookup; data calls go through a client bound to the bucket's region.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn connect(
        &self,
        credentials: &SessionCredentials,
        region: Option<&str>,
    ) -> Result<Arc<dyn BillStore>, StoreError>;
}
