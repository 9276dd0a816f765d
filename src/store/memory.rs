//! In-memory bill store for tests and local runs.
//!
//! Objects live in per-bucket ordered maps, so listings page in key
//! order like a real bucket. Paging size, listing call counts, and
//! per-object fault injection are exposed for tests that care about
//! request budgets and partial-failure behavior.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;

use crate::credentials::SessionCredentials;
use crate::error::StoreError;

use super::{BillStore, ListPage, ListedObject, ObjectStream, StoreProvider};

/// Chunk size used when streaming object bodies.
const CHUNK_SIZE: usize = 8192;

#[derive(Default)]
struct Buckets {
    objects: HashMap<String, BTreeMap<String, Bytes>>,
    regions: HashMap<String, String>,
}

/// Deterministic in-memory [`BillStore`].
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
    failing: Mutex<HashSet<(String, String)>>,
    page_size: usize,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            page_size: 1000,
            ..Self::default()
        }
    }

    /// Cap listing pages at `page_size` objects.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Create a bucket in the given region.
    pub fn create_bucket(&self, bucket: &str, region: &str) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.objects.entry(bucket.to_string()).or_default();
        buckets
            .regions
            .insert(bucket.to_string(), region.to_string());
    }

    /// Store an object body.
    pub fn put_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .objects
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    /// Make streaming retrieval of one object fail.
    pub fn fail_object(&self, bucket: &str, key: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Number of listing pages served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    fn object(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .objects
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl BillStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .objects
            .get(bucket)
            .ok_or_else(|| StoreError::List {
                bucket: bucket.to_string(),
                message: "no such bucket".to_string(),
            })?;

        let mut page = Vec::with_capacity(self.page_size);
        let mut remainder = false;
        for key in objects.keys().filter(|key| key.starts_with(prefix)) {
            if let Some(after) = continuation {
                if key.as_str() <= after {
                    continue;
                }
            }
            if page.len() == self.page_size {
                remainder = true;
                break;
            }
            page.push(ListedObject {
                key: key.clone(),
                last_modified: Some(Utc::now()),
            });
        }

        let continuation = if remainder {
            page.last().map(|object| object.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: page,
            continuation,
        })
    }

    async fn download_into(
        &self,
        bucket: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, StoreError> {
        let body = self.object(bucket, key)?;
        let n = body.len().min(buf.len());
        buf[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    async fn get_stream(&self, bucket: &str, key: &str) -> Result<ObjectStream, StoreError> {
        let failing = self.failing.lock().unwrap();
        if failing.contains(&(bucket.to_string(), key.to_string())) {
            return Err(StoreError::OpenObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        drop(failing);

        let body = self.object(bucket, key)?;
        let chunks: Vec<Result<Bytes, StoreError>> = (0..body.len())
            .step_by(CHUNK_SIZE)
            .map(|offset| Ok(body.slice(offset..body.len().min(offset + CHUNK_SIZE))))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String, StoreError> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .regions
            .get(bucket)
            .cloned()
            .ok_or_else(|| StoreError::BucketLocation {
                bucket: bucket.to_string(),
                message: "no such bucket".to_string(),
            })
    }
}

/// Provider that hands out the same shared [`MemoryStore`] regardless of
/// credentials or region.
pub struct MemoryStoreProvider {
    store: Arc<MemoryStore>,
}

impl MemoryStoreProvider {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreProvider for MemoryStoreProvider {
    async fn connect(
        &self,
        _credentials: &SessionCredentials,
        _region: Option<&str>,
    ) -> Result<Arc<dyn BillStore>, StoreError> {
        Ok(self.store.clone())
    }
}
