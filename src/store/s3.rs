//! S3-backed bill store.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use chrono::DateTime;
use futures::StreamExt;

use crate::credentials::SessionCredentials;
use crate::error::StoreError;

use super::{BillStore, ListPage, ListedObject, ObjectStream, StoreProvider};

/// Region used for probe clients before the bucket's region is known.
/// GetBucketLocation also reports this region as an empty constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Bill store backed by an S3 client bound to one region.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BillStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix);
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|err| StoreError::List {
            bucket: bucket.to_string(),
            message: DisplayErrorContext(&err).to_string(),
        })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| ListedObject {
                    key: key.to_string(),
                    last_modified: object
                        .last_modified()
                        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())),
                })
            })
            .collect();

        Ok(ListPage {
            objects,
            continuation: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn download_into(
        &self,
        bucket: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, StoreError> {
        if buf.is_empty() {
            return Ok(0);
        }

        // A ranged read keeps the transfer within the buffer's bound even
        // when the object is larger.
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes=0-{}", buf.len() - 1))
            .send()
            .await
            .map_err(|err| StoreError::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| StoreError::Body {
                message: err.to_string(),
            })?
            .into_bytes();

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    async fn get_stream(&self, bucket: &str, key: &str) -> Result<ObjectStream, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StoreError::OpenObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        let stream = futures::stream::unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), body)),
                Ok(None) => None,
                Err(err) => Some((
                    Err(StoreError::Body {
                        message: err.to_string(),
                    }),
                    body,
                )),
            }
        });

        Ok(stream.boxed())
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String, StoreError> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| StoreError::BucketLocation {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        let region = output
            .location_constraint()
            .map(|constraint| constraint.as_str().to_string())
            .filter(|constraint| !constraint.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(region)
    }
}

/// Builds region-bound [`S3Store`] clients from session credentials.
pub struct S3StoreProvider;

#[async_trait]
impl StoreProvider for S3StoreProvider {
    async fn connect(
        &self,
        credentials: &SessionCredentials,
        region: Option<&str>,
    ) -> Result<Arc<dyn BillStore>, StoreError> {
        let session = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            None,
            "hail-session",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(session)
            .region(Region::new(
                region.unwrap_or(DEFAULT_REGION).to_string(),
            ))
            .load()
            .await;

        Ok(Arc::new(S3Store::new(aws_sdk_s3::Client::new(&config))))
    }
}
