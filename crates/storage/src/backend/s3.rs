//! S3-compatible object store backend.
//!
//! One bucket at one host. Credentials are supplied per host from the
//! configuration file; the catalog only records the bucket URL.
//!
//! Uploads buffer the whole object and use a single `PutObject`, so an object
//! only becomes visible once every byte has arrived. Media objects are at
//! most a few hundred megabytes, which keeps multipart uploads out of scope.

use crate::backend::ByteStream;
use crate::error::{ErrorKind, Result};
use crate::models::{BackendKind, ObjectStoreCredentials, ObjectStoreLocation, Tags};
use crate::{StorageBackend, path::validate as validate_object_name};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream as SdkByteStream,
    types::{Tag, Tagging},
};
use bytes::BytesMut;
use exn::ResultExt;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible object store backend.
///
/// # Examples
///
/// ```no_run
/// use mediashift_storage::backend::ObjectStoreBackend;
/// use mediashift_storage::{ObjectStoreCredentials, ObjectStoreLocation};
///
/// # async fn example() -> mediashift_storage::error::Result<()> {
/// let location: ObjectStoreLocation = "https://s3.example.org/camera-traps".parse()?;
/// let credentials = ObjectStoreCredentials {
///     region: "eu-central-1".into(),
///     endpoint: None,
///     key_id: "access_key_id".into(),
///     key_secret: "secret_access_key".into(),
/// };
/// let backend = ObjectStoreBackend::new("camera-traps", location, &credentials);
/// backend.validate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    name: String,
    client: Client,
    location: ObjectStoreLocation,
    /// Location string as recorded in the catalog.
    url: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl ObjectStoreBackend {
    pub fn new(name: impl Into<String>, location: ObjectStoreLocation, credentials: &ObjectStoreCredentials) -> Self {
        let credentials_provider = Credentials::new(
            credentials.key_id.clone(),
            credentials.key_secret.clone(),
            None,
            None,
            "mediashift-config",
        );
        let endpoint = credentials.endpoint.clone().unwrap_or_else(|| location.endpoint.clone());
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials_provider)
            .region(Region::new(credentials.region.clone()))
            .endpoint_url(endpoint)
            // Exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services (MinIO, Ceph, etc.)
            .force_path_style(true)
            .build();
        Self {
            name: name.into(),
            client: Client::from_conf(config),
            url: format!("{}/{}", location.endpoint, location.bucket),
            location,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Confirm the bucket exists and the credentials can reach it.
    pub async fn validate(&self) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client.head_bucket().bucket(&self.location.bucket).send().await.map_err(|e| {
            ErrorKind::BackendUnavailable(format!("{}: {}", self.url, DisplayErrorContext(&e)))
        })?;
        Ok(())
    }

    pub fn bucket_location(&self) -> &ObjectStoreLocation {
        &self.location
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }
}

/// Transport failures are retryable network errors; everything else the
/// service answered with is a backend error.
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> ErrorKind
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            ErrorKind::Network(message)
        },
        _ => ErrorKind::BackendError(message),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    fn location(&self) -> &str {
        &self.url
    }

    fn locate(&self, object_name: &str) -> Result<String> {
        Ok(self.location.locate(&validate_object_name(object_name)?))
    }

    async fn exists(&self, object_name: &str) -> Result<bool> {
        let key = validate_object_name(object_name)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.location.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(e) => exn::bail!(map_sdk_error(e)),
        }
    }

    async fn read_stream(&self, object_name: &str) -> Result<ByteStream> {
        let key = validate_object_name(object_name)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.location.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(self.location.locate(&key)))
            },
            Err(e) => exn::bail!(map_sdk_error(e)),
        };
        let stream = futures::stream::try_unfold(output.body, |mut body| async move {
            let chunk = body.try_next().await.map_err(|e| ErrorKind::Network(e.to_string()))?;
            Ok::<_, crate::error::Error>(chunk.map(|bytes| (bytes, body)))
        });
        Ok(Box::pin(stream))
    }

    async fn write_stream(&self, object_name: &str, mut data: ByteStream, size_hint: Option<u64>) -> Result<u64> {
        let key = validate_object_name(object_name)?;
        let mut buffer = BytesMut::with_capacity(size_hint.unwrap_or_default() as usize);
        while let Some(chunk) = data.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        let written = buffer.len() as u64;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.location.bucket)
            .key(&key)
            .content_length(written as i64)
            .body(SdkByteStream::from(buffer.freeze()))
            .send()
            .await
            .map_err(map_sdk_error)?;
        tracing::trace!(backend = %self.name, object = %key, bytes = written, "object uploaded");
        Ok(written)
    }

    async fn remove(&self, object_name: &str) -> Result<()> {
        let key = validate_object_name(object_name)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .delete_object()
            .bucket(&self.location.bucket)
            .key(&key)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn tags_get(&self, object_name: &str) -> Result<Tags> {
        let key = validate_object_name(object_name)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object_tagging().bucket(&self.location.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(e) if e.raw_response().is_some_and(|r| r.status().as_u16() == 404) => {
                exn::bail!(ErrorKind::NotFound(self.location.locate(&key)))
            },
            Err(e) => exn::bail!(map_sdk_error(e)),
        };
        Ok(output.tag_set().iter().map(|tag| (tag.key().to_string(), tag.value().to_string())).collect())
    }

    async fn tags_set(&self, object_name: &str, tags: &Tags) -> Result<()> {
        let key = validate_object_name(object_name)?;
        let tag_set = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .or_raise(|| ErrorKind::BackendError(format!("invalid tags for {key}")))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .or_raise(|| ErrorKind::BackendError(format!("invalid tags for {key}")))?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object_tagging()
            .bucket(&self.location.bucket)
            .key(&key)
            .tagging(tagging)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}
