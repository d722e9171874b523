//! Object-storage boundary for `scheme://bucket/key` document references.
//!
//! The resolver only needs one capability — fetch the bytes of an object —
//! so the trait is deliberately narrow. [`S3ObjectStore`] is the production
//! adapter; tests and embedders can plug in anything implementing
//! [`ObjectStore`].
//!
//! Provider SDK error types never escape this module: every failure is
//! flattened into an [`ObjectStoreError`], which the resolver then wraps with
//! the bucket and key it was asked for.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use std::fmt;
use tracing::{debug, info};

/// URI schemes served by [`S3ObjectStore`].
pub const S3_SCHEMES: &[&str] = &["s3"];

/// A failure reported by an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ObjectStoreError {
    message: String,
    not_found: bool,
}

impl ObjectStoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            not_found: false,
        }
    }

    /// The object (or bucket) does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            not_found: true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.not_found
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fetch-by-location capability over a remote object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the whole object into memory.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// URI schemes this store serves; references with any other scheme are
    /// rejected before [`fetch`](ObjectStore::fetch) is called.
    fn schemes(&self) -> &[&str] {
        S3_SCHEMES
    }

    /// Short name used in logs.
    fn name(&self) -> &str {
        "object-store"
    }

    /// Whether `scheme` (compared case-insensitively) is one of [`schemes`](ObjectStore::schemes).
    fn serves(&self, scheme: &str) -> bool {
        self.schemes().iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

/// S3 (or S3-compatible) object store backed by `aws-sdk-s3`.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore").finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Wrap an already-configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the standard AWS environment
    /// (`AWS_ACCESS_KEY_ID`, `AWS_REGION`, profiles, IMDS, …).
    ///
    /// With `endpoint` set, requests go to that URL with path-style
    /// addressing, which MinIO and most S3-compatible services require.
    pub async fn from_env(endpoint: Option<&str>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(url) = endpoint {
            info!("Using S3-compatible endpoint: {}", url);
            builder = builder.endpoint_url(url).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        debug!("GetObject s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let message = DisplayErrorContext(&e).to_string();
                if missing {
                    ObjectStoreError::not_found(message)
                } else {
                    ObjectStoreError::new(message)
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::new(format!("failed to read object body: {e}")))?;

        Ok(body.into_bytes().to_vec())
    }

    fn schemes(&self) -> &[&str] {
        S3_SCHEMES
    }

    fn name(&self) -> &str {
        "s3"
    }
}
