//! Input resolution: turn a [`DocumentReference`] into the PDF's bytes.
//!
//! Three kinds of reference exist — inline bytes, a local path, a remote
//! `scheme://bucket/key` object — and they are dispatched exactly once, here.
//! Everything downstream works on a plain byte buffer.
//!
//! No retries happen at this layer. A failed resolve ends the request;
//! transient-network retry belongs to the object-store client if anywhere.

use crate::error::Pdf2McqError;
use crate::storage::ObjectStore;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Caller-supplied pointer to the source PDF. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentReference {
    /// The PDF bytes themselves.
    Bytes(Vec<u8>),
    /// A file on the local filesystem.
    LocalPath(PathBuf),
    /// An object in remote storage, `scheme://bucket/key`.
    RemoteUri(String),
}

impl fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentReference::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            DocumentReference::LocalPath(p) => f.debug_tuple("LocalPath").field(p).finish(),
            DocumentReference::RemoteUri(u) => f.debug_tuple("RemoteUri").field(u).finish(),
        }
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentReference::Bytes(b) => write!(f, "<{} inline bytes>", b.len()),
            DocumentReference::LocalPath(p) => write!(f, "{}", p.display()),
            DocumentReference::RemoteUri(u) => f.write_str(u),
        }
    }
}

impl DocumentReference {
    pub fn bytes(payload: impl Into<Vec<u8>>) -> Self {
        DocumentReference::Bytes(payload.into())
    }

    pub fn local_path(path: impl Into<PathBuf>) -> Self {
        DocumentReference::LocalPath(path.into())
    }

    pub fn remote_uri(uri: impl Into<String>) -> Self {
        DocumentReference::RemoteUri(uri.into())
    }

    /// Interpret a boundary string: `scheme://…` is remote, anything else a path.
    ///
    /// Only the shape is classified here; a remote URI is fully validated
    /// when it is resolved.
    pub fn parse(input: &str) -> Result<Self, Pdf2McqError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Pdf2McqError::InvalidReference {
                input: input.to_string(),
                reason: "empty reference".into(),
            });
        }
        if is_uri(trimmed) {
            Ok(DocumentReference::RemoteUri(trimmed.to_string()))
        } else {
            Ok(DocumentReference::LocalPath(PathBuf::from(trimmed)))
        }
    }

    /// Short label for logs and progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentReference::Bytes(_) => "bytes",
            DocumentReference::LocalPath(_) => "local_path",
            DocumentReference::RemoteUri(_) => "remote_uri",
        }
    }
}

/// Check if the input string looks like a `scheme://` URI.
pub fn is_uri(input: &str) -> bool {
    RE_SCHEME.is_match(input)
}

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

static RE_REMOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://([^/]+)/(.+)$").unwrap());

/// A validated `scheme://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub scheme: String,
    pub bucket: String,
    /// Object key; may itself contain `/`.
    pub key: String,
}

impl RemoteLocation {
    /// Parse `scheme://bucket/key`; bucket and key must both be non-empty.
    pub fn parse(uri: &str) -> Result<Self, Pdf2McqError> {
        let invalid = |reason: &str| Pdf2McqError::InvalidReference {
            input: uri.to_string(),
            reason: reason.to_string(),
        };

        if !is_uri(uri) {
            return Err(invalid("expected scheme://bucket/key"));
        }
        let caps = RE_REMOTE
            .captures(uri)
            .ok_or_else(|| invalid("expected scheme://bucket/key with a non-empty bucket and key"))?;

        Ok(RemoteLocation {
            scheme: caps[1].to_string(),
            bucket: caps[2].to_string(),
            key: caps[3].to_string(),
        })
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Where the object store comes from when a remote reference is resolved.
///
/// The store is only requested once a URI has been validated and its scheme
/// accepted, so a malformed or foreign URI never triggers client construction
/// or network access.
#[async_trait::async_trait]
pub trait ObjectStoreSource: Send + Sync {
    async fn object_store(&self) -> Result<std::sync::Arc<dyn ObjectStore>, Pdf2McqError>;

    /// Whether the store this source hands out serves `scheme`.
    fn serves(&self, scheme: &str) -> bool;
}

#[async_trait::async_trait]
impl ObjectStoreSource for std::sync::Arc<dyn ObjectStore> {
    async fn object_store(&self) -> Result<std::sync::Arc<dyn ObjectStore>, Pdf2McqError> {
        Ok(std::sync::Arc::clone(self))
    }

    fn serves(&self, scheme: &str) -> bool {
        ObjectStore::serves(self.as_ref(), scheme)
    }
}

/// Resolve a reference to the document bytes.
pub async fn resolve(
    reference: DocumentReference,
    stores: &dyn ObjectStoreSource,
) -> Result<Vec<u8>, Pdf2McqError> {
    match reference {
        DocumentReference::Bytes(payload) => {
            debug!("Using {} inline bytes", payload.len());
            Ok(payload)
        }
        DocumentReference::LocalPath(path) => resolve_local(path).await,
        DocumentReference::RemoteUri(uri) => {
            let location = RemoteLocation::parse(&uri)?;
            if !stores.serves(&location.scheme) {
                return Err(Pdf2McqError::InvalidReference {
                    input: uri,
                    reason: format!("unsupported scheme '{}'", location.scheme),
                });
            }
            let store = stores.object_store().await?;
            fetch_remote(&location, store.as_ref()).await
        }
    }
}

/// Read a local file fully into memory.
async fn resolve_local(path: PathBuf) -> Result<Vec<u8>, Pdf2McqError> {
    if path.as_os_str().is_empty() {
        return Err(Pdf2McqError::InvalidReference {
            input: String::new(),
            reason: "empty path".into(),
        });
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Pdf2McqError::NotFound { path }),
        Err(source) => Err(Pdf2McqError::Io { path, source }),
    }
}

/// Fetch through the object-store collaborator, wrapping any failure.
async fn fetch_remote(
    location: &RemoteLocation,
    store: &dyn ObjectStore,
) -> Result<Vec<u8>, Pdf2McqError> {
    info!("Fetching {} via {}", location, store.name());

    let bytes = store
        .fetch(&location.bucket, &location.key)
        .await
        .map_err(|source| Pdf2McqError::RemoteFetch {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            source,
        })?;

    info!("Fetched {} bytes from {}", bytes.len(), location);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStoreError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MapStore {
        objects: HashMap<(String, String), Vec<u8>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ObjectStore for MapStore {
        async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| ObjectStoreError::not_found(format!("NoSuchKey: {key}")))
        }
    }

    fn store_with(bucket: &str, key: &str, data: &[u8]) -> Arc<MapStore> {
        let mut s = MapStore::default();
        s.objects
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        Arc::new(s)
    }

    #[test]
    fn test_is_uri() {
        assert!(is_uri("s3://bucket/key.pdf"));
        assert!(is_uri("gs://b/k"));
        assert!(!is_uri("/tmp/doc.pdf"));
        assert!(!is_uri("doc.pdf"));
        assert!(!is_uri("C:\\docs\\doc.pdf"));
        assert!(!is_uri(""));
    }

    #[test]
    fn parse_remote_location() {
        let loc = RemoteLocation::parse("s3://lectures/cardio/heart.pdf").unwrap();
        assert_eq!(loc.scheme, "s3");
        assert_eq!(loc.bucket, "lectures");
        assert_eq!(loc.key, "cardio/heart.pdf");
        assert_eq!(loc.to_string(), "s3://lectures/cardio/heart.pdf");
    }

    #[test]
    fn malformed_remote_locations_are_rejected() {
        for bad in [
            "s3://bucket",
            "s3://bucket/",
            "s3:///key.pdf",
            "s3://",
            "://bucket/key",
            "bucket/key",
        ] {
            let err = RemoteLocation::parse(bad).unwrap_err();
            assert!(
                matches!(err, Pdf2McqError::InvalidReference { .. }),
                "{bad}: {err:?}"
            );
        }
    }

    #[test]
    fn parse_reference_kinds() {
        assert_eq!(
            DocumentReference::parse("s3://b/k.pdf").unwrap(),
            DocumentReference::remote_uri("s3://b/k.pdf")
        );
        assert_eq!(
            DocumentReference::parse("./notes/heart.pdf").unwrap(),
            DocumentReference::local_path("./notes/heart.pdf")
        );
        assert!(DocumentReference::parse("   ").is_err());
    }

    #[tokio::test]
    async fn bytes_resolve_unchanged() {
        let payload = b"%PDF-1.7 arbitrary \x00\xff bytes".to_vec();
        let store: Arc<dyn ObjectStore> = Arc::new(MapStore::default());
        let out = resolve(DocumentReference::bytes(payload.clone()), &store)
            .await
            .unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let store: Arc<dyn ObjectStore> = Arc::new(MapStore::default());
        let err = resolve(
            DocumentReference::local_path("/definitely/not/here.pdf"),
            &store,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2McqError::NotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn local_file_is_read_fully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(MapStore::default());
        let out = resolve(DocumentReference::local_path(&path), &store)
            .await
            .unwrap();
        assert_eq!(out, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn reading_a_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MapStore::default());
        let err = resolve(DocumentReference::local_path(dir.path()), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2McqError::Io { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn remote_fetch_goes_through_store() {
        let store = store_with("lectures", "cardio/heart.pdf", b"%PDF-remote");
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let out = resolve(
            DocumentReference::remote_uri("s3://lectures/cardio/heart.pdf"),
            &dyn_store,
        )
        .await
        .unwrap();
        assert_eq!(out, b"%PDF-remote");
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_failure_is_wrapped_with_location() {
        let store: Arc<dyn ObjectStore> = Arc::new(MapStore::default());
        let err = resolve(DocumentReference::remote_uri("s3://b/missing.pdf"), &store)
            .await
            .unwrap_err();
        match err {
            Pdf2McqError::RemoteFetch {
                bucket,
                key,
                source,
            } => {
                assert_eq!(bucket, "b");
                assert_eq!(key, "missing.pdf");
                assert!(source.is_not_found());
            }
            other => panic!("expected RemoteFetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_uri_never_reaches_store() {
        let store = Arc::new(MapStore::default());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        for bad in ["s3://bucket-only", "s3:///key", "s3://bucket/"] {
            let err = resolve(DocumentReference::remote_uri(bad), &dyn_store)
                .await
                .unwrap_err();
            assert!(matches!(err, Pdf2McqError::InvalidReference { .. }));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn foreign_scheme_never_reaches_store() {
        let store = store_with("example.com", "papers/x.pdf", b"%PDF-wrong-object");
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        for uri in ["https://example.com/papers/x.pdf", "gs://example.com/papers/x.pdf"] {
            let reference = DocumentReference::parse(uri).unwrap();
            let err = resolve(reference, &dyn_store).await.unwrap_err();
            match err {
                Pdf2McqError::InvalidReference { input, reason } => {
                    assert_eq!(input, uri);
                    assert!(reason.contains("unsupported scheme"), "{reason}");
                }
                other => panic!("expected InvalidReference, got {other:?}"),
            }
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scheme_check_ignores_case() {
        let store: Arc<dyn ObjectStore> = store_with("b", "k.pdf", b"%PDF-ok");
        let out = resolve(DocumentReference::remote_uri("S3://b/k.pdf"), &store)
            .await
            .unwrap();
        assert_eq!(out, b"%PDF-ok");
    }
}
