//! Mapping from dataset identifiers to range sources.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Client;

use super::{FileRangeSource, HttpRangeSource, MemoryRangeSource, RangeSource, SourceError};

/// Public endpoint for `gs://` objects.
pub const GCS_PUBLIC_ENDPOINT: &str = "https://storage.googleapis.com";

/// Default timeout for a single range request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a dataset identifier into something that can be range-read.
pub trait SourceResolver: Send + Sync {
    /// Resolve `id` into a source.
    fn resolve(&self, id: &str) -> Result<Arc<dyn RangeSource>, SourceError>;
}

/// Resolver for the identifier schemes seen in job records.
///
/// - `http://…`, `https://…` - read directly
/// - `gs://bucket/key` and `/vsigs/bucket/key` - public storage endpoint
/// - anything else - local file path
#[derive(Debug, Clone)]
pub struct DefaultResolver {
    client: Client,
    gcs_endpoint: String,
}

impl DefaultResolver {
    /// Create a resolver with its own HTTP client.
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client))
    }

    /// Create a resolver sharing an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            gcs_endpoint: GCS_PUBLIC_ENDPOINT.to_string(),
        }
    }

    /// Override the endpoint used for `gs://` identifiers.
    pub fn with_gcs_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.gcs_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn bucket_url(&self, id: &str, path: &str) -> Result<String, SourceError> {
        match path.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(format!("{}/{}/{}", self.gcs_endpoint, bucket, key))
            }
            _ => Err(SourceError::InvalidIdentifier(id.to_string())),
        }
    }

    /// The URL an identifier maps to, if it is remote.
    pub fn remote_url(&self, id: &str) -> Result<Option<String>, SourceError> {
        if id.starts_with("http://") || id.starts_with("https://") {
            return Ok(Some(id.to_string()));
        }
        if let Some(path) = id.strip_prefix("gs://") {
            return self.bucket_url(id, path).map(Some);
        }
        if let Some(path) = id.strip_prefix("/vsigs/") {
            return self.bucket_url(id, path).map(Some);
        }
        Ok(None)
    }
}

impl SourceResolver for DefaultResolver {
    fn resolve(&self, id: &str) -> Result<Arc<dyn RangeSource>, SourceError> {
        if id.trim().is_empty() {
            return Err(SourceError::InvalidIdentifier(id.to_string()));
        }
        match self.remote_url(id)? {
            Some(url) => Ok(Arc::new(HttpRangeSource::new(id, url, self.client.clone()))),
            None => Ok(Arc::new(FileRangeSource::new(id))),
        }
    }
}

/// Resolver over a set of in-memory objects.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an object.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(id.into(), data.into());
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(&self, id: &str) -> Result<Arc<dyn RangeSource>, SourceError> {
        let objects = self.objects.read();
        let data = objects
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        Ok(Arc::new(MemoryRangeSource::new(id, data)))
    }
}
