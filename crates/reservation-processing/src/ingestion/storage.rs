//! Object storage backends for the raw table.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::error::{PipelineError, Result, ResultExt};
use crate::utils::ensure_parent_dir;

/// Environment variable holding an OAuth bearer token for Cloud Storage.
pub const GCS_TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";

const GCS_ENDPOINT: &str = "https://storage.googleapis.com/storage/v1";

/// A source of named objects grouped in buckets.
pub trait ObjectStore: Send + Sync {
    /// Copy object `name` of `bucket` to `dest`, replacing any existing
    /// file, and return the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Storage`] if the object is missing, access is
    ///   denied or the transfer fails
    /// - [`PipelineError::Io`] if `dest` cannot be written
    fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64>;
}

/// Google Cloud Storage through the JSON API media endpoint.
///
/// Requests carry `Authorization: Bearer $GCS_ACCESS_TOKEN` when the
/// variable is set and are anonymous otherwise. There is no retry.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl GcsObjectStore {
    /// Create a store using the token from the environment, if any.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(GCS_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Self::new(GCS_ENDPOINT, token)
    }

    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    fn object_url(&self, bucket: &str, name: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            PipelineError::InvalidConfig(format!("storage endpoint '{}': {}", self.endpoint, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::InvalidConfig(format!(
                    "storage endpoint '{}' cannot hold a path",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["b", bucket, "o", name]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl ObjectStore for GcsObjectStore {
    fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64> {
        let storage_error = |reason: String| PipelineError::Storage {
            bucket: bucket.to_string(),
            object: name.to_string(),
            reason,
        };

        let url = self.object_url(bucket, name)?;
        debug!(%url, "Requesting object");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| storage_error(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(storage_error("object not found".to_string())),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(storage_error("access denied".to_string()));
            }
            status if !status.is_success() => {
                return Err(storage_error(format!("unexpected status {}", status)));
            }
            _ => {}
        }

        let bytes = response.bytes().map_err(|e| storage_error(e.to_string()))?;
        ensure_parent_dir(dest)?;
        fs::write(dest, &bytes).context(format!("Writing {}", dest.display()))?;
        info!(bucket, object = name, bytes = bytes.len(), "Downloaded object");
        Ok(bytes.len() as u64)
    }
}

/// Objects stored as files at `<root>/<bucket>/<name>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, name: &str) -> PathBuf {
        self.root.join(bucket).join(name)
    }
}

impl ObjectStore for LocalObjectStore {
    fn download(&self, bucket: &str, name: &str, dest: &Path) -> Result<u64> {
        let source = self.object_path(bucket, name);
        if !source.is_file() {
            return Err(PipelineError::Storage {
                bucket: bucket.to_string(),
                object: name.to_string(),
                reason: format!("object not found at {}", source.display()),
            });
        }
        ensure_parent_dir(dest)?;
        let bytes = fs::copy(&source, dest).context(format!("Writing {}", dest.display()))?;
        info!(bucket, object = name, bytes, "Copied object from local store");
        Ok(bytes)
    }
}

static_assertions::assert_impl_all!(GcsObjectStore: Send, Sync);
static_assertions::assert_impl_all!(LocalObjectStore: Send, Sync);
