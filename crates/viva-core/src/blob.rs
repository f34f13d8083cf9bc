//! Blob storage for question prompts and answer recordings.
//!
//! Keys look like `{candidate_id}/bot_q_{index}.mp3` or `{candidate_id}/{uuid}.webm`.
//! `upload` returns the public URL of the stored object.

use crate::error::{InterviewError, InterviewResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use viva_voice::{env_first, env_value};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`. Without `upsert` an existing object is an error.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str, upsert: bool) -> InterviewResult<String>;
}

/// Key segments are limited to `[A-Za-z0-9._-]` and may not be `.` or `..`.
fn validate_key(key: &str) -> InterviewResult<()> {
    let ok = !key.is_empty()
        && key.split('/').all(|seg| {
            !seg.is_empty()
                && seg != "."
                && seg != ".."
                && seg.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        });
    if ok {
        Ok(())
    } else {
        Err(InterviewError::Blob(format!("invalid object key {:?}", key)))
    }
}

/// Files under a local directory, served by the gateway at `{public_base_url}/static/blobs/{key}`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base: format!("{}/static/blobs", public_base_url.trim_end_matches('/')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str, upsert: bool) -> InterviewResult<String> {
        validate_key(key)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InterviewError::Blob(format!("create {}: {}", parent.display(), e)))?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if upsert {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => InterviewError::Blob(format!("object {} already exists", key)),
            _ => InterviewError::Blob(format!("open {}: {}", path.display(), e)),
        })?;
        file.write_all(&bytes)
            .await
            .map_err(|e| InterviewError::Blob(format!("write {}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| InterviewError::Blob(format!("flush {}: {}", path.display(), e)))?;

        tracing::debug!(key, bytes = bytes.len(), "stored local blob");
        Ok(format!("{}/{}", self.public_base, key))
    }
}

/// Supabase Storage over REST (`/storage/v1/object/{bucket}/{key}`), public-bucket URLs.
#[derive(Debug, Clone)]
pub struct SupabaseBlobStore {
    base_url: String,
    service_key: String,
    bucket: String,
    client: reqwest::Client,
}

impl SupabaseBlobStore {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> InterviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InterviewError::Config(format!("blob http client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
            client,
        })
    }

    /// Build from `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY` (or `SUPABASE_KEY`).
    pub fn from_env(bucket: &str) -> InterviewResult<Self> {
        let url = env_value("SUPABASE_URL")
            .ok_or_else(|| InterviewError::Config("SUPABASE_URL not set".to_string()))?;
        let key = env_first(&["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_KEY"])
            .ok_or_else(|| InterviewError::Config("SUPABASE_SERVICE_ROLE_KEY not set".to_string()))?;
        Self::new(&url, &key, bucket)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str, upsert: bool) -> InterviewResult<String> {
        validate_key(key)?;
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("content-type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .map_err(|e| InterviewError::Blob(format!("upload {}: {}", key, e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(InterviewError::Blob(format!("upload {} returned {}: {}", key, status, body)));
        }
        Ok(self.public_url(key))
    }
}
