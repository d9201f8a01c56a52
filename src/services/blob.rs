//! Blob storage for profile and request photos.
//!
//! References are opaque strings handed back to clients by `put`. Deletion is always
//! best-effort through `delete_blobs`: the entity write has already committed, so failures
//! are retried when transient and otherwise logged.

use async_trait::async_trait;
use data_encoding::BASE64;
use log::{error, warn};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob storage rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unrecognised blob reference '{0}'")]
    InvalidReference(String),

    #[error("blob storage is not configured: {0}")]
    NotConfigured(&'static str),
}

impl BlobError {
    /// Worth retrying: timeouts, connection failures, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            BlobError::Http(e) => e.is_timeout() || e.is_connect(),
            BlobError::Rejected { status, .. } => *status == 429 || *status >= 500,
            BlobError::Io(e) => matches!(e.kind(), IoErrorKind::Interrupted | IoErrorKind::TimedOut),
            BlobError::InvalidReference(_) | BlobError::NotConfigured(_) => false,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores an image and returns its public reference.
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, BlobError>;
    /// Deleting a reference that no longer exists succeeds.
    async fn delete(&self, reference: &str) -> Result<(), BlobError>;
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        RetryPolicy {
            attempts: config.blob_retry_attempts.max(1),
            base_delay: Duration::from_millis(config.blob_retry_base_ms),
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

async fn delete_with_retry(store: &dyn BlobStore, policy: RetryPolicy, reference: &str) {
    let mut attempt = 1;
    loop {
        match store.delete(reference).await {
            Ok(()) => return,
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.delay_before(attempt);
                warn!(
                    "Blob deletion of '{}' failed (attempt {}), retrying in {:?}: {}",
                    reference, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("Blob deletion of '{}' failed: {}", reference, e);
                return;
            }
        }
    }
}

/// Deletes every non-empty reference, never failing.
pub async fn delete_blobs<I, S>(store: &dyn BlobStore, policy: RetryPolicy, references: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for reference in references {
        let reference = reference.as_ref().trim();
        if reference.is_empty() {
            continue;
        }
        delete_with_retry(store, policy, reference).await;
    }
}

/* ----------------------------- Local disk ----------------------------- */

/// Files under `dir`, served by Rocket's `FileServer` at `public_prefix`.
pub struct LocalBlobStore {
    dir: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: &str) -> Self {
        LocalBlobStore {
            dir: dir.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.upload_dir, &config.public_upload_prefix)
    }

    fn file_name<'a>(&self, reference: &'a str) -> Option<&'a str> {
        let name = reference
            .strip_prefix(self.public_prefix.as_str())?
            .strip_prefix('/')?;
        let safe = !name.is_empty() && !name.contains(['/', '\\']) && !name.starts_with('.');
        safe.then_some(name)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, BlobError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!("{}.{}", Uuid::new_v4(), extension);
        tokio::fs::write(self.dir.join(&name), bytes).await?;

        Ok(format!("{}/{}", self.public_prefix, name))
    }

    async fn delete(&self, reference: &str) -> Result<(), BlobError> {
        let name = self
            .file_name(reference)
            .ok_or_else(|| BlobError::InvalidReference(reference.to_string()))?;

        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/* ----------------------------- Cloudinary ----------------------------- */

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

pub struct CloudinaryBlobStore {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Deserialize)]
struct UploadResult {
    secure_url: String,
}

#[derive(Deserialize)]
struct DestroyResult {
    result: String,
}

/// Cloudinary request signature: sorted `key=value` pairs joined by `&`, followed by the
/// API secret, SHA-256 hex encoded.
pub fn cloudinary_signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Public id of a delivery URL: the path after `/upload/`, minus the version segment and
/// the file extension.
pub fn cloudinary_public_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let (_, after) = path.split_once("/upload/")?;

    let mut segments: Vec<&str> = after.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first().is_some_and(|s| is_version_segment(s)) {
        segments.remove(0);
    }
    let file = segments.pop()?;
    let stem = file.split('.').next().filter(|s| !s.is_empty())?;
    segments.push(stem);
    Some(segments.join("/"))
}

impl CloudinaryBlobStore {
    pub fn from_config(config: &AppConfig) -> Result<Self, BlobError> {
        let cloud_name = config
            .cloudinary_cloud_name
            .clone()
            .ok_or(BlobError::NotConfigured("cloudinary_cloud_name"))?;
        let api_key = config
            .cloudinary_api_key
            .clone()
            .ok_or(BlobError::NotConfigured("cloudinary_api_key"))?;
        let api_secret = config
            .cloudinary_api_secret
            .clone()
            .ok_or(BlobError::NotConfigured("cloudinary_api_secret"))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(CloudinaryBlobStore {
            client,
            cloud_name,
            api_key,
            api_secret,
            folder: config.cloudinary_folder.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", CLOUDINARY_API, self.cloud_name, action)
    }

    async fn post_signed(
        &self,
        action: &str,
        signed: &[(&str, &str)],
        extra: &[(&str, &str)],
    ) -> Result<reqwest::Response, BlobError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = signed.to_vec();
        params.push(("timestamp", timestamp.as_str()));
        let signature = cloudinary_signature(&params, &self.api_secret);

        params.extend_from_slice(extra);
        params.push(("api_key", self.api_key.as_str()));
        params.push(("signature", signature.as_str()));
        params.push(("signature_algorithm", "sha256"));

        let res = self
            .client
            .post(self.endpoint(action))
            .form(&params)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "Cloudinary error".to_string());
            return Err(BlobError::Rejected { status, body });
        }
        Ok(res)
    }
}

#[async_trait]
impl BlobStore for CloudinaryBlobStore {
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, BlobError> {
        let file = format!(
            "data:{};base64,{}",
            content_type_for(extension),
            BASE64.encode(&bytes)
        );
        let res = self
            .post_signed(
                "upload",
                &[("folder", self.folder.as_str())],
                &[("file", file.as_str())],
            )
            .await?;
        Ok(res.json::<UploadResult>().await?.secure_url)
    }

    async fn delete(&self, reference: &str) -> Result<(), BlobError> {
        let public_id = cloudinary_public_id(reference)
            .ok_or_else(|| BlobError::InvalidReference(reference.to_string()))?;

        let res = self
            .post_signed("destroy", &[("public_id", public_id.as_str())], &[])
            .await?;

        match res.json::<DestroyResult>().await?.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(BlobError::Rejected {
                status: 200,
                body: other.to_string(),
            }),
        }
    }
}
