use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::app::ports::{ObjectMeta, ObjectStoragePort, PresignedRequest};
use crate::error::{QuickpitchError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Filesystem object storage for local runs.
///
/// Upload credentials are URLs into this service's own `PUT /uploads/...`
/// route, signed with HMAC-SHA256 over method, bucket, key and expiry. Objects
/// land under `{root}/{bucket}/{key}`.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
    key: Vec<u8>,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>, signing_key: &[u8]) -> Result<Self> {
        if signing_key.is_empty() {
            return Err(QuickpitchError::Config(
                "local storage signing key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            key: signing_key.to_vec(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if !is_safe_segment(bucket) || !is_safe_segment(key) {
            return Err(QuickpitchError::storage(format!(
                "invalid object location {bucket}/{key}"
            )));
        }
        Ok(self.root.join(bucket).join(key))
    }

    fn signature(&self, method: &str, bucket: &str, key: &str, expires: i64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| QuickpitchError::internal("failed to initialize hmac"))?;
        mac.update(format!("{method}\n{bucket}/{key}\n{expires}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks a signed upload URL's query against `now`.
    pub fn verify_upload(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expires {
            return false;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(format!("PUT\n{bucket}/{key}\n{expires}").as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    /// Stores an uploaded body, replacing any previous object.
    pub async fn write_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(ObjectMeta {
            key: key.to_string(),
            size: Some(bytes.len() as u64),
            etag: None,
            content_type: None,
        })
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[async_trait]
impl ObjectStoragePort for LocalObjectStorage {
    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedRequest> {
        self.object_path(bucket, key)?;
        let now = Utc::now();
        let expires = now.timestamp() + ttl.as_secs() as i64;
        let sig = self.signature("PUT", bucket, key, expires)?;
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| QuickpitchError::internal("upload expiry out of range"))?;
        Ok(PresignedRequest {
            url: format!(
                "{}/uploads/{bucket}/{key}?expires={expires}&sig={sig}",
                self.public_base_url
            ),
            method: "PUT".to_string(),
            expires_at,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: Some(meta.len()),
                etag: None,
                content_type: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QuickpitchError::storage(format!(
                "failed to stat {}: {e}",
                path.display()
            ))),
        }
    }
}
