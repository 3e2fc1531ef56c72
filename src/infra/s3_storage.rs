use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{ObjectMeta, ObjectStoragePort, PresignedRequest};
use crate::error::{QuickpitchError, Result};
use crate::infra::sigv4::{uri_encode, AwsCredentials, SigV4Signer};

// HEAD URLs are used immediately; keep their window short
const HEAD_URL_TTL_SECS: u64 = 60;

/// S3 (or S3-compatible) object storage reached through presigned requests.
///
/// Without a custom endpoint, virtual-hosted AWS URLs are used
/// (`https://{bucket}.s3.{region}.amazonaws.com/{key}`); with one, path-style
/// URLs (`{endpoint}/{bucket}/{key}`) for MinIO and friends.
pub struct S3ObjectStorage {
    signer: SigV4Signer,
    client: reqwest::Client,
    region: String,
    endpoint: Option<Url>,
}

impl S3ObjectStorage {
    pub fn new(
        credentials: AwsCredentials,
        region: impl Into<String>,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let region = region.into();
        let endpoint = endpoint
            .map(|e| {
                Url::parse(e).map_err(|err| QuickpitchError::Config(format!("invalid S3 endpoint '{e}': {err}")))
            })
            .transpose()?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            signer: SigV4Signer::new(credentials, region.clone(), "s3"),
            client,
            region,
            endpoint,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        if bucket.is_empty() {
            return Err(QuickpitchError::Config("bucket name is empty".to_string()));
        }
        let key = uri_encode(key, false);
        let raw = match &self.endpoint {
            Some(base) => format!("{}/{bucket}/{key}", base.as_str().trim_end_matches('/')),
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region),
        };
        Url::parse(&raw).map_err(|e| QuickpitchError::storage(format!("invalid object url '{raw}': {e}")))
    }
}

#[async_trait]
impl ObjectStoragePort for S3ObjectStorage {
    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedRequest> {
        let now = Utc::now();
        let url = self.object_url(bucket, key)?;
        let signed = self.signer.presign("PUT", &url, ttl.as_secs(), now)?;
        Ok(PresignedRequest {
            url: signed.to_string(),
            method: "PUT".to_string(),
            expires_at: now + chrono::Duration::seconds(ttl.as_secs() as i64),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let url = self.object_url(bucket, key)?;
        let signed = self.signer.presign("HEAD", &url, HEAD_URL_TTL_SECS, Utc::now())?;
        let resp = self.client.head(signed).send().await?;
        let status = resp.status();
        debug!(bucket = %bucket, key = %key, status = %status, "S3 HEAD object");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            // 403 included: without ListBucket S3 answers 403 for missing keys,
            // but it is indistinguishable from a credential problem
            return Err(QuickpitchError::storage(format!(
                "HEAD {bucket}/{key} returned {status}"
            )));
        }

        let headers = resp.headers();
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size: header(CONTENT_LENGTH).and_then(|s| s.parse().ok()),
            etag: header(ETAG).map(|s| s.trim_matches('"').to_string()),
            content_type: header(CONTENT_TYPE),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(endpoint: Option<&str>) -> S3ObjectStorage {
        S3ObjectStorage::new(
            AwsCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            },
            "ap-south-1",
            endpoint,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_presigned_put_targets_one_key() {
        let s3 = storage(None);
        let signed = s3
            .presign_put("storage-quickpitch", "abc.pdf", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(signed.method, "PUT");
        assert!(signed
            .url
            .starts_with("https://storage-quickpitch.s3.ap-south-1.amazonaws.com/abc.pdf?"));
        assert!(signed.url.contains("X-Amz-Expires=3600"));
        assert!(signed.url.contains("X-Amz-Signature="));
        assert!(signed.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_custom_endpoint_uses_path_style() {
        let s3 = storage(Some("http://localhost:9000"));
        let signed = s3
            .presign_put("pitches", "abc.mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(signed.url.starts_with("http://localhost:9000/pitches/abc.mp4?"));
    }

    #[tokio::test]
    async fn test_empty_bucket_is_rejected() {
        let s3 = storage(None);
        assert!(s3.presign_put("", "abc.mp4", Duration::from_secs(60)).await.is_err());
    }
}
