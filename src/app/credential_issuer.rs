use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::app::ports::{ObjectMeta, ObjectStoragePort};
use crate::error::QuickpitchError;

/// Single-object, single-verb upload authorization handed to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadCredential {
    pub key: String,
    pub url: String,
    pub method: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectPresence {
    Present(ObjectMeta),
    Absent,
}

/// Capability wrapper over object storage. Holds no state and caches nothing.
pub struct CredentialIssuer {
    storage: Arc<dyn ObjectStoragePort>,
    ttl: Duration,
}

impl CredentialIssuer {
    pub fn new(storage: Arc<dyn ObjectStoragePort>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fails only when the storage collaborator is unreachable.
    pub async fn issue_upload_credential(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<UploadCredential, QuickpitchError> {
        let signed = self.storage.presign_put(bucket, key, self.ttl).await?;
        Ok(UploadCredential {
            key: key.to_string(),
            url: signed.url,
            method: signed.method,
            expires_at: signed.expires_at,
        })
    }

    /// Point-in-time existence check. Absence is a normal outcome, not an error.
    pub async fn confirm_object_exists(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectPresence, QuickpitchError> {
        match self.storage.head_object(bucket, key).await? {
            Some(meta) => Ok(ObjectPresence::Present(meta)),
            None => Ok(ObjectPresence::Absent),
        }
    }
}
