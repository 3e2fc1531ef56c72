use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::domain::{OwnerId, Submission, SubmissionId, SubmissionStatus};
use crate::error::Result;

// Object storage ports

/// A presigned request allowing exactly one call to one object key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PresignedRequest {
    pub url: String,
    pub method: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStoragePort: Send + Sync {
    /// Signs a `PUT` for `key` valid for `ttl`.
    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedRequest>;

    /// Live metadata lookup. `Ok(None)` means the object does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;
}

// Queue port

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait QueuePort: Send + Sync {
    async fn send(&self, target: &str, payload: Vec<u8>) -> Result<QueueReceipt>;
}

// Datastore port

/// Precondition applied to a status write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusGuard {
    Any,
    CurrentIs(SubmissionStatus),
}

impl StatusGuard {
    pub fn allows(self, current: SubmissionStatus) -> bool {
        match self {
            StatusGuard::Any => true,
            StatusGuard::CurrentIs(expected) => expected == current,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    Applied(Submission),
    /// Guard did not hold; carries the status that was found.
    Skipped(SubmissionStatus),
    Missing,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(&self, submission: &Submission) -> Result<()>;
    async fn get_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<Option<Submission>>;
    /// Unscoped lookup, only for trusted worker callbacks.
    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>>;
    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Submission>>;
    /// Sets `status` and `updated_at`. `owner` scopes the write when given.
    async fn update_status(
        &self,
        id: &SubmissionId,
        owner: Option<&OwnerId>,
        guard: StatusGuard,
        status: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusWrite>;
    async fn delete_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<bool>;
}

// Identity port

#[async_trait]
pub trait IdentityPort: Send + Sync {
    /// Resolves request credentials to an owner. `Ok(None)` means unauthenticated.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>>;
}
