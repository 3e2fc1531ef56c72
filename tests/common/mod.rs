#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use quickpitch::app::credential_issuer::CredentialIssuer;
use quickpitch::app::event_gate::EventGate;
use quickpitch::app::job_dispatcher::JobDispatcher;
use quickpitch::app::ports::{
    IdentityPort, ObjectMeta, ObjectStoragePort, PresignedRequest, QueuePort, QueueReceipt,
};
use quickpitch::app::submission_use_case::{FinalizeVerification, SubmissionPipeline};
use quickpitch::domain::OwnerId;
use quickpitch::error::{QuickpitchError, Result};
use quickpitch::server::AppState;
use quickpitch::storage::InMemorySubmissionStore;

pub const BUCKET: &str = "storage-quickpitch";
pub const QUEUE: &str = "resumeQ";
pub const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
pub const USER_HEADER: &str = "x-test-user";

/// Object storage double: objects "exist" once `put` is called.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashSet<(String, String)>>,
    pub presign_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
    pub fail_presign: AtomicBool,
    pub fail_head: AtomicBool,
}

impl FakeStorage {
    pub async fn put(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()));
    }
}

#[async_trait]
impl ObjectStoragePort for FakeStorage {
    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedRequest> {
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_presign.load(Ordering::SeqCst) {
            return Err(QuickpitchError::storage("storage offline"));
        }
        Ok(PresignedRequest {
            url: format!("https://fake-storage.test/{bucket}/{key}?sig=abc"),
            method: "PUT".to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl.as_secs() as i64),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(QuickpitchError::storage("storage offline"));
        }
        let exists = self
            .objects
            .lock()
            .await
            .contains(&(bucket.to_string(), key.to_string()));
        Ok(exists.then(|| ObjectMeta {
            key: key.to_string(),
            size: Some(1024),
            etag: None,
            content_type: None,
        }))
    }
}

/// Queue double recording every accepted message.
#[derive(Default)]
pub struct FakeQueue {
    pub sent: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail: AtomicBool,
}

impl FakeQueue {
    pub async fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl QueuePort for FakeQueue {
    async fn send(&self, target: &str, payload: Vec<u8>) -> Result<QueueReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuickpitchError::queue("queue offline"));
        }
        let body: serde_json::Value = serde_json::from_slice(&payload)?;
        let mut sent = self.sent.lock().await;
        sent.push((target.to_string(), body));
        Ok(QueueReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

/// Identity double: the `x-test-user` header names the caller.
#[derive(Default)]
pub struct HeaderIdentity {
    pub fail: AtomicBool,
}

#[async_trait]
impl IdentityPort for HeaderIdentity {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuickpitchError::Identity {
                message: "auth service down".to_string(),
            });
        }
        Ok(headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(OwnerId::new))
    }
}

pub struct Harness {
    pub store: InMemorySubmissionStore,
    pub storage: Arc<FakeStorage>,
    pub queue: Arc<FakeQueue>,
    pub identity: Arc<HeaderIdentity>,
    pub pipeline: Arc<SubmissionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_verification(FinalizeVerification::default())
    }

    pub fn with_verification(verification: FinalizeVerification) -> Self {
        let store = InMemorySubmissionStore::new();
        let storage = Arc::new(FakeStorage::default());
        let queue = Arc::new(FakeQueue::default());
        let pipeline = SubmissionPipeline::new(
            Arc::new(store.clone()),
            CredentialIssuer::new(storage.clone(), Duration::from_secs(3600)),
            JobDispatcher::new(queue.clone(), QUEUE),
            BUCKET,
        )
        .with_verification(verification);
        Self {
            store,
            storage,
            queue,
            identity: Arc::new(HeaderIdentity::default()),
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn gate(&self) -> EventGate {
        EventGate::new(WEBHOOK_SECRET, 300).unwrap()
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            pipeline: self.pipeline.clone(),
            gate: Arc::new(self.gate()),
            identity: self.identity.clone(),
            local_uploads: None,
        }
    }
}

/// Headers for a freshly signed completion delivery.
pub fn signed_headers(gate: &EventGate, id: &str, body: &[u8]) -> HashMap<&'static str, String> {
    let timestamp = Utc::now().timestamp();
    let signature = gate.sign(id, timestamp, body).unwrap();
    HashMap::from([
        ("webhook-id", id.to_string()),
        ("webhook-timestamp", timestamp.to_string()),
        ("webhook-signature", signature),
    ])
}
