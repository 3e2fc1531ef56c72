use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::credential_issuer::{CredentialIssuer, ObjectPresence, UploadCredential};
use crate::app::event_gate::VerifiedEvent;
use crate::app::job_dispatcher::{JobDispatcher, JobPayload};
use crate::app::ports::{StatusGuard, StatusWrite, SubmissionStore};
use crate::domain::{
    validate_name, ArtifactKind, OwnerId, Submission, SubmissionId, SubmissionStatus,
};
use crate::error::SubmissionError;
use crate::metrics::SubmissionMetrics;

/// Which uploaded artifacts Finalize confirms before dispatching work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeVerification {
    /// Only the résumé is checked; the worker consumes the résumé object.
    #[default]
    #[serde(alias = "resume")]
    ResumeOnly,
    All,
}

impl FinalizeVerification {
    fn artifacts(self) -> &'static [ArtifactKind] {
        match self {
            FinalizeVerification::ResumeOnly => &[ArtifactKind::Resume],
            FinalizeVerification::All => &[ArtifactKind::Resume, ArtifactKind::Video],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedSubmission {
    pub submission: Submission,
    pub resume_upload: UploadCredential,
    pub video_upload: UploadCredential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Job accepted by the queue and `queued` committed.
    Queued { message_id: String },
    /// The submission had already left `draft`; nothing was checked or sent.
    AlreadyFinalized(SubmissionStatus),
}

/// Terminal result reported by the worker. Absent in the payload means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionOutcome {
    #[default]
    Success,
    Failed,
}

impl From<CompletionOutcome> for SubmissionStatus {
    fn from(outcome: CompletionOutcome) -> Self {
        match outcome {
            CompletionOutcome::Success => SubmissionStatus::Success,
            CompletionOutcome::Failed => SubmissionStatus::Failed,
        }
    }
}

/// Completion event body as sent by the worker. Fields are optional here so that
/// incomplete events can be told apart from malformed JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    #[serde(default, alias = "pitchId")]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub outcome: Option<CompletionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionAck {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
}

/// Use case driving a pitch submission from draft to a terminal status.
pub struct SubmissionPipeline {
    store: Arc<dyn SubmissionStore>,
    issuer: CredentialIssuer,
    dispatcher: JobDispatcher,
    bucket: String,
    verification: FinalizeVerification,
}

impl SubmissionPipeline {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        issuer: CredentialIssuer,
        dispatcher: JobDispatcher,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            issuer,
            dispatcher,
            bucket: bucket.into(),
            verification: FinalizeVerification::default(),
        }
    }

    pub fn with_verification(mut self, verification: FinalizeVerification) -> Self {
        self.verification = verification;
        self
    }

    pub fn verification(&self) -> FinalizeVerification {
        self.verification
    }

    /// Persists a draft and issues one upload credential per artifact.
    ///
    /// When credential issuance fails the draft stays persisted.
    pub async fn start(
        &self,
        owner: &OwnerId,
        name: &str,
    ) -> Result<StartedSubmission, SubmissionError> {
        let name = validate_name(name).map_err(SubmissionError::Validation)?;
        let submission = Submission::new_draft(owner.clone(), name, Utc::now());

        self.store
            .create(&submission)
            .await
            .map_err(SubmissionError::Internal)?;
        info!(submission_id = %submission.id, owner = %owner, "Pitch draft created");

        let resume_upload = self
            .issuer
            .issue_upload_credential(&self.bucket, &submission.resume_object_key)
            .await
            .map_err(SubmissionError::StorageUnavailable)?;
        let video_upload = self
            .issuer
            .issue_upload_credential(&self.bucket, &submission.video_object_key)
            .await
            .map_err(SubmissionError::StorageUnavailable)?;

        SubmissionMetrics::record_started();

        Ok(StartedSubmission {
            submission,
            resume_upload,
            video_upload,
        })
    }

    /// Confirms the upload, dispatches the processing job, then commits `queued`.
    ///
    /// The local commit happens only after both external calls succeeded, so the
    /// store never shows `queued` for work that was not accepted by the queue.
    pub async fn finalize(
        &self,
        owner: &OwnerId,
        id: &SubmissionId,
    ) -> Result<FinalizeOutcome, SubmissionError> {
        let result = self.try_finalize(owner, id).await;
        SubmissionMetrics::record_finalize(match &result {
            Ok(FinalizeOutcome::Queued { .. }) => "queued",
            Ok(FinalizeOutcome::AlreadyFinalized(_)) => "already_finalized",
            Err(SubmissionError::Incomplete { .. }) => "incomplete",
            Err(_) => "error",
        });
        result
    }

    async fn try_finalize(
        &self,
        owner: &OwnerId,
        id: &SubmissionId,
    ) -> Result<FinalizeOutcome, SubmissionError> {
        let submission = self
            .store
            .get_for_owner(owner, id)
            .await
            .map_err(SubmissionError::Internal)?
            .ok_or(SubmissionError::NotFound)?;

        if submission.status != SubmissionStatus::Draft {
            debug!(submission_id = %id, status = %submission.status, "Finalize on non-draft submission");
            return Ok(FinalizeOutcome::AlreadyFinalized(submission.status));
        }

        for kind in self.verification.artifacts() {
            let key = submission.object_key(*kind);
            match self
                .issuer
                .confirm_object_exists(&self.bucket, key)
                .await
                .map_err(SubmissionError::StorageUnavailable)?
            {
                ObjectPresence::Present(meta) => {
                    debug!(submission_id = %id, key = %meta.key, size = ?meta.size, "Upload confirmed");
                }
                ObjectPresence::Absent => {
                    return Err(SubmissionError::Incomplete {
                        missing: kind.label(),
                    });
                }
            }
        }

        let payload = JobPayload {
            submission_id: submission.id.clone(),
            object_key: submission.resume_object_key.clone(),
        };
        let receipt = self
            .dispatcher
            .enqueue(&payload)
            .await
            .map_err(SubmissionError::DispatchFailed)?;

        let write = self
            .store
            .update_status(
                id,
                Some(owner),
                StatusGuard::CurrentIs(SubmissionStatus::Draft),
                SubmissionStatus::Queued,
                Utc::now(),
            )
            .await
            .map_err(SubmissionError::Internal)?;

        match write {
            StatusWrite::Applied(_) => {
                info!(submission_id = %id, message_id = %receipt.message_id, "Pitch queued for processing");
                Ok(FinalizeOutcome::Queued {
                    message_id: receipt.message_id,
                })
            }
            // A concurrent finalize or an early completion got there first; the
            // job was still accepted, and a duplicate is harmless.
            StatusWrite::Skipped(current) => {
                debug!(submission_id = %id, status = %current, "Queued commit skipped");
                Ok(FinalizeOutcome::AlreadyFinalized(current))
            }
            StatusWrite::Missing => {
                warn!(submission_id = %id, "Submission deleted while finalizing");
                Err(SubmissionError::NotFound)
            }
        }
    }

    /// Applies a verified worker completion. Idempotent: replays re-apply the same
    /// terminal status. A late `failed` never replaces `success`; the ack then
    /// reports the status that was kept.
    pub async fn complete(&self, event: &VerifiedEvent) -> Result<CompletionAck, SubmissionError> {
        let parsed: CompletionEvent = serde_json::from_slice(&event.body)
            .map_err(|e| SubmissionError::Rejected(format!("malformed event body: {e}")))?;

        let submission_id = non_empty(parsed.submission_id)
            .ok_or_else(|| SubmissionError::Rejected("missing submissionId".to_string()))?;
        let object_key = non_empty(parsed.object_key)
            .ok_or_else(|| SubmissionError::Rejected("missing objectKey".to_string()))?;
        let id = SubmissionId::new(submission_id);
        let status: SubmissionStatus = parsed.outcome.unwrap_or_default().into();

        let write = self
            .store
            .update_status(&id, None, StatusGuard::Any, status, Utc::now())
            .await
            .map_err(SubmissionError::Internal)?;

        match write {
            StatusWrite::Applied(submission) => {
                if submission.resume_object_key != object_key {
                    warn!(submission_id = %id, object_key = %object_key, "Completion objectKey does not match the submission");
                }
                info!(submission_id = %id, status = %status, message_id = %event.message_id, "Pitch completed");
                Ok(CompletionAck {
                    submission_id: id,
                    status,
                })
            }
            StatusWrite::Skipped(current) => {
                info!(submission_id = %id, current = %current, requested = %status, "Completion left a terminal status unchanged");
                Ok(CompletionAck {
                    submission_id: id,
                    status: current,
                })
            }
            StatusWrite::Missing => Err(SubmissionError::NotFound),
        }
    }

    pub async fn get(&self, owner: &OwnerId, id: &SubmissionId) -> Result<Submission, SubmissionError> {
        self.store
            .get_for_owner(owner, id)
            .await
            .map_err(SubmissionError::Internal)?
            .ok_or(SubmissionError::NotFound)
    }

    /// Order is not guaranteed.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<Submission>, SubmissionError> {
        self.store
            .list_for_owner(owner)
            .await
            .map_err(SubmissionError::Internal)
    }

    /// Removes the record only; uploaded objects are left in storage.
    pub async fn delete(&self, owner: &OwnerId, id: &SubmissionId) -> Result<(), SubmissionError> {
        let deleted = self
            .store
            .delete_for_owner(owner, id)
            .await
            .map_err(SubmissionError::Internal)?;
        if deleted {
            info!(submission_id = %id, "Pitch deleted");
            Ok(())
        } else {
            Err(SubmissionError::NotFound)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
