use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::app::ports::{StatusGuard, StatusWrite, SubmissionStore};
use crate::domain::{OwnerId, Submission, SubmissionId, SubmissionStatus};
use crate::error::{QuickpitchError, Result};

/// In-memory submission store for development/testing
#[derive(Clone, Default)]
pub struct InMemorySubmissionStore {
    submissions: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SubmissionId, Submission>>> {
        self.submissions
            .lock()
            .map_err(|_| QuickpitchError::internal("submission store lock poisoned"))
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn create(&self, submission: &Submission) -> Result<()> {
        let mut submissions = self.lock()?;
        if submissions.contains_key(&submission.id) {
            return Err(QuickpitchError::internal(format!(
                "submission {} already exists",
                submission.id
            )));
        }
        submissions.insert(submission.id.clone(), submission.clone());

        debug!("Created submission: {} with id {}", submission.name, submission.id);
        Ok(())
    }

    async fn get_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<Option<Submission>> {
        let submissions = self.lock()?;
        Ok(submissions
            .get(id)
            .filter(|s| &s.owner_id == owner)
            .cloned())
    }

    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let submissions = self.lock()?;
        Ok(submissions.get(id).cloned())
    }

    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Submission>> {
        let submissions = self.lock()?;
        Ok(submissions
            .values()
            .filter(|s| &s.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &SubmissionId,
        owner: Option<&OwnerId>,
        guard: StatusGuard,
        status: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusWrite> {
        let mut submissions = self.lock()?;
        let Some(submission) = submissions
            .get_mut(id)
            .filter(|s| owner.map_or(true, |o| &s.owner_id == o))
        else {
            return Ok(StatusWrite::Missing);
        };

        if !guard.allows(submission.status) || !submission.status.can_transition_to(status) {
            return Ok(StatusWrite::Skipped(submission.status));
        }
        submission.status = status;
        submission.updated_at = at;

        debug!("Updated submission {} to {}", id, status);
        Ok(StatusWrite::Applied(submission.clone()))
    }

    async fn delete_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<bool> {
        let mut submissions = self.lock()?;
        let owned = submissions.get(id).map_or(false, |s| &s.owner_id == owner);
        if owned {
            submissions.remove(id);
            debug!("Deleted submission {}", id);
        }
        Ok(owned)
    }
}
