//! Submission entity and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{MAX_NAME_LEN, MIN_NAME_LEN};

/// Identity of the authenticated principal that owns a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission primary key, reused as the queue/webhook correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two artifacts a pitch is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Resume,
    Video,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Resume => "pdf",
            ArtifactKind::Video => "mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Resume => "resume",
            ArtifactKind::Video => "video",
        }
    }

    /// Fresh object key: random identifier plus the artifact's fixed suffix.
    pub fn generate_key(self) -> String {
        format!("{}.{}", Uuid::new_v4().simple(), self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Queued,
    Success,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Queued => "queued",
            SubmissionStatus::Success => "success",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Success | SubmissionStatus::Failed)
    }

    /// Forward-only transition table.
    ///
    /// Terminal states may be re-applied (duplicate completion events), and a
    /// completion may land on a `draft` record when the worker finishes before
    /// the `queued` commit. `success` applies from any status; `failed` never
    /// replaces a recorded `success`.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (Draft, Queued) => true,
            (_, Success) => true,
            (Draft | Queued | Failed, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SubmissionStatus::Draft),
            "queued" => Ok(SubmissionStatus::Queued),
            "success" => Ok(SubmissionStatus::Success),
            "failed" => Ok(SubmissionStatus::Failed),
            other => Err(format!("unknown submission status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub owner_id: OwnerId,
    pub name: String,
    pub resume_object_key: String,
    pub video_object_key: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// New draft with freshly generated id and object keys.
    pub fn new_draft(owner_id: OwnerId, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: SubmissionId::generate(),
            owner_id,
            name,
            resume_object_key: ArtifactKind::Resume.generate_key(),
            video_object_key: ArtifactKind::Video.generate_key(),
            status: SubmissionStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn object_key(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Resume => &self.resume_object_key,
            ArtifactKind::Video => &self.video_object_key,
        }
    }
}

/// Trims and length-checks a user supplied pitch name.
pub fn validate_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < MIN_NAME_LEN {
        return Err(format!("name must be at least {MIN_NAME_LEN} characters"));
    }
    if len > MAX_NAME_LEN {
        return Err(format!("name must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(name.to_string())
}
