use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::ports::{QueuePort, QueueReceipt};
use crate::domain::SubmissionId;
use crate::error::QuickpitchError;

/// Work item handed to the external processing worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub submission_id: SubmissionId,
    pub object_key: String,
}

/// Enqueues job payloads on a fixed queue target. The payload is not interpreted.
pub struct JobDispatcher {
    queue: Arc<dyn QueuePort>,
    target: String,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn QueuePort>, target: impl Into<String>) -> Self {
        Self {
            queue,
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns only once the queue has acknowledged the message.
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<QueueReceipt, QuickpitchError> {
        let body = serde_json::to_vec(payload)?;
        self.queue.send(&self.target, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_shape() {
        let payload = JobPayload {
            submission_id: SubmissionId::new("abc"),
            object_key: "k1.pdf".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"submissionId": "abc", "objectKey": "k1.pdf"}));
    }
}
