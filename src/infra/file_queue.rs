use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::{QueuePort, QueueReceipt};
use crate::error::Result;

/// One line of the queue file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub message_id: String,
    pub queue: String,
    pub enqueued_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

/// Append-only NDJSON queue for local development. Workers tail the file.
pub struct FileQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every message, oldest first.
    pub async fn read_all(&self) -> Result<Vec<QueuedMessage>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl QueuePort for FileQueue {
    async fn send(&self, target: &str, payload: Vec<u8>) -> Result<QueueReceipt> {
        let body = match serde_json::from_slice(&payload) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(&payload).into_owned()),
        };
        let message = QueuedMessage {
            message_id: Uuid::new_v4().to_string(),
            queue: target.to_string(),
            enqueued_at: Utc::now(),
            body,
        };
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        // Serialize writers so lines never interleave
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended message {} to {}", message.message_id, self.path.display());
        Ok(QueueReceipt {
            message_id: message.message_id,
        })
    }
}
