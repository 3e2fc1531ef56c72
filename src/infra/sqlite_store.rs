use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::app::ports::{StatusGuard, StatusWrite, SubmissionStore};
use crate::domain::{OwnerId, Submission, SubmissionId, SubmissionStatus};
use crate::error::{QuickpitchError, Result};

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS submissions (
    id                 TEXT PRIMARY KEY,
    owner_id           TEXT NOT NULL,
    name               TEXT NOT NULL,
    resume_object_key  TEXT NOT NULL UNIQUE,
    video_object_key   TEXT NOT NULL UNIQUE,
    status             TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS submissions_owner_idx ON submissions (owner_id);
"#;

const COLUMNS: &str =
    "id, owner_id, name, resume_object_key, video_object_key, status, created_at, updated_at";

/// SQLite-backed submission store. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteSubmissionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubmissionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::migrate(&conn)?;
        info!("Opened submission database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| QuickpitchError::internal("sqlite connection lock poisoned"))?;
            f(&guard)
        })
        .await?
    }
}

fn row_to_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Submission {
        id: SubmissionId::new(row.get::<_, String>(0)?),
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        resume_object_key: row.get(3)?,
        video_object_key: row.get(4)?,
        status: status
            .parse()
            .map_err(|e: String| conversion_error(5, e))?,
        created_at: parse_time(6, &created_at)?,
        updated_at: parse_time(7, &updated_at)?,
    })
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn select_one(conn: &Connection, id: &str) -> Result<Option<Submission>> {
    let sql = format!("SELECT {COLUMNS} FROM submissions WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], row_to_submission)
        .optional()?)
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn create(&self, submission: &Submission) -> Result<()> {
        let s = submission.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO submissions (id, owner_id, name, resume_object_key, video_object_key, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    s.id.as_str(),
                    s.owner_id.as_str(),
                    s.name,
                    s.resume_object_key,
                    s.video_object_key,
                    s.status.as_str(),
                    s.created_at.to_rfc3339(),
                    s.updated_at.to_rfc3339(),
                ],
            )?;
            debug!("Inserted submission {}", s.id);
            Ok(())
        })
        .await
    }

    async fn get_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<Option<Submission>> {
        let (owner, id) = (owner.clone(), id.clone());
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM submissions WHERE id = ?1 AND owner_id = ?2");
            Ok(conn
                .query_row(&sql, params![id.as_str(), owner.as_str()], row_to_submission)
                .optional()?)
        })
        .await
    }

    async fn get(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let id = id.clone();
        self.with_conn(move |conn| select_one(conn, id.as_str())).await
    }

    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Submission>> {
        let owner = owner.clone();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM submissions WHERE owner_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![owner.as_str()], row_to_submission)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    async fn update_status(
        &self,
        id: &SubmissionId,
        owner: Option<&OwnerId>,
        guard: StatusGuard,
        status: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<StatusWrite> {
        let id = id.clone();
        let owner = owner.cloned();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let current = match select_one(&tx, id.as_str())? {
                Some(s) if owner.as_ref().map_or(true, |o| &s.owner_id == o) => s,
                _ => return Ok(StatusWrite::Missing),
            };
            if !guard.allows(current.status) || !current.status.can_transition_to(status) {
                return Ok(StatusWrite::Skipped(current.status));
            }
            // Compare-and-set on the status that was read
            let changed = tx.execute(
                "UPDATE submissions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![status.as_str(), at.to_rfc3339(), id.as_str(), current.status.as_str()],
            )?;
            if changed == 0 {
                let now_status = select_one(&tx, id.as_str())?
                    .map(|s| StatusWrite::Skipped(s.status))
                    .unwrap_or(StatusWrite::Missing);
                return Ok(now_status);
            }
            tx.commit()?;
            Ok(StatusWrite::Applied(Submission {
                status,
                updated_at: at,
                ..current
            }))
        })
        .await
    }

    async fn delete_for_owner(&self, owner: &OwnerId, id: &SubmissionId) -> Result<bool> {
        let (owner, id) = (owner.clone(), id.clone());
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM submissions WHERE id = ?1 AND owner_id = ?2",
                params![id.as_str(), owner.as_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }
}
