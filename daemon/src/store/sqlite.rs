use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::protocol::{ActivityRecord, NewActivity, Priority};
use crate::store::{ActivityStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activities(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_uid TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT 'Medium',
    image_url TEXT NOT NULL DEFAULT '',
    is_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activities_user_uid ON activities(user_uid, id);
";

const SELECT_COLUMNS: &str =
    "id, user_uid, title, description, priority, image_url, is_completed, created_at";

#[derive(Clone)]
pub struct SqliteActivityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivityStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory().context("failed to open in-memory sqlite")?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
            Connection::open(path)
                .with_context(|| format!("failed to open sqlite at {}", path.display()))?
        };
        conn.execute_batch(SCHEMA)
            .context("failed to create activities schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))?;
            work(&guard)
        })
        .await
        .map_err(|error| StoreError::Backend(format!("sqlite task failed: {error}")))?
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityRecord> {
    let priority: String = row.get(4)?;
    Ok(ActivityRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: Priority::parse(&priority).unwrap_or_default(),
        image_url: row.get(5)?,
        completed: row.get(6)?,
        created_at: row.get::<_, DateTime<Utc>>(7)?,
    })
}

fn select_by_owner(
    conn: &Connection,
    owner: &str,
    limit: Option<usize>,
) -> Result<Vec<ActivityRecord>, StoreError> {
    // LIMIT -1 means no limit in sqlite
    let limit = limit.map_or(-1, |n| n as i64);
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM activities WHERE user_uid = ?1 ORDER BY id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![owner, limit], record_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn create(
        &self,
        owner: &str,
        activity: NewActivity,
    ) -> Result<ActivityRecord, StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO activities(user_uid, title, description, priority, image_url, is_completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    owner,
                    activity.title,
                    activity.description,
                    activity.priority.as_str(),
                    activity.image_url,
                    created_at
                ],
            )?;
            Ok(ActivityRecord {
                id: conn.last_insert_rowid(),
                owner_id: owner,
                title: activity.title,
                description: activity.description,
                priority: activity.priority,
                image_url: activity.image_url,
                completed: false,
                created_at,
            })
        })
        .await
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| select_by_owner(conn, &owner, None))
            .await
    }

    async fn recent_by_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| select_by_owner(conn, &owner, Some(limit)))
            .await
    }

    async fn set_completed(
        &self,
        owner: &str,
        id: i64,
        completed: bool,
    ) -> Result<(), StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE activities SET is_completed = ?1 WHERE id = ?2 AND user_uid = ?3",
                params![completed, id, owner],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, owner: &str, id: i64) -> Result<(), StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM activities WHERE id = ?1 AND user_uid = ?2",
                params![id, owner],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
