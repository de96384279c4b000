//! SQLite task store. The full task is kept as JSON next to a few indexed
//! columns used for filtering.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_core::{CollaborationTask, SwitchboardError, SwitchboardResult, TaskQuery, TaskStore};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    task_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_target ON tasks(target);
CREATE INDEX IF NOT EXISTS idx_tasks_requested_at ON tasks(requested_at);
"#;

const UPSERT: &str = r#"
INSERT INTO tasks (id, source, target, status, priority, requested_at, updated_at, task_json)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(id) DO UPDATE SET
    status = excluded.status,
    target = excluded.target,
    updated_at = excluded.updated_at,
    task_json = excluded.task_json
"#;

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

fn db_err(e: impl std::fmt::Display) -> SwitchboardError {
    SwitchboardError::Persistence(e.to_string())
}

impl SqliteTaskStore {
    pub async fn open(path: PathBuf) -> SwitchboardResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(db_err)?;
            conn.execute_batch(SCHEMA).map_err(db_err)?;
            Ok::<_, SwitchboardError>(conn)
        })
        .await
        .map_err(db_err)??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private database, gone when the store is dropped.
    pub fn in_memory() -> SwitchboardResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn upsert(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        let json = serde_json::to_string(task)?;
        let row = [
            task.id.to_string(),
            task.source.clone(),
            task.target.clone(),
            task.status.to_string(),
            task.priority.to_string(),
            task.requested_at.to_rfc3339(),
            chrono::Utc::now().to_rfc3339(),
            json,
        ];
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            conn.lock().execute(UPSERT, params_from_iter(row.iter())).map_err(db_err)?;
            Ok::<_, SwitchboardError>(())
        })
        .await
        .map_err(db_err)?
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.upsert(task).await
    }

    async fn update(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.upsert(task).await
    }

    async fn query(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>> {
        let mut sql = String::from("SELECT task_json FROM tasks WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();
        if let Some(id) = query.id {
            args.push(id.to_string());
            sql.push_str(&format!(" AND id = ?{}", args.len()));
        }
        if let Some(status) = query.status {
            args.push(status.to_string());
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(target) = &query.target {
            args.push(target.clone());
            sql.push_str(&format!(" AND target = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY requested_at ASC");

        let conn = self.conn.clone();
        let rows = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok::<_, SwitchboardError>(rows)
        })
        .await
        .map_err(db_err)??;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(SwitchboardError::from))
            .collect()
    }
}
