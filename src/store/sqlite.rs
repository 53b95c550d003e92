//! SQLite 运行记录：runs(run_id, status, record, updated_at)，record 列存整条 JSON
//!
//! rusqlite 是同步 API，所有访问都放进 spawn_blocking。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::StoreError;
use crate::store::{RunRecord, RunStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id     TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    record     TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, record: RunRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(&record)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO runs (run_id, status, record, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(run_id) DO UPDATE SET status = excluded.status, record = excluded.record, updated_at = excluded.updated_at",
                params![
                    record.run_id,
                    record.status.as_str(),
                    json,
                    record.finished_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let run_id = run_id.to_string();
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row("SELECT record FROM runs WHERE run_id = ?1", params![run_id], |row| row.get(0))
                .optional()?;
            match json {
                Some(j) => Ok(Some(serde_json::from_str(&j)?)),
                None => Ok(None),
            }
        })
        .await
    }
}
