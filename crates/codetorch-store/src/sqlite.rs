use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use codetorch_config::codetorch_dir;
use codetorch_core::{DocumentKey, FunctionRecord};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{RecordStore, StoreError, decode_records};

pub const SQLITE_FILE_NAME: &str = "annotations.sqlite";

/// All documents in one `.codetorch/annotations.sqlite` database, one row per document.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = codetorch_dir(workspace_root);
        fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join(SQLITE_FILE_NAME))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for SqliteStore {
    fn load(&self, key: &DocumentKey) -> Result<Option<Vec<FunctionRecord>>, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT records_json FROM annotation_records WHERE document_key = ?1",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(raw.and_then(|raw| decode_records(key, SQLITE_FILE_NAME, &raw)))
    }

    fn save(&self, key: &DocumentKey, records: &[FunctionRecord]) -> Result<(), StoreError> {
        let records_json = serde_json::to_string(records)?;
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO annotation_records (document_key, records_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(document_key) DO UPDATE SET
                records_json = excluded.records_json,
                updated_at = excluded.updated_at
            "#,
            params![key.as_str(), records_json, unix_timestamp_secs()],
        )?;

        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_records (
            document_key TEXT PRIMARY KEY,
            records_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn unix_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
