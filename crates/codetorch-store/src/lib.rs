use std::path::Path;
use std::sync::Arc;

use codetorch_config::{StorageBackendKind, StorageConfig};
use codetorch_core::{DocumentKey, FunctionRecord};
use thiserror::Error;

mod json;
mod memory;
mod sqlite;

pub use json::{JsonFileStore, SUMMARY_FILE_SUFFIX, safe_file_name};
pub use memory::MemoryStore;
pub use sqlite::{SQLITE_FILE_NAME, SqliteStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persists the record list of each document as one ordered unit.
///
/// `load` returns `Ok(None)` when nothing usable is stored, including content
/// that no longer parses; callers treat that as an empty cache.
pub trait RecordStore: Send + Sync {
    fn load(&self, key: &DocumentKey) -> Result<Option<Vec<FunctionRecord>>, StoreError>;
    fn save(&self, key: &DocumentKey, records: &[FunctionRecord]) -> Result<(), StoreError>;
}

pub fn open_record_store(
    workspace_root: impl AsRef<Path>,
    config: &StorageConfig,
) -> Result<Arc<dyn RecordStore>, StoreError> {
    let workspace_root = workspace_root.as_ref();
    let store: Arc<dyn RecordStore> = match config.backend {
        StorageBackendKind::Json => Arc::new(JsonFileStore::open(workspace_root)?),
        StorageBackendKind::Sqlite => Arc::new(SqliteStore::open(workspace_root)?),
    };
    tracing::debug!(
        workspace = %workspace_root.display(),
        backend = config.backend.as_str(),
        "opened record store"
    );
    Ok(store)
}

pub(crate) fn decode_records(
    key: &DocumentKey,
    source: &str,
    raw: &str,
) -> Option<Vec<FunctionRecord>> {
    match serde_json::from_str::<Vec<FunctionRecord>>(raw) {
        Ok(records) => Some(records),
        Err(err) => {
            tracing::warn!(
                document = %key,
                source,
                error = %err,
                "ignoring unreadable annotation records"
            );
            None
        }
    }
}
