use std::collections::HashMap;
use std::sync::Mutex;

use codetorch_core::{DocumentKey, FunctionRecord};

use crate::{RecordStore, StoreError};

/// Process-local store for documents outside a workspace and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<DocumentKey, Vec<FunctionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, key: &DocumentKey) -> Result<Option<Vec<FunctionRecord>>, StoreError> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(documents.get(key).cloned())
    }

    fn save(&self, key: &DocumentKey, records: &[FunctionRecord]) -> Result<(), StoreError> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_last_saved_list_per_document() {
        let store = MemoryStore::new();
        let key = DocumentKey::new("a.ts");
        assert!(store.is_empty());

        store
            .save(&key, &[FunctionRecord::generated("x", 0, Vec::new())])
            .expect("save");
        store.save(&key, &[]).expect("save empty");

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&key).expect("load"), Some(Vec::new()));
    }
}
