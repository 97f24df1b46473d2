use std::collections::HashMap;
use std::collections::hash_map::Entry;

use codetorch_core::{DocumentKey, DocumentSnapshot, RecordSet};

use crate::reconcile::RenderEntry;

/// Everything tracked for one open document.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub document: DocumentSnapshot,
    pub records: RecordSet,
    pub render_cache: Option<Vec<RenderEntry>>,
}

impl DocumentEntry {
    pub fn new(document: DocumentSnapshot, records: RecordSet) -> Self {
        Self {
            document,
            records,
            render_cache: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.document.is_dirty
    }

    pub fn invalidate_render(&mut self) {
        self.render_cache = None;
    }
}

/// Identifies one generation batch; handed out by [`DocumentRegistry::begin_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchId(u64);

#[derive(Debug, Clone, Copy)]
struct InFlightBatch {
    id: BatchId,
    /// Another batch was requested while this one ran.
    deferred: bool,
}

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: HashMap<DocumentKey, DocumentEntry>,
    /// Keyed apart from `entries` so a running batch survives close and reopen.
    batches: HashMap<DocumentKey, InFlightBatch>,
    next_batch_id: u64,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `document`, replacing any previous entry under the same key.
    pub fn open(&mut self, document: DocumentSnapshot, records: RecordSet) -> &mut DocumentEntry {
        let entry = DocumentEntry::new(document, records);
        match self.entries.entry(entry.document.key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(entry);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(entry),
        }
    }

    pub fn close(&mut self, key: &DocumentKey) -> Option<DocumentEntry> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &DocumentKey) -> Option<&DocumentEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &DocumentKey) -> Option<&mut DocumentEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claims the single batch slot for `key`.
    ///
    /// Returns `None` when a batch is already queued or running; the request is
    /// remembered and reported by [`finish_batch`](Self::finish_batch).
    pub fn begin_batch(&mut self, key: &DocumentKey) -> Option<BatchId> {
        match self.batches.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().deferred = true;
                None
            }
            Entry::Vacant(vacant) => {
                let id = BatchId(self.next_batch_id);
                self.next_batch_id += 1;
                vacant.insert(InFlightBatch {
                    id,
                    deferred: false,
                });
                Some(id)
            }
        }
    }

    /// Releases the slot held by `id`.
    ///
    /// Returns whether another batch was requested meanwhile, or `None` when
    /// `id` no longer holds the slot for `key`.
    pub fn finish_batch(&mut self, key: &DocumentKey, id: BatchId) -> Option<bool> {
        match self.batches.entry(key.clone()) {
            Entry::Occupied(occupied) if occupied.get().id == id => {
                Some(occupied.remove().deferred)
            }
            _ => None,
        }
    }
}
