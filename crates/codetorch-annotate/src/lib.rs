use std::sync::{Mutex, MutexGuard};

use codetorch_core::{DocumentKey, RecordSet};
use codetorch_store::RecordStore;

mod engine;
mod reconcile;
mod registry;
mod scheduler;
mod shift;

pub use engine::{AnnotationEngine, EngineError, EngineSettings, Rendered};
pub use reconcile::{
    Decision, GenerationTask, ReconcileOptions, ReconcileOutcome, RenderEntry, RenderKind,
    reconcile,
};
pub use registry::{BatchId, DocumentEntry, DocumentRegistry};
pub use scheduler::{BatchReport, GenerationScheduler};
pub use shift::{ShiftReport, apply_changes};

pub(crate) fn lock_registry(registry: &Mutex<DocumentRegistry>) -> MutexGuard<'_, DocumentRegistry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes the record list; failures are logged and otherwise ignored.
pub(crate) fn persist_records(store: &dyn RecordStore, key: &DocumentKey, records: &RecordSet) {
    if let Err(err) = store.save(key, records.records()) {
        tracing::warn!(document = %key, error = %err, "failed to persist annotation records");
    }
}
