use std::path::Path;
use std::sync::{Arc, Mutex};

use codetorch_config::{CodetorchConfig, ConfigError};
use codetorch_core::{
    DocumentKey, DocumentSnapshot, FunctionRecord, FunctionSpan, RecordSet, TextChange,
};
use codetorch_infer::{
    InferError, ProviderOverrides, RetryPolicy, SummarizationProvider, load_provider,
};
use codetorch_parse::{FunctionDetector, default_detector};
use codetorch_store::{RecordStore, StoreError, open_record_store};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::reconcile::{ReconcileOptions, RenderEntry, reconcile};
use crate::registry::DocumentRegistry;
use crate::scheduler::{BatchReport, GenerationScheduler};
use crate::shift::{self, ShiftReport};
use crate::{lock_registry, persist_records};

const INVALIDATION_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config load failed: {0}")]
    Config(#[from] ConfigError),
    #[error("record store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("summarization provider unavailable: {0}")]
    Infer(#[from] InferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSettings {
    pub reconcile: ReconcileOptions,
    pub retry_policy: RetryPolicy,
}

#[derive(Debug)]
pub struct Rendered {
    pub entries: Vec<RenderEntry>,
    /// Set when this render queued summarization work.
    pub scheduled: Option<JoinHandle<BatchReport>>,
}

/// Single entry point for editor events; owns every open document's cache.
pub struct AnnotationEngine {
    registry: Arc<Mutex<DocumentRegistry>>,
    detector: Arc<dyn FunctionDetector>,
    store: Arc<dyn RecordStore>,
    scheduler: GenerationScheduler,
    options: ReconcileOptions,
    invalidations: broadcast::Sender<DocumentKey>,
}

impl AnnotationEngine {
    pub fn new(
        detector: Arc<dyn FunctionDetector>,
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn SummarizationProvider>,
        settings: EngineSettings,
    ) -> Self {
        let registry = Arc::new(Mutex::new(DocumentRegistry::new()));
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        let scheduler = GenerationScheduler::new(
            registry.clone(),
            provider,
            store.clone(),
            settings.retry_policy,
            invalidations.clone(),
        );

        Self {
            registry,
            detector,
            store,
            scheduler,
            options: settings.reconcile,
            invalidations,
        }
    }

    /// Builds an engine from a workspace's configuration: its record store backend,
    /// its summarization provider and the default function detector.
    pub fn open_workspace(
        workspace_root: impl AsRef<Path>,
        config: &CodetorchConfig,
        overrides: ProviderOverrides,
    ) -> Result<Self, EngineError> {
        let store = open_record_store(workspace_root, &config.storage)?;
        let loaded = load_provider(&config.inference, overrides)?;
        tracing::info!(
            provider = %loaded.provider_name,
            model = %loaded.model_name,
            storage = config.storage.backend.as_str(),
            "annotation engine ready"
        );

        Ok(Self::new(
            Arc::new(default_detector()),
            store,
            loaded.provider,
            EngineSettings {
                reconcile: ReconcileOptions {
                    show_pending: config.annotations.show_pending,
                },
                retry_policy: loaded.retry_policy,
            },
        ))
    }

    pub fn open_document(&self, document: DocumentSnapshot) {
        let records = match self.store.load(&document.key) {
            Ok(records) => records.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(
                    document = %document.key,
                    error = %err,
                    "failed to load annotation records, starting empty"
                );
                Vec::new()
            }
        };

        tracing::debug!(document = %document.key, records = records.len(), "opened document");
        lock_registry(&self.registry).open(document, RecordSet::from_records(records));
    }

    pub fn close_document(&self, key: &DocumentKey) -> bool {
        lock_registry(&self.registry).close(key).is_some()
    }

    pub fn is_open(&self, key: &DocumentKey) -> bool {
        lock_registry(&self.registry).contains(key)
    }

    pub fn document(&self, key: &DocumentKey) -> Option<DocumentSnapshot> {
        lock_registry(&self.registry)
            .get(key)
            .map(|entry| entry.document.clone())
    }

    /// Takes the post-edit `document` and the edits that produced it, and shifts
    /// cached positions in place. Returns `None` for documents that are not open.
    pub fn apply_changes(
        &self,
        document: DocumentSnapshot,
        changes: &[TextChange],
    ) -> Option<ShiftReport> {
        let spans = self.detect(&document);

        let mut registry = lock_registry(&self.registry);
        let entry = registry.get_mut(&document.key)?;
        entry.document = document;

        let report = shift::apply_changes(&entry.document, changes, &spans, &mut entry.records);
        if report.touched_records() {
            persist_records(self.store.as_ref(), &entry.document.key, &entry.records);
        }
        entry.invalidate_render();
        Some(report)
    }

    pub fn save_document(&self, key: &DocumentKey, text: impl Into<String>) -> bool {
        {
            let mut registry = lock_registry(&self.registry);
            let Some(entry) = registry.get_mut(key) else {
                return false;
            };
            entry.document.replace_text(text);
            entry.document.is_dirty = false;
            entry.invalidate_render();
        }

        let _ = self.invalidations.send(key.clone());
        true
    }

    /// Render list for `key`, reconciling first unless a cached list is still valid.
    pub fn render(&self, key: &DocumentKey) -> Option<Rendered> {
        let (entries, tasks) = {
            let mut registry = lock_registry(&self.registry);
            let entry = registry.get_mut(key)?;
            if let Some(cached) = &entry.render_cache {
                return Some(Rendered {
                    entries: cached.clone(),
                    scheduled: None,
                });
            }

            let spans = self.detect(&entry.document);
            let cached = std::mem::take(&mut entry.records);
            let outcome = reconcile(&entry.document, &spans, cached, self.options);
            entry.records = outcome.records;
            if outcome.changed {
                persist_records(self.store.as_ref(), key, &entry.records);
            }
            entry.render_cache = Some(outcome.render.clone());
            (outcome.render, outcome.to_generate)
        };

        let scheduled = self.scheduler.schedule(key, tasks);
        Some(Rendered { entries, scheduled })
    }

    pub fn records(&self, key: &DocumentKey) -> Option<Vec<FunctionRecord>> {
        lock_registry(&self.registry)
            .get(key)
            .map(|entry| entry.records.records().to_vec())
    }

    pub fn detect(&self, document: &DocumentSnapshot) -> Vec<FunctionSpan> {
        match self.detector.detect(document) {
            Ok(spans) => spans,
            Err(err) => {
                tracing::warn!(document = %document.key, error = %err, "function detection failed");
                Vec::new()
            }
        }
    }

    /// Keys of documents whose render list changed outside an editor request.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentKey> {
        self.invalidations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use codetorch_core::AnnotationUnit;
    use codetorch_infer::MockProvider;
    use codetorch_parse::RegexDetector;
    use codetorch_store::MemoryStore;

    use super::*;
    use crate::reconcile::RenderKind;

    const SOURCE: &str = "function foo() {\n  return 1;\n}\n\nfunction bar() {\n  return 2;\n}\n";

    fn engine(store: Arc<MemoryStore>, show_pending: bool) -> AnnotationEngine {
        AnnotationEngine::new(
            Arc::new(RegexDetector::new()),
            store,
            Arc::new(MockProvider),
            EngineSettings {
                reconcile: ReconcileOptions { show_pending },
                retry_policy: RetryPolicy {
                    max_retries: 0,
                    ..RetryPolicy::default()
                },
            },
        )
    }

    fn snapshot(text: &str, is_dirty: bool) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentKey::new("src/sample.ts"), "typescript", text, is_dirty)
    }

    #[tokio::test]
    async fn clean_document_without_cache_generates_then_renders() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), false);
        let key = DocumentKey::new("src/sample.ts");
        let mut invalidated = engine.subscribe();
        engine.open_document(snapshot(SOURCE, false));

        let first = engine.render(&key).expect("open document");
        assert!(first.entries.is_empty());
        let report = first
            .scheduled
            .expect("generation scheduled")
            .await
            .expect("batch joined");
        assert_eq!(report.generated, 2);
        assert_eq!(invalidated.recv().await.expect("invalidated"), key);

        let second = engine.render(&key).expect("open document");
        assert!(second.scheduled.is_none());
        let kinds = second
            .entries
            .iter()
            .map(|entry| (entry.line, entry.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![(0, RenderKind::FunctionSummary), (4, RenderKind::FunctionSummary)]
        );
        assert_eq!(store.load(&key).expect("load").map(|records| records.len()), Some(2));
    }

    #[tokio::test]
    async fn dirty_document_shows_pending_and_generates_after_save() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, true);
        let key = DocumentKey::new("src/sample.ts");
        engine.open_document(snapshot("", false));

        engine
            .apply_changes(snapshot(SOURCE, true), &[TextChange::insert(0, SOURCE)])
            .expect("document open");
        let dirty = engine.render(&key).expect("rendered");
        assert!(dirty.scheduled.is_none());
        assert_eq!(dirty.entries.len(), 2);
        assert!(dirty.entries.iter().all(|entry| entry.kind == RenderKind::Pending));

        assert!(engine.save_document(&key, SOURCE));
        let saved = engine.render(&key).expect("rendered");
        saved
            .scheduled
            .expect("generation after save")
            .await
            .expect("joined");
        assert_eq!(engine.records(&key).expect("records").len(), 2);
    }

    #[tokio::test]
    async fn render_is_cached_until_invalidated() {
        let store = Arc::new(MemoryStore::new());
        let key = DocumentKey::new("src/sample.ts");
        store
            .save(
                &key,
                &[FunctionRecord::generated(
                    "function foo() {\n  return 1;\n}\n\n",
                    0,
                    vec![AnnotationUnit::new(1, "", "foo")],
                )],
            )
            .expect("seed");
        let engine = engine(store, false);
        engine.open_document(snapshot("function foo() {\n  return 1;\n}\n\n", false));

        let first = engine.render(&key).expect("rendered");
        let second = engine.render(&key).expect("rendered");
        assert_eq!(first.entries, second.entries);
        assert!(first.scheduled.is_none() && second.scheduled.is_none());

        assert!(engine.close_document(&key));
        assert!(engine.render(&key).is_none());
        assert!(!engine.is_open(&key));
    }

    #[test]
    fn events_for_unknown_documents_are_ignored() {
        let engine = engine(Arc::new(MemoryStore::new()), false);
        let key = DocumentKey::new("src/sample.ts");

        assert!(engine.apply_changes(snapshot(SOURCE, true), &[]).is_none());
        assert!(!engine.save_document(&key, SOURCE));
        assert!(!engine.close_document(&key));
        assert!(engine.records(&key).is_none());
    }
}
