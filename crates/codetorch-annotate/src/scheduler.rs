use std::sync::{Arc, Mutex};

use codetorch_core::{AnnotationUnit, DocumentKey, FunctionRecord};
use codetorch_infer::{RetryPolicy, SummarizationProvider, summarize_with_retries};
use codetorch_store::RecordStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::reconcile::GenerationTask;
use crate::registry::{BatchId, DocumentRegistry};
use crate::{lock_registry, persist_records};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub generated: usize,
    pub failed: usize,
    /// The document was edited or closed before every task ran.
    pub aborted: bool,
}

/// Runs summarization batches, at most one in flight per document.
#[derive(Clone)]
pub struct GenerationScheduler {
    registry: Arc<Mutex<DocumentRegistry>>,
    provider: Arc<dyn SummarizationProvider>,
    store: Arc<dyn RecordStore>,
    retry_policy: RetryPolicy,
    invalidations: broadcast::Sender<DocumentKey>,
}

impl GenerationScheduler {
    pub fn new(
        registry: Arc<Mutex<DocumentRegistry>>,
        provider: Arc<dyn SummarizationProvider>,
        store: Arc<dyn RecordStore>,
        retry_policy: RetryPolicy,
        invalidations: broadcast::Sender<DocumentKey>,
    ) -> Self {
        Self {
            registry,
            provider,
            store,
            retry_policy,
            invalidations,
        }
    }

    /// Queues `tasks` for `key` unless a batch is already pending or nothing is to do.
    ///
    /// Must be called from within a tokio runtime; outside one nothing is scheduled.
    pub fn schedule(
        &self,
        key: &DocumentKey,
        tasks: Vec<GenerationTask>,
    ) -> Option<JoinHandle<BatchReport>> {
        if tasks.is_empty() {
            return None;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(document = %key, "no async runtime, summarization not scheduled");
            return None;
        };

        let batch = {
            let mut registry = lock_registry(&self.registry);
            if !registry.contains(key) {
                return None;
            }
            let Some(batch) = registry.begin_batch(key) else {
                tracing::debug!(document = %key, "summarization batch already running, request deferred");
                return None;
            };
            batch
        };

        tracing::debug!(document = %key, tasks = tasks.len(), "scheduled summarization batch");
        let scheduler = self.clone();
        let key = key.clone();
        Some(runtime.spawn(async move { scheduler.run_batch(key, batch, tasks).await }))
    }

    async fn run_batch(
        self,
        key: DocumentKey,
        batch: BatchId,
        tasks: Vec<GenerationTask>,
    ) -> BatchReport {
        // let the caller finish the render that queued this batch
        tokio::task::yield_now().await;

        let mut report = BatchReport::default();
        for task in tasks {
            let Some(language_id) = self.clean_language_id(&key) else {
                tracing::debug!(document = %key, "document changed, abandoning summarization batch");
                report.aborted = true;
                break;
            };

            match summarize_with_retries(
                self.provider.as_ref(),
                &task.code,
                &language_id,
                self.retry_policy,
            )
            .await
            {
                Ok(units) if units.is_empty() => {
                    tracing::warn!(
                        document = %key,
                        function = %task.span.name,
                        start_line = task.span.start_line,
                        "model returned no line summaries"
                    );
                    report.failed += 1;
                }
                Ok(units) => {
                    self.commit(&key, task, units);
                    report.generated += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        document = %key,
                        function = %task.span.name,
                        start_line = task.span.start_line,
                        error = %err,
                        "failed to summarize function"
                    );
                    report.failed += 1;
                }
            }
        }

        // failed or deferred functions need another reconcile to be queued again
        let deferred = {
            let mut registry = lock_registry(&self.registry);
            let deferred = registry.finish_batch(&key, batch).unwrap_or(false);
            if (deferred || report.failed > 0)
                && let Some(entry) = registry.get_mut(&key)
            {
                entry.invalidate_render();
            }
            deferred
        };
        if deferred {
            let _ = self.invalidations.send(key.clone());
        }

        tracing::debug!(
            document = %key,
            generated = report.generated,
            failed = report.failed,
            aborted = report.aborted,
            deferred,
            "summarization batch finished"
        );
        report
    }

    fn clean_language_id(&self, key: &DocumentKey) -> Option<String> {
        let registry = lock_registry(&self.registry);
        let entry = registry.get(key)?;
        (!entry.is_dirty()).then(|| entry.document.language_id.clone())
    }

    fn commit(
        &self,
        key: &DocumentKey,
        task: GenerationTask,
        units: Vec<AnnotationUnit>,
    ) {
        {
            let mut registry = lock_registry(&self.registry);
            let Some(entry) = registry.get_mut(key) else {
                return;
            };
            entry
                .records
                .upsert_by_content(FunctionRecord::generated(task.code, task.span.start_line, units));
            entry.invalidate_render();
            persist_records(self.store.as_ref(), key, &entry.records);
        }

        // no subscribers is fine
        let _ = self.invalidations.send(key.clone());
    }
}
