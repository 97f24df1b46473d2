//! Matches cached records to the functions currently in a document and decides,
//! per function, whether to reuse, keep, regenerate or wait.

use codetorch_core::{DocumentSnapshot, FunctionRecord, FunctionSpan, RecordSet, RecordState, sort_spans};

const PENDING_TEXT: &str = "Summary pending: save the file to generate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOptions {
    /// Emit a [`RenderKind::Pending`] entry for functions waiting on a save.
    pub show_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    /// First unit of a function; describes the function as a whole.
    FunctionSummary,
    LineSummary,
    Pending,
}

impl RenderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FunctionSummary => "function",
            Self::LineSummary => "line",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEntry {
    /// Absolute 0-based line, always inside the document.
    pub line: usize,
    pub text: String,
    pub kind: RenderKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub span: FunctionSpan,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Cached units describe exactly this text.
    Reuse,
    /// Edited but unsaved: show the old units, wait for a save.
    KeepStale,
    /// Saved with different text: show the old units until new ones arrive.
    Regenerate,
    /// Saved and never summarized.
    Generate,
    /// Unsaved and never summarized.
    Defer,
}

impl Decision {
    pub fn decide(state: Option<RecordState>, is_dirty: bool) -> Self {
        match (state, is_dirty) {
            (Some(RecordState::Fresh), _) => Self::Reuse,
            (Some(RecordState::Stale), true) => Self::KeepStale,
            (Some(RecordState::Stale), false) => Self::Regenerate,
            (None | Some(RecordState::Orphaned), false) => Self::Generate,
            (None | Some(RecordState::Orphaned), true) => Self::Defer,
        }
    }

    pub fn renders_units(self) -> bool {
        matches!(self, Self::Reuse | Self::KeepStale | Self::Regenerate)
    }

    pub fn enqueues(self) -> bool {
        matches!(self, Self::Regenerate | Self::Generate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub render: Vec<RenderEntry>,
    pub records: RecordSet,
    pub to_generate: Vec<GenerationTask>,
    /// Records were moved or evicted and should be persisted.
    pub changed: bool,
}

pub fn reconcile(
    document: &DocumentSnapshot,
    spans: &[FunctionSpan],
    cached: RecordSet,
    options: ReconcileOptions,
) -> ReconcileOutcome {
    let spans = sort_spans(spans);
    let line_count = document.line_count();
    let mut records = cached;
    // every record starts unclaimed; matching a slice classifies it
    let mut states = vec![RecordState::Orphaned; records.len()];
    let mut changed = false;
    let mut render = Vec::new();
    let mut to_generate = Vec::new();

    for (position, span) in spans.iter().enumerate() {
        if span.start_line >= line_count {
            continue;
        }
        let next_start = spans
            .get(position + 1)
            .map_or(line_count, |next| next.start_line);
        let code = document.text_between_lines(span.start_line, next_start);

        let index = records.find_index(code);
        let state = index
            .and_then(|index| records.get(index))
            .map(FunctionRecord::matched_state);
        let decision = Decision::decide(state, document.is_dirty);

        if let (Some(index), Some(state)) = (index, state)
            && states[index] == RecordState::Orphaned
        {
            states[index] = state;
            if records.set_start_line(index, span.start_line) {
                changed = true;
            }
        }

        if decision.renders_units()
            && let Some(record) = index.and_then(|index| records.get(index))
        {
            push_unit_entries(&mut render, record, span.start_line, next_start, line_count);
        }

        if decision.enqueues() {
            to_generate.push(GenerationTask {
                span: span.clone(),
                code: code.to_owned(),
            });
        }

        if decision == Decision::Defer && options.show_pending {
            render.push(RenderEntry {
                line: span.start_line,
                text: PENDING_TEXT.to_owned(),
                kind: RenderKind::Pending,
            });
        }
    }

    if !document.is_dirty {
        let evicted = records.retain(|index, _| {
            states
                .get(index)
                .is_none_or(|state| *state != RecordState::Orphaned)
        });
        if evicted > 0 {
            tracing::debug!(document = %document.key, evicted, "evicted orphaned records");
            changed = true;
        }
    }

    ReconcileOutcome {
        render,
        records,
        to_generate,
        changed,
    }
}

fn push_unit_entries(
    render: &mut Vec<RenderEntry>,
    record: &FunctionRecord,
    start_line: usize,
    next_start: usize,
    line_count: usize,
) {
    let last_line = next_start.saturating_sub(1).max(start_line);
    let document_last = line_count.saturating_sub(1);

    for (position, unit) in record.units.iter().enumerate() {
        let line = (start_line + unit.line.saturating_sub(1))
            .clamp(start_line, last_line)
            .min(document_last);
        let kind = if position == 0 {
            RenderKind::FunctionSummary
        } else {
            RenderKind::LineSummary
        };
        render.push(RenderEntry {
            line,
            text: unit.summary.clone(),
            kind,
        });
    }
}
