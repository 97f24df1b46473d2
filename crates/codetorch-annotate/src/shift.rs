//! Keeps cached line positions in step with edits, without summarization calls.

use codetorch_core::{
    DocumentSnapshot, FunctionSpan, LiveCodeRefresh, RecordSet, TextChange, sort_spans,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShiftReport {
    pub changes: usize,
    /// Record start lines moved, summed over all changes.
    pub records_moved: usize,
    /// Records whose `live_code` now reflects the edit.
    pub refreshed: usize,
    /// Edited records dropped because another record already held the new text.
    pub merged: usize,
}

impl ShiftReport {
    pub fn touched_records(&self) -> bool {
        self.records_moved + self.refreshed + self.merged > 0
    }
}

/// Applies `changes` (in the order the editor reported them) to `records`.
///
/// `document` and `spans` describe the document after every change was applied.
/// Changes are walked last to first so a later change's delta is never counted
/// against positions an earlier change already moved.
pub fn apply_changes(
    document: &DocumentSnapshot,
    changes: &[TextChange],
    spans: &[FunctionSpan],
    records: &mut RecordSet,
) -> ShiftReport {
    let spans = sort_spans(spans);
    let line_count = document.line_count();
    let mut report = ShiftReport {
        changes: changes.len(),
        ..ShiftReport::default()
    };

    for change in changes.iter().rev() {
        let delta = change.line_delta();
        if delta != 0 {
            report.records_moved += records.shift_start_lines(change.start_line, delta);
        }

        let Some((span_start, span_end)) = containing_span(&spans, change.start_line, line_count)
        else {
            continue;
        };
        let Some(index) = records.index_at_start_line(span_start) else {
            continue;
        };

        records.shift_units(index, change.start_line - span_start, delta);

        let code = document.text_between_lines(span_start, span_end);
        match records.refresh_live_code(index, code) {
            LiveCodeRefresh::Unchanged => {}
            LiveCodeRefresh::Updated => report.refreshed += 1,
            LiveCodeRefresh::MergedIntoExisting => {
                tracing::debug!(
                    document = %document.key,
                    start_line = span_start,
                    "edited function now matches another record"
                );
                report.merged += 1;
            }
        }
    }

    report
}

/// Half-open `[start, next_start)` range of the span holding `line`.
fn containing_span(spans: &[FunctionSpan], line: usize, line_count: usize) -> Option<(usize, usize)> {
    let position = spans.partition_point(|span| span.start_line <= line).checked_sub(1)?;
    let start = spans[position].start_line;
    let end = spans
        .get(position + 1)
        .map_or(line_count.max(start + 1), |next| next.start_line);
    (line < end).then_some((start, end))
}
