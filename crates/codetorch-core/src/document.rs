use crate::DocumentKey;

/// Read-only view of an editor document as the annotation core sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub key: DocumentKey,
    pub language_id: String,
    pub is_dirty: bool,
    text: String,
    line_starts: Vec<usize>,
}

impl DocumentSnapshot {
    pub fn new(
        key: DocumentKey,
        language_id: impl Into<String>,
        text: impl Into<String>,
        is_dirty: bool,
    ) -> Self {
        let text = text.into();
        let line_starts = compute_line_starts(&text);
        Self {
            key,
            language_id: language_id.into(),
            is_dirty,
            text,
            line_starts,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn replace_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.line_starts = compute_line_starts(&self.text);
    }

    /// Number of lines; a trailing newline opens one more (empty) line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.text.len(), |next| next - 1);
        self.text
            .get(start..end)
            .map(|value| value.strip_suffix('\r').unwrap_or(value))
    }

    /// Text from the start of `start_line` up to the start of `end_line`
    /// (or the end of the document when `end_line` is past the last line).
    pub fn text_between_lines(&self, start_line: usize, end_line: usize) -> &str {
        let start = self.offset_of_line(start_line);
        let end = self.offset_of_line(end_line);
        if start >= end {
            return "";
        }
        &self.text[start..end]
    }

    fn offset_of_line(&self, line: usize) -> usize {
        self.line_starts
            .get(line)
            .copied()
            .unwrap_or(self.text.len())
    }
}

fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(
        text.bytes()
            .enumerate()
            .filter(|(_, byte)| *byte == b'\n')
            .map(|(index, _)| index + 1),
    );
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(text: &str) -> DocumentSnapshot {
        DocumentSnapshot::new(DocumentKey::new("sample.ts"), "typescript", text, false)
    }

    #[test]
    fn line_count_matches_editor_semantics() {
        assert_eq!(snapshot("").line_count(), 1);
        assert_eq!(snapshot("a\nb").line_count(), 2);
        assert_eq!(snapshot("a\nb\n").line_count(), 3);
    }

    #[test]
    fn text_between_lines_includes_trailing_newline_of_last_line() {
        let doc = snapshot("function foo() {\n  return 1;\n}\n\nfunction bar() {\n  return 2;\n}");

        assert_eq!(
            doc.text_between_lines(0, 4),
            "function foo() {\n  return 1;\n}\n\n"
        );
        assert_eq!(
            doc.text_between_lines(4, doc.line_count()),
            "function bar() {\n  return 2;\n}"
        );
        assert_eq!(doc.text_between_lines(4, 99), "function bar() {\n  return 2;\n}");
        assert_eq!(doc.text_between_lines(9, 12), "");
    }

    #[test]
    fn line_strips_newline_and_carriage_return() {
        let doc = snapshot("first\r\nsecond\n");
        assert_eq!(doc.line(0), Some("first"));
        assert_eq!(doc.line(1), Some("second"));
        assert_eq!(doc.line(2), Some(""));
        assert_eq!(doc.line(3), None);
    }

    #[test]
    fn replace_text_recomputes_lines() {
        let mut doc = snapshot("a");
        doc.replace_text("a\nb\nc");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(2), Some("c"));
    }
}
