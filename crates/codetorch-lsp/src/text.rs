use codetorch_core::TextChange;
use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent};

/// Server-side copy of an open document, kept in sync from incremental edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn replace(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Applies one editor change and describes it in line terms against the
    /// text as it was before this change.
    pub fn apply(&mut self, change: &TextDocumentContentChangeEvent) -> TextChange {
        let last_line = self.last_line();
        let Some(range) = change.range else {
            self.text = change.text.clone();
            return TextChange::new(0, last_line, change.text.clone());
        };

        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end).max(start);
        self.text.replace_range(start..end, &change.text);

        let start_line = (range.start.line as usize).min(last_line);
        let end_line = (range.end.line as usize).min(last_line);
        TextChange::new(start_line, end_line, change.text.clone())
    }

    /// Byte offset of an LSP position (UTF-16 columns), clamped to the text.
    pub fn offset_at(&self, position: Position) -> usize {
        let mut line_start = 0;
        for _ in 0..position.line {
            match self.text[line_start..].find('\n') {
                Some(newline) => line_start += newline + 1,
                None => return self.text.len(),
            }
        }

        let line = &self.text[line_start..];
        let line = line.find('\n').map_or(line, |end| &line[..end]);
        let mut units = 0;
        for (offset, ch) in line.char_indices() {
            if units >= position.character as usize {
                return line_start + offset;
            }
            units += ch.len_utf16();
        }
        line_start + line.len()
    }

    fn last_line(&self) -> usize {
        self.text.bytes().filter(|byte| *byte == b'\n').count()
    }
}
