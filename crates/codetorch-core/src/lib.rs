use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

mod document;
mod record;

pub use document::DocumentSnapshot;
pub use record::{AnnotationUnit, FunctionRecord, LiveCodeRefresh, RecordSet, RecordState};

/// Stable identity of a document: its workspace-relative path with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(logical_path: impl AsRef<str>) -> Self {
        Self(normalize_path(logical_path.as_ref()))
    }

    pub fn from_path(workspace_root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(workspace_root).unwrap_or(path);
        Self::new(relative.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One detected function, addressed by its first line. The end is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpan {
    pub name: String,
    pub start_line: usize,
}

impl FunctionSpan {
    pub fn new(name: impl Into<String>, start_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
        }
    }
}

/// A single content change, expressed against the pre-edit document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

impl TextChange {
    pub fn new(start_line: usize, end_line: usize, text: impl Into<String>) -> Self {
        Self {
            start_line,
            end_line: end_line.max(start_line),
            text: text.into(),
        }
    }

    pub fn insert(line: usize, text: impl Into<String>) -> Self {
        Self::new(line, line, text)
    }

    pub fn lines_added(&self) -> usize {
        self.text.bytes().filter(|byte| *byte == b'\n').count()
    }

    pub fn lines_removed(&self) -> usize {
        self.end_line - self.start_line
    }

    pub fn line_delta(&self) -> isize {
        self.lines_added() as isize - self.lines_removed() as isize
    }
}

/// Sorts spans by start line and drops spans that share a start line with an earlier one.
pub fn sort_spans(spans: &[FunctionSpan]) -> Vec<FunctionSpan> {
    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|span| span.start_line);
    sorted.dedup_by_key(|span| span.start_line);
    sorted
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}
