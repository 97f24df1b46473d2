use codetorch_core::{DocumentSnapshot, FunctionSpan};
use regex::Regex;

use crate::{FunctionDetector, ParseError};

/// Line-oriented detector for documents no grammar covers. Never fails.
pub struct RegexDetector {
    patterns: Vec<Regex>,
}

const FUNCTION_PATTERNS: &[&str] = &[
    r"function\s+([A-Za-z0-9_$]+)\s*\(",
    r"(?:const|let|var)\s+([A-Za-z0-9_$]+)\s*=\s*\([^)]*\)\s*=>",
    r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern\s+"[^"]*")\s+)*fn\s+([A-Za-z0-9_]+)"#,
    r"^\s*(?:async\s+)?def\s+([A-Za-z0-9_]+)\s*\(",
];

impl RegexDetector {
    pub fn new() -> Self {
        let patterns = FUNCTION_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("invalid function pattern"))
            .collect();
        Self { patterns }
    }

    fn match_line(&self, line: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(line)
                .and_then(|captures| captures.get(1))
                .map(|name| name.as_str().to_owned())
        })
    }
}

impl Default for RegexDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionDetector for RegexDetector {
    fn detect(&self, document: &DocumentSnapshot) -> Result<Vec<FunctionSpan>, ParseError> {
        let spans = (0..document.line_count())
            .filter_map(|line_number| {
                let line = document.line(line_number)?;
                self.match_line(line)
                    .map(|name| FunctionSpan::new(name, line_number))
            })
            .collect();
        Ok(spans)
    }
}
