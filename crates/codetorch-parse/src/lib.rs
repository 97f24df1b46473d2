mod heuristic;
mod languages;
mod parser;
mod registry;

use codetorch_core::{DocumentSnapshot, FunctionSpan};
use thiserror::Error;

pub use heuristic::RegexDetector;
pub use parser::TreeSitterDetector;
pub use registry::{LanguageConfig, LanguageHooks, LanguageRegistry, default_registry};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("failed to load {0} tree-sitter grammar")]
    Grammar(&'static str),
    #[error("tree-sitter produced no tree for {0}")]
    NoTree(String),
}

/// Produces the function spans of a document, in any order.
pub trait FunctionDetector: Send + Sync {
    fn detect(&self, document: &DocumentSnapshot) -> Result<Vec<FunctionSpan>, ParseError>;
}

/// Uses `primary` unless it fails or finds nothing, then `fallback`.
pub struct FallbackDetector {
    primary: Box<dyn FunctionDetector>,
    fallback: Box<dyn FunctionDetector>,
}

impl FallbackDetector {
    pub fn new(primary: Box<dyn FunctionDetector>, fallback: Box<dyn FunctionDetector>) -> Self {
        Self { primary, fallback }
    }
}

impl FunctionDetector for FallbackDetector {
    fn detect(&self, document: &DocumentSnapshot) -> Result<Vec<FunctionSpan>, ParseError> {
        match self.primary.detect(document) {
            Ok(spans) if !spans.is_empty() => return Ok(spans),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    document = %document.key,
                    error = %err,
                    "semantic function detection unavailable, using heuristic"
                );
            }
        }

        self.fallback.detect(document)
    }
}

pub fn default_detector() -> FallbackDetector {
    FallbackDetector::new(
        Box::new(TreeSitterDetector::new()),
        Box::new(RegexDetector::new()),
    )
}
