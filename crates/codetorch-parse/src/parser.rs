use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use codetorch_core::{DocumentSnapshot, FunctionSpan};
use tree_sitter::{Node, Parser};

use crate::registry::{LanguageConfig, LanguageRegistry, default_registry};
use crate::{FunctionDetector, ParseError};

/// Syntax-aware detector backed by the tree-sitter grammars in a [`LanguageRegistry`].
pub struct TreeSitterDetector {
    registry: LanguageRegistry,
    parsers: Mutex<HashMap<&'static str, Parser>>,
}

impl TreeSitterDetector {
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: LanguageRegistry) -> Self {
        Self {
            registry,
            parsers: Mutex::new(HashMap::new()),
        }
    }

    pub fn supports(&self, document: &DocumentSnapshot) -> bool {
        self.resolve(document).is_some()
    }

    fn resolve(&self, document: &DocumentSnapshot) -> Option<&LanguageConfig> {
        self.registry
            .get_by_language_id(&document.language_id)
            .or_else(|| self.registry.get_by_path(Path::new(document.key.as_str())))
    }
}

impl Default for TreeSitterDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionDetector for TreeSitterDetector {
    fn detect(&self, document: &DocumentSnapshot) -> Result<Vec<FunctionSpan>, ParseError> {
        let config = self
            .resolve(document)
            .ok_or_else(|| ParseError::UnsupportedLanguage(document.language_id.clone()))?;

        let mut parsers = self
            .parsers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let parser = match parsers.entry(config.id) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let mut parser = Parser::new();
                parser
                    .set_language(&config.ts_language)
                    .map_err(|_| ParseError::Grammar(config.id))?;
                entry.insert(parser)
            }
        };

        let source = document.text().as_bytes();
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::NoTree(document.key.to_string()))?;
        drop(parsers);

        let mut spans = Vec::new();
        collect_functions(config, tree.root_node(), source, &mut spans);
        Ok(spans)
    }
}

fn collect_functions(
    config: &LanguageConfig,
    root: Node<'_>,
    source: &[u8],
    out: &mut Vec<FunctionSpan>,
) {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(name) = config.hooks.function_name(node, source) {
            let anchor = config.hooks.anchor(node);
            out.push(FunctionSpan::new(name, anchor.start_position().row));
        }

        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use codetorch_core::DocumentKey;

    use super::*;

    fn detect(path: &str, language_id: &str, source: &str) -> Vec<(String, usize)> {
        let document = DocumentSnapshot::new(DocumentKey::new(path), language_id, source, false);
        TreeSitterDetector::new()
            .detect(&document)
            .expect("detect")
            .into_iter()
            .map(|span| (span.name, span.start_line))
            .collect()
    }

    #[test]
    fn detects_rust_functions_and_methods() {
        let source = "fn alpha() {}\n\nstruct S;\n\nimpl S {\n    #[inline]\n    fn beta(&self) {}\n}\n";

        assert_eq!(
            detect("src/lib.rs", "rust", source),
            vec![("alpha".to_owned(), 0), ("beta".to_owned(), 6)]
        );
    }

    #[test]
    fn detects_typescript_declarations_arrows_and_methods() {
        let source = "export function foo(a: number) {\n  return a;\n}\n\nconst bar = (x: number) => x * 2;\n\nclass Box {\n  open(): void {}\n}\n";

        assert_eq!(
            detect("src/app.ts", "typescript", source),
            vec![
                ("foo".to_owned(), 0),
                ("bar".to_owned(), 4),
                ("open".to_owned(), 7)
            ]
        );
    }

    #[test]
    fn python_decorators_anchor_the_function() {
        let source = "@cached\ndef load(path):\n    return path\n\ndef save():\n    pass\n";

        assert_eq!(
            detect("tool.py", "python", source),
            vec![("load".to_owned(), 0), ("save".to_owned(), 4)]
        );
    }

    #[test]
    fn falls_back_to_extension_when_language_id_is_unknown() {
        let source = "def run():\n    pass\n";
        assert_eq!(
            detect("script.py", "plaintext", source),
            vec![("run".to_owned(), 0)]
        );
    }

    #[test]
    fn unsupported_language_is_an_error() {
        let document = DocumentSnapshot::new(DocumentKey::new("notes.md"), "markdown", "# hi", false);
        let detector = TreeSitterDetector::new();

        assert!(!detector.supports(&document));
        assert_eq!(
            detector.detect(&document),
            Err(ParseError::UnsupportedLanguage("markdown".to_owned()))
        );
    }
}
