use tree_sitter::Node;

use crate::registry::{LanguageConfig, LanguageHooks, named_child_text};

pub fn config() -> LanguageConfig {
    LanguageConfig {
        id: "python",
        language_ids: &["python"],
        extensions: &["py", "pyi"],
        ts_language: tree_sitter_python::LANGUAGE.into(),
        hooks: Box::new(PythonHooks),
    }
}

struct PythonHooks;

impl LanguageHooks for PythonHooks {
    fn function_name(&self, node: Node<'_>, source: &[u8]) -> Option<String> {
        if node.kind() != "function_definition" {
            return None;
        }
        named_child_text(node, "name", source)
    }

    fn anchor<'tree>(&self, node: Node<'tree>) -> Node<'tree> {
        match node.parent() {
            Some(parent) if parent.kind() == "decorated_definition" => parent,
            _ => node,
        }
    }
}
