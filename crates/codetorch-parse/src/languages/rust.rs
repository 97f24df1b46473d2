use tree_sitter::Node;

use crate::registry::{LanguageConfig, LanguageHooks, named_child_text};

pub fn config() -> LanguageConfig {
    LanguageConfig {
        id: "rust",
        language_ids: &["rust"],
        extensions: &["rs"],
        ts_language: tree_sitter_rust::LANGUAGE.into(),
        hooks: Box::new(RustHooks),
    }
}

struct RustHooks;

impl LanguageHooks for RustHooks {
    fn function_name(&self, node: Node<'_>, source: &[u8]) -> Option<String> {
        if node.kind() != "function_item" {
            return None;
        }
        named_child_text(node, "name", source)
    }
}
