use tree_sitter::Node;

use crate::registry::{LanguageConfig, LanguageHooks, named_child_text};

pub fn config() -> LanguageConfig {
    LanguageConfig {
        id: "typescript",
        language_ids: &["typescript", "javascript"],
        extensions: &["ts", "mts", "cts", "js", "mjs", "cjs"],
        ts_language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        hooks: Box::new(TypeScriptHooks),
    }
}

pub fn tsx_js_config() -> LanguageConfig {
    LanguageConfig {
        id: "tsx",
        language_ids: &["typescriptreact", "javascriptreact"],
        extensions: &["tsx", "jsx"],
        ts_language: tree_sitter_typescript::LANGUAGE_TSX.into(),
        hooks: Box::new(TypeScriptHooks),
    }
}

struct TypeScriptHooks;

const FUNCTION_VALUE_KINDS: &[&str] = &["arrow_function", "function_expression", "function"];

impl LanguageHooks for TypeScriptHooks {
    fn function_name(&self, node: Node<'_>, source: &[u8]) -> Option<String> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "method_definition" => {
                named_child_text(node, "name", source)
            }
            // `const foo = () => ...` and class fields holding a function
            "variable_declarator" | "public_field_definition" => {
                let value = node.child_by_field_name("value")?;
                if !FUNCTION_VALUE_KINDS.contains(&value.kind()) {
                    return None;
                }
                named_child_text(node, "name", source)
            }
            _ => None,
        }
    }
}
