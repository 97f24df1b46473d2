use std::collections::HashMap;
use std::path::Path;

use tree_sitter::Node;

use crate::languages;

pub struct LanguageConfig {
    pub id: &'static str,
    /// Editor language identifiers served by this grammar.
    pub language_ids: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub ts_language: tree_sitter::Language,
    pub hooks: Box<dyn LanguageHooks>,
}

pub trait LanguageHooks: Send + Sync {
    /// Name of the function declared by `node`, or `None` if `node` declares none.
    fn function_name(&self, node: Node<'_>, source: &[u8]) -> Option<String>;

    /// Node whose first line anchors the function, e.g. a decorator wrapper.
    fn anchor<'tree>(&self, node: Node<'tree>) -> Node<'tree> {
        node
    }
}

pub struct LanguageRegistry {
    configs: Vec<LanguageConfig>,
    extension_index: HashMap<String, usize>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            extension_index: HashMap::new(),
        }
    }

    pub fn register(&mut self, config: LanguageConfig) {
        let index = self.configs.len();
        for ext in config.extensions {
            self.extension_index
                .entry(normalize_extension(ext))
                .or_insert(index);
        }
        self.configs.push(config);
    }

    pub fn get_by_language_id(&self, language_id: &str) -> Option<&LanguageConfig> {
        let language_id = language_id.trim().to_ascii_lowercase();
        self.configs
            .iter()
            .find(|config| config.language_ids.contains(&language_id.as_str()))
    }

    pub fn get_by_extension(&self, extension: &str) -> Option<&LanguageConfig> {
        let index = *self.extension_index.get(&normalize_extension(extension))?;
        self.configs.get(index)
    }

    pub fn get_by_path(&self, path: &Path) -> Option<&LanguageConfig> {
        let ext = path.extension()?.to_string_lossy();
        self.get_by_extension(&ext)
    }

    pub fn configs(&self) -> &[LanguageConfig] {
        &self.configs
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        default_registry()
    }
}

pub fn default_registry() -> LanguageRegistry {
    let mut registry = LanguageRegistry::new();
    registry.register(languages::python::config());
    registry.register(languages::rust::config());
    registry.register(languages::typescript::config());
    registry.register(languages::typescript::tsx_js_config());
    registry
}

pub(crate) fn named_child_text(node: Node<'_>, field_name: &str, source: &[u8]) -> Option<String> {
    let child = node.child_by_field_name(field_name)?;
    let text = source.get(child.start_byte()..child.end_byte())?;
    let name = String::from_utf8_lossy(text).trim().to_owned();
    if name.is_empty() { None } else { Some(name) }
}

fn normalize_extension(extension: &str) -> String {
    extension
        .trim_start_matches('.')
        .trim()
        .to_ascii_lowercase()
}
