use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODETORCH_DIR_NAME: &str = ".codetorch";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_QWEN_ENDPOINT: &str = "http://127.0.0.1:11434/api/generate";
pub const DEFAULT_QWEN_MODEL: &str = "qwen3:4b";
pub const DEFAULT_INFERENCE_MAX_RETRIES: usize = 2;
pub const DEFAULT_INFERENCE_ATTEMPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "extension-output",
    "extension-log",
    ".git",
    "node_modules",
    CODETORCH_DIR_NAME,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProviderKind {
    #[default]
    Auto,
    Mock,
    Gemini,
    Qwen3Local,
}

impl InferenceProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mock => "mock",
            Self::Gemini => "gemini",
            Self::Qwen3Local => "qwen3_local",
        }
    }
}

impl std::str::FromStr for InferenceProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            "gemini" => Ok(Self::Gemini),
            "qwen3_local" => Ok(Self::Qwen3Local),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, mock, gemini, qwen3_local"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    Json,
    Sqlite,
}

impl StorageBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for StorageBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!(
                "invalid storage backend '{other}', expected one of: json, sqlite"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodetorchConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub annotations: AnnotationsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProviderKind::Auto,
            model: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
            max_retries: DEFAULT_INFERENCE_MAX_RETRIES,
            attempt_timeout_secs: DEFAULT_INFERENCE_ATTEMPT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Render a placeholder for functions that wait on a save before summarizing.
    #[serde(default)]
    pub show_pending: bool,
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

impl Default for AnnotationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_pending: false,
            ignore_patterns: default_ignore_patterns(),
        }
    }
}

impl AnnotationsConfig {
    pub fn is_ignored(&self, document: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| document.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn codetorch_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(CODETORCH_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    codetorch_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<CodetorchConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(CodetorchConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: CodetorchConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<CodetorchConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(codetorch_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = CodetorchConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &CodetorchConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.inference.attempt_timeout_secs == 0 {
        warnings.push(ConfigWarning {
            code: "inference_timeout_zero",
            message: "inference.attempt_timeout_secs is 0; every summarization attempt will time out"
                .to_owned(),
        });
    }

    if config.inference.provider == InferenceProviderKind::Qwen3Local
        && config.inference.endpoint.is_none()
    {
        warnings.push(ConfigWarning {
            code: "qwen_endpoint_default",
            message: format!(
                "inference.endpoint is not set; qwen3_local will use {DEFAULT_QWEN_ENDPOINT}"
            ),
        });
    }

    if !config.annotations.enabled {
        warnings.push(ConfigWarning {
            code: "annotations_disabled",
            message: "annotations.enabled is false; no annotations will be rendered".to_owned(),
        });
    }

    warnings
}

fn default_api_key_env() -> String {
    DEFAULT_GEMINI_API_KEY_ENV.to_owned()
}

fn default_max_retries() -> usize {
    DEFAULT_INFERENCE_MAX_RETRIES
}

fn default_attempt_timeout_secs() -> u64 {
    DEFAULT_INFERENCE_ATTEMPT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|pattern| (*pattern).to_owned())
        .collect()
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: CodetorchConfig) -> CodetorchConfig {
    config.inference.model = normalize_optional(config.inference.model.take());
    config.inference.endpoint = normalize_optional(config.inference.endpoint.take());

    let api_key_env = config.inference.api_key_env.trim();
    if api_key_env.is_empty() {
        config.inference.api_key_env = default_api_key_env();
    } else {
        config.inference.api_key_env = api_key_env.to_owned();
    }

    config.annotations.ignore_patterns = config
        .annotations
        .ignore_patterns
        .iter()
        .map(|pattern| pattern.trim().to_owned())
        .filter(|pattern| !pattern.is_empty())
        .collect();

    config
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ensure_workspace_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let config = ensure_workspace_config(workspace).expect("ensure config");

        assert_eq!(config.inference.provider, InferenceProviderKind::Auto);
        assert_eq!(config.inference.api_key_env, DEFAULT_GEMINI_API_KEY_ENV);
        assert_eq!(config.storage.backend, StorageBackendKind::Json);
        assert!(config.annotations.enabled);
        assert!(!config.annotations.show_pending);
        assert!(config_path(workspace).exists());

        let content = fs::read_to_string(config_path(workspace)).expect("read config file");
        assert!(content.contains("[inference]"));
        assert!(content.contains("provider = \"auto\""));
        assert!(content.contains("[annotations]"));
        assert!(content.contains("[storage]"));
    }

    #[test]
    fn load_workspace_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(codetorch_dir(workspace)).expect("create .codetorch");

        let raw = r#"
[inference]
provider = "qwen3_local"
model = "  qwen3:8b  "
endpoint = "http://127.0.0.1:11434/api/generate"
api_key_env = "   "
max_retries = 4
attempt_timeout_secs = 10

[annotations]
show_pending = true
ignore_patterns = ["vendor", "  "]

[storage]
backend = "sqlite"
"#;
        fs::write(config_path(workspace), raw).expect("write config");

        let config = load_workspace_config(workspace).expect("load config");

        assert_eq!(config.inference.provider, InferenceProviderKind::Qwen3Local);
        assert_eq!(config.inference.model.as_deref(), Some("qwen3:8b"));
        assert_eq!(config.inference.api_key_env, DEFAULT_GEMINI_API_KEY_ENV);
        assert_eq!(config.inference.max_retries, 4);
        assert_eq!(config.inference.attempt_timeout_secs, 10);
        assert!(config.annotations.enabled);
        assert!(config.annotations.show_pending);
        assert_eq!(config.annotations.ignore_patterns, vec!["vendor".to_owned()]);
        assert_eq!(config.storage.backend, StorageBackendKind::Sqlite);
    }

    #[test]
    fn ignore_patterns_match_substrings_of_document_paths() {
        let config = AnnotationsConfig::default();
        assert!(config.is_ignored("file:///work/node_modules/pkg/index.js"));
        assert!(config.is_ignored("/work/.codetorch/src_lib.rs.summary.json"));
        assert!(!config.is_ignored("file:///work/src/lib.rs"));
    }

    #[test]
    fn validate_config_reports_zero_timeout() {
        let mut config = CodetorchConfig::default();
        assert!(validate_config(&config).is_empty());

        config.inference.attempt_timeout_secs = 0;
        let warnings = validate_config(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "inference_timeout_zero");
    }

    #[test]
    fn kinds_parse_from_cli_strings() {
        assert_eq!(
            "gemini".parse::<InferenceProviderKind>(),
            Ok(InferenceProviderKind::Gemini)
        );
        assert!("bedrock".parse::<InferenceProviderKind>().is_err());
        assert_eq!(
            "sqlite".parse::<StorageBackendKind>(),
            Ok(StorageBackendKind::Sqlite)
        );
    }
}
