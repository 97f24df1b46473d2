use std::env;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use codetorch_config::{
    DEFAULT_GEMINI_API_KEY_ENV, DEFAULT_QWEN_ENDPOINT, DEFAULT_QWEN_MODEL, InferenceConfig,
    InferenceProviderKind, ensure_workspace_config,
};
use codetorch_core::AnnotationUnit;
use serde_json::{Value, json};
use thiserror::Error;

mod prompt;
mod retry;

pub use prompt::{build_prompt, number_lines, parse_units, units_from_summaries};
pub use retry::{RetryPolicy, summarize_with_retries};

pub const GEMINI_API_KEY_ENV: &str = DEFAULT_GEMINI_API_KEY_ENV;
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOverrides {
    pub provider: Option<InferenceProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

pub struct LoadedProvider {
    pub provider: Arc<dyn SummarizationProvider>,
    pub provider_name: String,
    pub model_name: String,
    pub retry_policy: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing Gemini API key in {0}")]
    MissingApiKey(String),
    #[error("config load failed: {0}")]
    Config(#[from] codetorch_config::ConfigError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("summarization failed after retries: {0}")]
    RetriesExhausted(String),
}

/// Produces line-addressed summaries for one function body.
#[async_trait]
pub trait SummarizationProvider: Send + Sync {
    async fn summarize(
        &self,
        code: &str,
        language_id: &str,
    ) -> Result<Vec<AnnotationUnit>, InferError>;
}

/// Offline provider: one unit per blank-line separated block, worded from the block's first line.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

#[async_trait]
impl SummarizationProvider for MockProvider {
    async fn summarize(
        &self,
        code: &str,
        language_id: &str,
    ) -> Result<Vec<AnnotationUnit>, InferError> {
        let mut summaries = Vec::new();
        let mut previous_blank = true;
        for (index, line) in code.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                previous_blank = true;
                continue;
            }
            if previous_blank {
                let summary = if summaries.is_empty() {
                    format!("Mock {language_id} summary for `{trimmed}`")
                } else {
                    format!("Mock block starting with `{trimmed}`")
                };
                summaries.push((index + 1, summary));
            }
            previous_blank = false;
        }

        Ok(units_from_summaries(code, summaries))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn from_env_key(api_key_env: &str, model: Option<String>) -> Result<Self, InferError> {
        let api_key = read_env_non_empty(api_key_env)
            .ok_or_else(|| InferError::MissingApiKey(api_key_env.to_owned()))?;

        Ok(Self::new(api_key, resolve_gemini_model(model)))
    }

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            api_base: GEMINI_API_BASE.to_owned(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        )
    }
}

#[async_trait]
impl SummarizationProvider for GeminiProvider {
    async fn summarize(
        &self,
        code: &str,
        language_id: &str,
    ) -> Result<Vec<AnnotationUnit>, InferError> {
        let body = json!({
            "contents": [
                {
                    "parts": [
                        {
                            "text": build_prompt(code, language_id)
                        }
                    ]
                }
            ],
            "generationConfig": {
                "temperature": 0.0
            }
        });

        let response_value: Value = self
            .client
            .post(self.endpoint_url())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = extract_gemini_text_part(&response_value)?;
        parse_units(text, code)
    }
}

/// Local model served through an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct Qwen3LocalProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl Qwen3LocalProvider {
    pub fn new(endpoint: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: normalize_optional(endpoint)
                .unwrap_or_else(|| DEFAULT_QWEN_ENDPOINT.to_owned()),
            model: normalize_optional(model).unwrap_or_else(|| DEFAULT_QWEN_MODEL.to_owned()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SummarizationProvider for Qwen3LocalProvider {
    async fn summarize(
        &self,
        code: &str,
        language_id: &str,
    ) -> Result<Vec<AnnotationUnit>, InferError> {
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(code, language_id),
            "stream": false
        });

        let response_value: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = extract_local_text_part(&response_value)?;
        parse_units(&text, code)
    }
}

/// Reads `.codetorch/config.toml` (creating it if needed) and builds the selected provider.
pub fn load_provider_from_config(
    workspace_root: impl AsRef<Path>,
    overrides: ProviderOverrides,
) -> Result<LoadedProvider, InferError> {
    let config = ensure_workspace_config(workspace_root)?;
    load_provider(&config.inference, overrides)
}

pub fn load_provider(
    config: &InferenceConfig,
    overrides: ProviderOverrides,
) -> Result<LoadedProvider, InferError> {
    let selected_provider = overrides.provider.unwrap_or(config.provider);
    let selected_model = first_non_empty(overrides.model, config.model.clone());
    let selected_endpoint = first_non_empty(overrides.endpoint, config.endpoint.clone());
    let selected_api_key_env =
        first_non_empty(overrides.api_key_env, Some(config.api_key_env.clone()))
            .unwrap_or_else(|| DEFAULT_GEMINI_API_KEY_ENV.to_owned());
    let retry_policy = RetryPolicy::from_config(config);

    let mock = || LoadedProvider {
        provider: Arc::new(MockProvider),
        provider_name: InferenceProviderKind::Mock.as_str().to_owned(),
        model_name: "mock".to_owned(),
        retry_policy,
    };

    let loaded = match selected_provider {
        InferenceProviderKind::Auto => match read_env_non_empty(&selected_api_key_env) {
            Some(api_key) => {
                let model = resolve_gemini_model(selected_model);
                LoadedProvider {
                    provider: Arc::new(GeminiProvider::new(api_key, model.clone())),
                    provider_name: InferenceProviderKind::Gemini.as_str().to_owned(),
                    model_name: model,
                    retry_policy,
                }
            }
            None => {
                tracing::info!(
                    api_key_env = %selected_api_key_env,
                    "no API key found, using mock summarization provider"
                );
                mock()
            }
        },
        InferenceProviderKind::Mock => mock(),
        InferenceProviderKind::Gemini => {
            let provider = GeminiProvider::from_env_key(&selected_api_key_env, selected_model)?;
            LoadedProvider {
                model_name: provider.model.clone(),
                provider: Arc::new(provider),
                provider_name: InferenceProviderKind::Gemini.as_str().to_owned(),
                retry_policy,
            }
        }
        InferenceProviderKind::Qwen3Local => {
            let provider = Qwen3LocalProvider::new(selected_endpoint, selected_model);
            LoadedProvider {
                model_name: provider.model.clone(),
                provider: Arc::new(provider),
                provider_name: InferenceProviderKind::Qwen3Local.as_str().to_owned(),
                retry_policy,
            }
        }
    };

    Ok(loaded)
}

fn extract_gemini_text_part(response: &Value) -> Result<&str, InferError> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InferError::InvalidResponse("missing candidates[0].content.parts[0].text".to_owned())
        })
}

fn extract_local_text_part(response: &Value) -> Result<String, InferError> {
    let candidate_paths = [
        "/response",
        "/text",
        "/output",
        "/message/content",
        "/choices/0/text",
        "/choices/0/message/content",
    ];

    for path in candidate_paths {
        match response.pointer(path) {
            Some(Value::String(text)) => return Ok(text.clone()),
            Some(value @ Value::Array(_)) => return Ok(value.to_string()),
            _ => {}
        }
    }

    Err(InferError::InvalidResponse(
        "missing local model text response body".to_owned(),
    ))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn resolve_gemini_model(model: Option<String>) -> String {
    normalize_optional(model).unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_owned())
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}

fn read_env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use tempfile::tempdir;

    use super::*;

    fn unique_env_name(prefix: &str) -> String {
        format!(
            "{prefix}_{}_{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        )
    }

    #[tokio::test]
    async fn mock_provider_summarizes_each_block() {
        let code = "function foo() {\n  const x = 1;\n\n  return x;\n}\n";

        let units = MockProvider
            .summarize(code, "typescript")
            .await
            .expect("mock provider should succeed");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].line, 1);
        assert_eq!(
            units[0].summary,
            "Mock typescript summary for `function foo() {`"
        );
        assert_eq!(units[0].chunk_code, "function foo() {\n  const x = 1;\n");
        assert_eq!(units[1].line, 4);
        assert_eq!(units[1].chunk_code, "  return x;\n}");

        let again = MockProvider
            .summarize(code, "typescript")
            .await
            .expect("mock provider should succeed");
        assert_eq!(units, again);
    }

    #[tokio::test]
    async fn mock_provider_returns_nothing_for_blank_code() {
        let units = MockProvider.summarize("\n  \n", "rust").await.expect("mock");
        assert!(units.is_empty());
    }

    #[test]
    fn local_response_text_is_found_in_common_shapes() {
        let ollama = json!({ "model": "qwen3:4b", "response": "1 | does a thing" });
        assert_eq!(
            extract_local_text_part(&ollama).expect("ollama shape"),
            "1 | does a thing"
        );

        let chat = json!({ "choices": [{ "message": { "content": "2: loops" } }] });
        assert_eq!(extract_local_text_part(&chat).expect("chat shape"), "2: loops");

        let structured = json!({ "output": [{ "line": 1, "summary": "s" }] });
        let text = extract_local_text_part(&structured).expect("array shape");
        assert_eq!(parse_units(&text, "fn a() {}\n").expect("units").len(), 1);

        assert!(extract_local_text_part(&json!({ "done": true })).is_err());
    }

    #[test]
    fn gemini_response_requires_candidate_text() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "1 | entry point" }] } }]
        });
        assert_eq!(
            extract_gemini_text_part(&response).expect("text part"),
            "1 | entry point"
        );
        assert!(extract_gemini_text_part(&json!({ "candidates": [] })).is_err());
    }

    #[test]
    fn load_provider_auto_chooses_mock_when_key_missing() {
        let temp = tempdir().expect("tempdir");

        let loaded = load_provider_from_config(
            temp.path(),
            ProviderOverrides {
                api_key_env: Some(unique_env_name("CODETORCH_TEST_MISSING_KEY")),
                ..ProviderOverrides::default()
            },
        )
        .expect("load provider");

        assert_eq!(loaded.provider_name, InferenceProviderKind::Mock.as_str());
        assert_eq!(loaded.model_name, "mock");
        assert_eq!(loaded.retry_policy, RetryPolicy::default());
    }

    #[test]
    fn load_provider_auto_chooses_gemini_when_key_present() {
        let temp = tempdir().expect("tempdir");
        let env_name = unique_env_name("CODETORCH_TEST_GEMINI_KEY");

        // SAFETY: test-scoped environment variable with unique name.
        unsafe {
            env::set_var(&env_name, "test-key");
        }

        let loaded = load_provider_from_config(
            temp.path(),
            ProviderOverrides {
                provider: Some(InferenceProviderKind::Auto),
                api_key_env: Some(env_name.clone()),
                ..ProviderOverrides::default()
            },
        )
        .expect("load provider");

        assert_eq!(loaded.provider_name, InferenceProviderKind::Gemini.as_str());
        assert_eq!(loaded.model_name, GEMINI_DEFAULT_MODEL);

        // SAFETY: cleanup of test-scoped environment variable.
        unsafe {
            env::remove_var(env_name);
        }
    }

    #[test]
    fn explicit_gemini_requires_the_key() {
        let env_name = unique_env_name("CODETORCH_TEST_ABSENT_KEY");

        let result = load_provider(
            &InferenceConfig::default(),
            ProviderOverrides {
                provider: Some(InferenceProviderKind::Gemini),
                api_key_env: Some(env_name.clone()),
                ..ProviderOverrides::default()
            },
        );

        match result {
            Err(InferError::MissingApiKey(var)) => assert_eq!(var, env_name),
            _ => panic!("expected missing key error"),
        }
    }

    #[test]
    fn qwen_overrides_take_precedence_over_config() {
        let config = InferenceConfig {
            provider: InferenceProviderKind::Qwen3Local,
            model: Some("qwen3:8b".to_owned()),
            max_retries: 5,
            ..InferenceConfig::default()
        };

        let loaded = load_provider(
            &config,
            ProviderOverrides {
                model: Some("  qwen3:14b ".to_owned()),
                ..ProviderOverrides::default()
            },
        )
        .expect("load provider");

        assert_eq!(loaded.provider_name, InferenceProviderKind::Qwen3Local.as_str());
        assert_eq!(loaded.model_name, "qwen3:14b");
        assert_eq!(loaded.retry_policy.max_retries, 5);
    }
}
