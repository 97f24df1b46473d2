use std::time::Duration;

use codetorch_config::InferenceConfig;
use codetorch_core::AnnotationUnit;
use tokio::time::{sleep, timeout};

use crate::{InferError, SummarizationProvider};

const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_MAX_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            ..Self::default()
        }
    }

    pub fn total_attempts(&self) -> usize {
        self.max_retries + 1
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let base = self.backoff_base.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor)).min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: codetorch_config::DEFAULT_INFERENCE_MAX_RETRIES,
            attempt_timeout: Duration::from_secs(
                codetorch_config::DEFAULT_INFERENCE_ATTEMPT_TIMEOUT_SECS,
            ),
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(BACKOFF_MAX_MS),
        }
    }
}

/// Calls the provider until it succeeds, bounding each attempt by the policy timeout
/// and sleeping with exponential backoff between attempts.
pub async fn summarize_with_retries(
    provider: &dyn SummarizationProvider,
    code: &str,
    language_id: &str,
    policy: RetryPolicy,
) -> Result<Vec<AnnotationUnit>, InferError> {
    let total_attempts = policy.total_attempts();
    let mut last_error = String::from("inference failed without an error message");

    for attempt in 0..total_attempts {
        match timeout(policy.attempt_timeout, provider.summarize(code, language_id)).await {
            Ok(Ok(units)) => return Ok(units),
            Ok(Err(err)) => {
                last_error = format!("attempt {}/{} failed: {err}", attempt + 1, total_attempts);
            }
            Err(_) => {
                last_error = format!(
                    "attempt {}/{} timed out after {}s",
                    attempt + 1,
                    total_attempts,
                    policy.attempt_timeout.as_secs()
                );
            }
        }
        tracing::debug!(attempt = attempt + 1, error = %last_error, "summarization attempt failed");

        if attempt + 1 < total_attempts {
            sleep(policy.backoff(attempt)).await;
        }
    }

    Err(InferError::RetriesExhausted(last_error))
}
