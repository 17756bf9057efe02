//! LLM interaction: send one screening prompt, get one completion back.
//!
//! The module has two layers:
//!
//! * a [`CompletionBackend`] performs exactly one request against a
//!   provider. Two ship with the crate: [`CompatibleBackend`] speaks the
//!   OpenAI-compatible `chat/completions` protocol over `reqwest` (DashScope,
//!   DeepSeek, vLLM, …) and [`ProviderBackend`] wraps any
//!   `edgequake_llm::LLMProvider`;
//! * an [`ApiClient`] adds the fixed system instruction, deterministic
//!   decoding, request pacing and the bounded retry loop on top of a backend.
//!
//! All prompt text lives in [`crate::prompts`] so it can change without
//! touching retry or error-handling logic here.
//!
//! ## Retry Strategy
//!
//! Any error is retried, up to `max_attempts` attempts in total. The wait
//! before retry `n` is `retry_initial_ms * 2^(n-1)` capped at
//! `retry_max_ms`: with the defaults (4 s, 10 s, 3 attempts) that is
//! 4 s → 8 s. Every attempt is also preceded by a fixed pacing delay
//! (`request_delay_ms`, 1 s by default) to stay under per-key rate limits.

use crate::config::ScreeningConfig;
use crate::error::{ApiError, ScreenerError};
use crate::prompts::SYSTEM_INSTRUCTION;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One completion request, already fully rendered.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A single-shot completion call against some provider.
///
/// Implementations must not retry; [`ApiClient`] owns the retry policy.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Provider label used in logs and error messages.
    fn name(&self) -> &str;

    /// Send `request` and return the completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError>;
}

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Attempt budget and backoff window for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): doubles from the initial
    /// backoff and never exceeds the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Screening-aware wrapper around a [`CompletionBackend`].
///
/// Cheap to share: clone the `Arc` it is stored in and call
/// [`ApiClient::get_completion`] from any number of workers.
pub struct ApiClient {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
    max_tokens: usize,
    request_delay: Duration,
}

impl ApiClient {
    /// Build a client around `backend` using the limits from `config`.
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &ScreeningConfig) -> Self {
        Self {
            backend,
            policy: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                initial_backoff: Duration::from_millis(config.retry_initial_ms),
                max_backoff: Duration::from_millis(config.retry_max_ms.max(config.retry_initial_ms)),
            },
            max_tokens: config.max_tokens,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Build the backend named by `config` and wrap it.
    pub fn from_config(config: &ScreeningConfig) -> Result<Self, ScreenerError> {
        let backend = build_backend(config)?;
        info!(
            "API client initialised for provider: {}, model: {}",
            backend.name(),
            config.model
        );
        Ok(Self::new(backend, config))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `prompt` with the fixed system instruction and return the
    /// completion text.
    ///
    /// Failures before the last attempt are logged and swallowed; only when
    /// every attempt fails is [`ApiError::RetriesExhausted`] returned.
    pub async fn get_completion(&self, prompt: &str) -> Result<String, ApiError> {
        let request = build_request(prompt, self.max_tokens);
        let mut last_err: Option<String> = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                let backoff = self.policy.backoff(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.backend.name(),
                    attempt - 1,
                    self.policy.max_attempts - 1,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            // Simple rate limiting.
            if !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }

            match self.backend.complete(&request).await {
                Ok(content) => {
                    debug!("API call successful on attempt {}", attempt);
                    return Ok(content);
                }
                Err(e) => {
                    warn!(
                        "{}: attempt {} failed: {}",
                        self.backend.name(),
                        attempt,
                        e
                    );
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(ApiError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last_error: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Assemble the request sent for every document.
fn build_request(prompt: &str, max_tokens: usize) -> CompletionRequest {
    CompletionRequest {
        system: SYSTEM_INSTRUCTION.to_string(),
        prompt: prompt.to_string(),
        max_tokens,
        temperature: 0.0,
    }
}

/// Pick the backend for `config`.
///
/// A configured `base_url` always means the OpenAI-compatible protocol with
/// an explicit key; otherwise the provider name is handed to
/// [`ProviderFactory`], which reads that provider's own key variable.
pub fn build_backend(config: &ScreeningConfig) -> Result<Arc<dyn CompletionBackend>, ScreenerError> {
    if let Some(ref base_url) = config.base_url {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| ScreenerError::ProviderNotConfigured {
                provider: config.provider.clone(),
                hint: format!(
                    "API key is not set. Set 'api_key' in the config file or the {} environment variable.",
                    config.api_key_env
                ),
            })?;
        let backend = CompatibleBackend::new(
            &config.provider,
            base_url,
            &api_key,
            &config.model,
            Duration::from_secs(config.api_timeout_secs),
        )?;
        return Ok(Arc::new(backend));
    }

    let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model).map_err(
        |e| ScreenerError::ProviderNotConfigured {
            provider: config.provider.clone(),
            hint: format!("{e}"),
        },
    )?;
    Ok(Arc::new(ProviderBackend::new(&config.provider, provider)))
}

// ── OpenAI-compatible backend ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatCompletionMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend for any endpoint that implements `POST {base_url}/chat/completions`
/// with Bearer authentication.
pub struct CompatibleBackend {
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CompatibleBackend {
    /// `base_url` is the API root including the version segment, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ScreenerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ScreenerError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name: name.to_string(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for CompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatCompletionMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatCompletionMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Http(format!("Failed to decode response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ApiError::EmptyResponse)
    }
}

// ── edgequake-llm backend ────────────────────────────────────────────────────

/// Backend delegating to an `edgequake-llm` provider (OpenAI, Anthropic,
/// Gemini, Ollama, …). Library callers can inject a pre-built provider, e.g.
/// one with caching middleware.
pub struct ProviderBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl ProviderBackend {
    pub fn new(name: &str, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ApiError::Provider {
                provider: self.name.clone(),
                detail: format!("{e}"),
            })?;

        if response.content.trim().is_empty() {
            return Err(ApiError::EmptyResponse);
        }
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then echoes the prompt.
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(ApiError::Status {
                    status: 503,
                    body: format!("overloaded #{n}"),
                })
            } else {
                Ok(format!("echo: {}", request.prompt))
            }
        }
    }

    fn fast_config() -> ScreeningConfig {
        ScreeningConfig::builder()
            .retry_backoff_ms(0, 0)
            .request_delay_ms(0)
            .build()
            .unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(4));
        assert_eq!(p.backoff(2), Duration::from_secs(8));
        assert_eq!(p.backoff(3), Duration::from_secs(10));
        assert_eq!(p.backoff(30), Duration::from_secs(10));
    }

    #[test]
    fn client_policy_follows_config() {
        let backend = Arc::new(FlakyBackend {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let client = ApiClient::new(backend, &ScreeningConfig::default());
        assert_eq!(client.policy(), RetryPolicy::default());
    }

    #[test]
    fn request_is_deterministic_with_system_instruction() {
        let req = build_request("hello", 1500);
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 1500);
        assert_eq!(req.system, SYSTEM_INSTRUCTION);
        assert_eq!(req.prompt, "hello");
    }

    #[tokio::test]
    async fn two_failures_then_success_is_returned() {
        let backend = Arc::new(FlakyBackend {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let client = ApiClient::new(backend.clone(), &fast_config());

        let out = client.get_completion("paper").await.unwrap();
        assert_eq!(out, "echo: paper");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_last_error() {
        let backend = Arc::new(FlakyBackend {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let client = ApiClient::new(backend.clone(), &fast_config());

        let err = client.get_completion("paper").await.unwrap_err();
        match err {
            ApiError::RetriesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("overloaded #3"), "got: {last_error}");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn compatible_backend_endpoint_joins_cleanly() {
        let b = CompatibleBackend::new(
            "qwen",
            "https://dashscope.aliyuncs.com/compatible-mode/v1/",
            "sk-test",
            "qwen-vl-max",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            b.endpoint(),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn build_backend_requires_key_for_compatible_endpoint() {
        let config = ScreeningConfig {
            api_key: None,
            api_key_env: "PAPER_SCREENER_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };
        let err = build_backend(&config).err().expect("should fail without key");
        assert!(matches!(err, ScreenerError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn response_without_content_decodes() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{ "choices": [ { "message": { "content": null } } ] }"#)
                .unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
