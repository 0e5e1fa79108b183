use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{AppaError, Result},
    models::GenerationParameters,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    /// Build a client for `model` (provider-prefixed, e.g. `openai/gpt-4o-mini`),
    /// falling back to the configured model when empty.
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        let model = if model.is_empty() { &config.model } else { model };
        let api_config = ApiConfig::resolve(config, model);

        let (provider, _) = parse_llm_provider_model(model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(AppaError::Llm(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                AppaError::Llm(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        // Retries happen in exactly one place, the loop in complete().
        // async-openai carries its own backoff that re-sends failed requests
        // (by default for up to 15 minutes); a zero max_elapsed_time makes
        // its first next_backoff return None, so every failure surfaces to
        // the outer loop after a single request.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::ZERO),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(AppaError::Validation("Prompt cannot be empty".to_string()));
        }

        let mut last_error: Option<AppaError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = self.build_request(prompt, system_prompt, parameters)?;

            match self.client.chat().create(request).await {
                Ok(response) => return Self::extract_content(response),
                Err(error) => {
                    if let Some(rate_limit_error) = Self::rate_limit_error(&error) {
                        return Err(rate_limit_error);
                    }

                    if let Some(auth_error) = Self::auth_error(&error) {
                        return Err(auth_error);
                    }

                    let retryable = Self::is_retryable(&error);
                    let mapped_error = Self::map_openai_error(error);

                    if retryable && attempt < self.config.max_retries {
                        last_error = Some(mapped_error);
                        continue;
                    }

                    return Err(mapped_error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppaError::Llm("LLM completion failed after retries".to_string())))
    }

    /// One token-content delta per item. No retry loop: a stream that breaks
    /// mid-flight cannot be resumed transparently.
    pub async fn complete_stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<BoxStream<'static, Result<String>>> {
        if prompt.trim().is_empty() {
            return Err(AppaError::Validation("Prompt cannot be empty".to_string()));
        }

        let request = self.build_request(prompt, system_prompt, parameters)?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(Self::map_openai_error)?;

        let mapped = stream.filter_map(|item| {
            futures::future::ready(match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(error) => Some(Err(Self::map_openai_error(error))),
            })
        });

        Ok(Box::pin(mapped))
    }

    fn build_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|error| {
                        AppaError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|error| AppaError::Validation(format!("Invalid user prompt: {error}")))?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);

        if let Some(temperature) = parameters.temperature {
            request.temperature(temperature);
        }
        if let Some(max_tokens) = parameters.max_tokens {
            request.max_tokens(max_tokens);
        }
        if let Some(top_p) = parameters.top_p {
            request.top_p(top_p);
        }

        request.build().map_err(|error| {
            AppaError::Validation(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppaError::Llm("LLM response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(AppaError::Llm(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(message)
    }

    fn is_retryable(error: &OpenAIError) -> bool {
        match error {
            OpenAIError::ApiError(api_error) => {
                api_error.r#type.is_none() && api_error.code.is_none()
            }
            OpenAIError::Reqwest(reqwest_error) => reqwest_error
                .status()
                .map(|status| status.is_server_error())
                .unwrap_or(true),
            _ => false,
        }
    }

    fn rate_limit_error(error: &OpenAIError) -> Option<AppaError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) =>
            {
                Some(AppaError::LlmRateLimit { retry_after: None })
            }
            OpenAIError::ApiError(api_error) if Self::is_rate_limit_api_error(api_error) => {
                Some(AppaError::LlmRateLimit { retry_after: None })
            }
            _ => None,
        }
    }

    fn auth_error(error: &OpenAIError) -> Option<AppaError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                    || reqwest_error.status() == Some(reqwest::StatusCode::FORBIDDEN) =>
            {
                Some(AppaError::Llm(format!(
                    "LLM authentication failed: {reqwest_error}"
                )))
            }
            OpenAIError::ApiError(api_error) if Self::is_auth_api_error(api_error) => Some(
                AppaError::Llm(format!("LLM authentication failed: {api_error}")),
            ),
            _ => None,
        }
    }

    fn is_rate_limit_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("rate limit")
            || message.contains("too many requests")
            || error_type.contains("rate_limit")
            || code.contains("rate_limit")
            || code == "insufficient_quota"
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("unauthorized")
            || message.contains("forbidden")
            || message.contains("authentication")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
            || code.contains("authentication")
            || error_type.contains("authentication")
    }

    fn map_openai_error(error: OpenAIError) -> AppaError {
        match error {
            OpenAIError::Reqwest(reqwest_error) => {
                AppaError::Llm(format!("LLM request failed: {reqwest_error}"))
            }
            OpenAIError::ApiError(api_error) => {
                AppaError::Llm(format!("LLM API error: {api_error}"))
            }
            OpenAIError::JSONDeserialize(err) => {
                AppaError::Llm(format!("Failed to parse LLM response: {err}"))
            }
            OpenAIError::InvalidArgument(message) => AppaError::Validation(message),
            other => AppaError::Llm(other.to_string()),
        }
    }
}

impl ApiConfig {
    fn resolve(config: &LlmConfig, model: &str) -> Self {
        let (provider, bare_model) = parse_llm_provider_model(model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            model.to_string()
        } else {
            bare_model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_llm_config() -> LlmConfig {
        LlmConfig {
            model: "ollama/llama3".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            max_retries: 0,
        }
    }

    #[test]
    fn test_provider_without_key_is_rejected() {
        let config = LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            ..test_llm_config()
        };
        let result = LlmApiClient::new(&config, "");
        assert!(matches!(result, Err(AppaError::Llm(_))));
    }

    #[test]
    fn test_local_providers_need_no_key() {
        let config = test_llm_config();
        assert!(LlmApiClient::new(&config, "").is_ok());
        assert!(LlmApiClient::new(&config, "lmstudio/mistral").is_ok());
    }

    #[test]
    fn test_request_model_overrides_config_model() {
        let config = test_llm_config();
        let client = LlmApiClient::new(&config, "ollama/qwen2").unwrap();
        assert_eq!(client.config.model, "qwen2");
    }

    #[test]
    fn test_local_model_keeps_full_name() {
        let config = LlmConfig {
            model: "my-org/custom".to_string(),
            base_url: Some("http://localhost:9999/v1".to_string()),
            ..test_llm_config()
        };
        let client = LlmApiClient::new(&config, "").unwrap();
        assert_eq!(client.config.model, "my-org/custom");
        assert_eq!(client.config.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_default_base_urls() {
        assert_eq!(default_base_url("openai"), OPENAI_BASE_URL);
        assert_eq!(default_base_url("OpenRouter"), OPENROUTER_BASE_URL);
        assert_eq!(default_base_url("ollama"), OLLAMA_BASE_URL);
        assert_eq!(default_base_url("anything-else"), OPENAI_BASE_URL);
    }
}
