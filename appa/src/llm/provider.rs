use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{AppaError, Result};
use crate::llm::api::LlmApiClient;
use crate::models::GenerationParameters;
use crate::traits::LanguageModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

/// Production `LanguageModel` over any OpenAI-compatible chat API.
#[derive(Debug, Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    config: Option<Arc<LlmConfig>>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            _ => {
                if let Some(base_url) = &config.base_url {
                    LlmBackend::OpenAICompatible {
                        base_url: base_url.clone(),
                    }
                } else {
                    LlmBackend::Unavailable {
                        reason: format!("Unknown provider in model: {}", config.model),
                    }
                }
            }
        };

        Self {
            backend,
            config: Some(Arc::new(config.clone())),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            config: None,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, LlmBackend::Unavailable { .. })
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn config(&self) -> Option<&LlmConfig> {
        self.config.as_deref()
    }

    fn client(&self, model: &str) -> Result<LlmApiClient> {
        if !self.is_available() {
            return Err(AppaError::LlmUnavailable(self.unavailable_reason()));
        }

        let config = self
            .config()
            .ok_or_else(|| AppaError::LlmUnavailable("No config available".to_string()))?;

        LlmApiClient::new(config, model)
    }

    fn unavailable_reason(&self) -> String {
        match &self.backend {
            LlmBackend::Unavailable { reason } => reason.clone(),
            _ => "LLM backend not configured".to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for LlmProvider {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<String> {
        self.client(model)?
            .complete(prompt, system_prompt, parameters)
            .await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<BoxStream<'static, Result<String>>> {
        self.client(model)?
            .complete_stream(prompt, system_prompt, parameters)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_resolution() {
        let config = LlmConfig {
            model: "openrouter/meta-llama/llama-3.1-70b".to_string(),
            api_key: Some("sk".to_string()),
            base_url: None,
            timeout_secs: 30,
            max_retries: 0,
        };
        let provider = LlmProvider::new(Some(&config));
        // "openrouter" prefix wins; the rest of the path is the model name
        assert_eq!(provider.backend(), &LlmBackend::OpenRouter);
        assert!(provider.is_available());
    }

    #[test]
    fn test_unknown_provider_with_base_url_is_compatible() {
        let config = LlmConfig {
            model: "custom-model".to_string(),
            api_key: None,
            base_url: Some("http://inference.internal/v1".to_string()),
            timeout_secs: 30,
            max_retries: 0,
        };
        let provider = LlmProvider::new(Some(&config));
        assert_eq!(
            provider.backend(),
            &LlmBackend::OpenAICompatible {
                base_url: "http://inference.internal/v1".to_string()
            }
        );
    }

    #[test]
    fn test_missing_config_is_unavailable() {
        let provider = LlmProvider::new(None);
        assert!(!provider.is_available());
    }

    #[tokio::test]
    async fn test_generate_fails_fast_when_unavailable() {
        let provider = LlmProvider::unavailable("tests");
        let result = provider
            .generate("prompt", "m", None, &GenerationParameters::default())
            .await;
        assert!(matches!(result, Err(AppaError::LlmUnavailable(_))));
    }
}
