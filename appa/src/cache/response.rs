use crate::config::{CacheTuning, GenerationConfig};
use crate::models::GenerationParameters;

use super::bounded::{BoundedCache, CacheStats};
use super::keys::digest_key;

/// Caches whole model responses, keyed by the prompt and every parameter
/// that changes the output. High-temperature, trivially short, and errored
/// responses are refused at admission.
pub struct ResponseCache {
    inner: BoundedCache<String>,
    temperature_ceiling: f32,
    min_response_len: usize,
}

const NAME: &str = "response";

impl ResponseCache {
    pub fn new(
        tuning: &CacheTuning,
        generation: &GenerationConfig,
        persist_dir: Option<&str>,
        debounce_ms: u64,
    ) -> Self {
        let inner = match (tuning.persist, persist_dir) {
            (true, Some(dir)) => {
                BoundedCache::persistent(NAME, tuning.ttl_secs, tuning.max_size, dir, debounce_ms)
            }
            _ => BoundedCache::new(NAME, tuning.ttl_secs, tuning.max_size),
        };
        Self {
            inner,
            temperature_ceiling: generation.cache_temperature_ceiling,
            min_response_len: generation.cache_min_response_len,
        }
    }

    pub fn disabled(generation: &GenerationConfig) -> Self {
        Self {
            inner: BoundedCache::disabled(NAME),
            temperature_ceiling: generation.cache_temperature_ceiling,
            min_response_len: generation.cache_min_response_len,
        }
    }

    pub fn key(
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> String {
        let params_json = serde_json::json!({
            "model": model,
            "system": system_prompt,
            "temperature": parameters.temperature,
            "max_tokens": parameters.max_tokens,
            "top_p": parameters.top_p,
            "extra": parameters.extra,
        });
        digest_key(&format!("{}|{params_json}", prompt.trim()))
    }

    /// Admission policy: nondeterministic output is not worth caching, and
    /// neither are near-empty or errored responses.
    pub fn should_cache(&self, temperature: f32, response_text: &str, has_error: bool) -> bool {
        !has_error
            && temperature <= self.temperature_ceiling
            && response_text.len() >= self.min_response_len
    }

    pub fn get(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Option<String> {
        self.inner
            .get(&Self::key(prompt, model, system_prompt, parameters))
    }

    /// Store a response if the admission policy allows it. Returns whether it
    /// was admitted.
    pub fn put(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
        response_text: &str,
        has_error: bool,
    ) -> bool {
        let temperature = parameters.temperature_or_default();
        if !self.should_cache(temperature, response_text, has_error) {
            tracing::debug!(temperature, len = response_text.len(), "Response not admitted to cache");
            return false;
        }

        self.inner.set(
            Self::key(prompt, model, system_prompt, parameters),
            response_text.to_string(),
        );
        true
    }

    pub fn clear(&self) {
        self.inner.clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn flush(&self) {
        self.inner.flush()
    }
}
