use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cache: CacheSettings,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub llm: Option<LlmConfig>,
}

/// Per-cache tuning plus a global kill switch.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Root directory for persisted cache snapshots, one subdirectory per cache.
    pub persist_dir: String,
    /// Milliseconds to hold back snapshot writes; 0 writes through on every mutation.
    pub persist_debounce_ms: u64,
    pub retrieval: CacheTuning,
    pub document: CacheTuning,
    pub response: CacheTuning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheTuning {
    pub ttl_secs: u64,
    pub max_size: usize,
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate count requested from the vector store in the standard path.
    pub top_k: usize,
    /// Minimum relevance score (1 - distance) a chunk must reach to be kept.
    pub min_relevance: f32,
    /// Minimum assembled context length before the insufficient-context note kicks in.
    pub min_context_chars: usize,
    /// Trailing characters of formatted history appended to the search string.
    pub history_suffix_chars: usize,
    /// Route queries through the retrieval judge when one is wired in.
    pub use_judge: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Conversation turns included in the user prompt, newest first.
    pub history_turns: usize,
    /// Responses generated above this temperature are never cached.
    pub cache_temperature_ceiling: f32,
    /// Responses shorter than this are not worth caching.
    pub cache_min_response_len: usize,
    pub analytics_max_retries: u32,
    pub analytics_backoff_ms: u64,
    /// Upper bound on best-effort side-channel calls (memory notifications, final flushes).
    pub side_channel_timeout_secs: u64,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CacheTuning {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_size: 100,
            persist: false,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            persist_dir: ".appa_cache".to_string(),
            persist_debounce_ms: 0,
            retrieval: CacheTuning {
                ttl_secs: 1800,
                max_size: 100,
                persist: false,
            },
            document: CacheTuning {
                ttl_secs: 3600,
                max_size: 200,
                persist: false,
            },
            response: CacheTuning::default(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 15,
            min_relevance: 0.4,
            min_context_chars: 50,
            history_suffix_chars: 200,
            use_judge: false,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            history_turns: 5,
            cache_temperature_ceiling: 0.5,
            cache_min_response_len: 10,
            analytics_max_retries: 3,
            analytics_backoff_ms: 200,
            side_channel_timeout_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                enabled: parse_env_or("APPA_CACHE_ENABLED", true),
                persist_dir: env::var("APPA_CACHE_DIR").unwrap_or_else(|_| ".appa_cache".to_string()),
                persist_debounce_ms: parse_env_or("APPA_CACHE_DEBOUNCE_MS", 0),
                retrieval: CacheTuning {
                    ttl_secs: parse_env_or("APPA_RETRIEVAL_CACHE_TTL", 1800),
                    max_size: parse_env_or("APPA_RETRIEVAL_CACHE_SIZE", 100),
                    persist: parse_env_or("APPA_RETRIEVAL_CACHE_PERSIST", false),
                },
                document: CacheTuning {
                    ttl_secs: parse_env_or("APPA_DOCUMENT_CACHE_TTL", 3600),
                    max_size: parse_env_or("APPA_DOCUMENT_CACHE_SIZE", 200),
                    persist: parse_env_or("APPA_DOCUMENT_CACHE_PERSIST", false),
                },
                response: CacheTuning {
                    ttl_secs: parse_env_or("APPA_RESPONSE_CACHE_TTL", 3600),
                    max_size: parse_env_or("APPA_RESPONSE_CACHE_SIZE", 100),
                    persist: parse_env_or("APPA_RESPONSE_CACHE_PERSIST", false),
                },
            },
            retrieval: RetrievalConfig {
                top_k: parse_env_or("APPA_RETRIEVAL_TOP_K", 15),
                min_relevance: parse_env_or("APPA_MIN_RELEVANCE", 0.4),
                min_context_chars: parse_env_or("APPA_MIN_CONTEXT_CHARS", 50),
                history_suffix_chars: parse_env_or("APPA_HISTORY_SUFFIX_CHARS", 200),
                use_judge: parse_env_or("APPA_USE_JUDGE", false),
            },
            generation: GenerationConfig {
                history_turns: parse_env_or("APPA_HISTORY_TURNS", 5),
                cache_temperature_ceiling: parse_env_or("APPA_CACHE_TEMPERATURE_CEILING", 0.5),
                cache_min_response_len: parse_env_or("APPA_CACHE_MIN_RESPONSE_LEN", 10),
                analytics_max_retries: parse_env_or("APPA_ANALYTICS_MAX_RETRIES", 3),
                analytics_backoff_ms: parse_env_or("APPA_ANALYTICS_BACKOFF_MS", 200),
                side_channel_timeout_secs: parse_env_or("APPA_SIDE_CHANNEL_TIMEOUT", 5),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
            }),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads every `APPA_*` / `LLM_*` variable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_cache_settings_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::remove_var("APPA_CACHE_ENABLED");
        std::env::remove_var("APPA_RETRIEVAL_CACHE_TTL");

        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.retrieval.ttl_secs, 1800);
        assert_eq!(config.cache.document.max_size, 200);
        assert_eq!(config.cache.persist_debounce_ms, 0);
    }

    #[test]
    fn test_retrieval_config_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::remove_var("APPA_RETRIEVAL_TOP_K");
        std::env::remove_var("APPA_MIN_RELEVANCE");

        let config = Config::default();
        assert_eq!(config.retrieval.top_k, 15);
        assert_eq!(config.retrieval.min_relevance, 0.4);
        assert_eq!(config.retrieval.min_context_chars, 50);
        assert!(!config.retrieval.use_judge);
    }

    #[test]
    fn test_generation_admission_constants_from_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("APPA_CACHE_TEMPERATURE_CEILING", "0.3");
        std::env::set_var("APPA_CACHE_MIN_RESPONSE_LEN", "25");

        let config = Config::default();
        assert_eq!(config.generation.cache_temperature_ceiling, 0.3);
        assert_eq!(config.generation.cache_min_response_len, 25);

        std::env::remove_var("APPA_CACHE_TEMPERATURE_CEILING");
        std::env::remove_var("APPA_CACHE_MIN_RESPONSE_LEN");
    }

    #[test]
    fn test_llm_config_absent_without_model() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::remove_var("LLM_MODEL");
        let config = Config::default();
        assert!(config.llm.is_none());

        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        let config = Config::default();
        let llm = config.llm.unwrap();
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 30);
        assert_eq!(llm.max_retries, 3);

        std::env::remove_var("LLM_MODEL");
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(
            parse_llm_provider_model("openai/gpt-4o-mini"),
            ("openai", "gpt-4o-mini")
        );
        assert_eq!(
            parse_llm_provider_model("ollama/llama3"),
            ("ollama", "llama3")
        );
        assert_eq!(
            parse_llm_provider_model("my-local-model"),
            ("local", "my-local-model")
        );
        // Unknown prefixes fall through to local with the slash kept
        assert_eq!(
            parse_llm_provider_model("acme/secret"),
            ("local", "acme/secret")
        );
    }

    #[test]
    fn test_parse_env_or_invalid_value_falls_back() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::set_var("__APPA_TEST_PARSE", "not-a-number");
        let result: usize = parse_env_or("__APPA_TEST_PARSE", 42);
        assert_eq!(result, 42);
        std::env::remove_var("__APPA_TEST_PARSE");
    }
}
