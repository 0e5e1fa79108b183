use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Citation, ConversationTurn, SearchFilters};

/// Sampling parameters forwarded to the model and folded into the
/// response-cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Provider-specific extras, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl GenerationParameters {
    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(0.7)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub query: String,
    pub model: String,
    pub use_rag: bool,
    #[serde(default)]
    pub parameters: GenerationParameters,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: model.into(),
            use_rag: true,
            parameters: GenerationParameters::default(),
            conversation_history: Vec::new(),
            filters: None,
            user_id: None,
        }
    }
}

/// The caller always receives a well-formed answer; degradation is
/// reported through `warnings`, never as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    pub timing: u64,
}

/// Write-once usage record. Fire-and-forget: losing one must never affect
/// the caller-visible result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub id: String,
    pub query: String,
    pub model: String,
    pub use_rag: bool,
    pub response_time_ms: u64,
    pub document_ids: Vec<String>,
    pub token_count: usize,
    pub recorded_at: DateTime<Utc>,
}

impl AnalyticsRecord {
    pub fn new(
        query: &str,
        model: &str,
        use_rag: bool,
        response_time_ms: u64,
        document_ids: Vec<String>,
        token_count: usize,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.to_string(),
            model: model.to_string(),
            use_rag,
            response_time_ms,
            document_ids,
            token_count,
            recorded_at: Utc::now(),
        }
    }
}
