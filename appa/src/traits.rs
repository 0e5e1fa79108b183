use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{AnalyticsRecord, GenerationParameters, RetrievedChunk, SearchFilters};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Retrieval parameters recommended by the judge for one query. Consumed
/// verbatim; the orchestrator never reinterprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub k: usize,
    pub threshold: f32,
    pub rerank: bool,
}

/// Judge verdict over a candidate set: per-chunk scores keyed by chunk id,
/// plus whether the query itself should be refined and retried.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkEvaluation {
    pub scores: HashMap<String, f32>,
    pub needs_refinement: bool,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Similarity search over the external vector store.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// The language-model inference service, whole-response or token stream.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<String>;

    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        parameters: &GenerationParameters,
    ) -> Result<BoxStream<'static, Result<String>>>;
}

/// Advisory collaborator that recommends retrieval parameters and
/// scores/refines candidate chunks. Its recommendations are opaque.
#[async_trait]
pub trait RetrievalJudge: Send + Sync {
    async fn analyze_query(&self, query: &str) -> Result<RetrievalPlan>;

    async fn evaluate_chunks(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<ChunkEvaluation>;

    async fn refine_query(&self, query: &str, chunks: &[RetrievedChunk]) -> Result<String>;

    async fn optimize_context(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Document-interaction notifications. Best-effort, fire-and-forget.
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn record_interaction(
        &self,
        user_id: &str,
        document_id: &str,
        interaction_type: &str,
        data: serde_json::Value,
    ) -> Result<()>;
}

/// Usage analytics. Best-effort, retried cheaply, losses swallowed.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, record: AnalyticsRecord) -> Result<()>;
}
