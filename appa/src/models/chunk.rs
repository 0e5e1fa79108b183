use serde::{Deserialize, Serialize};

/// A retrievable unit of document text as returned by the vector store.
///
/// Produced by the `VectorSearch` collaborator and consumed read-only by the
/// retrieval orchestrator; never persisted outside the retrieval cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folder: Option<String>,
    /// Similarity distance from the vector store; lower is closer.
    pub distance: f32,
    /// Judge-assigned score. When absent, relevance falls back to `1 - distance`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl RetrievedChunk {
    pub fn relevance(&self) -> f32 {
        self.relevance_score.unwrap_or(1.0 - self.distance)
    }
}

/// One citation per retained chunk, lifetime of a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub chunk_id: String,
    pub relevance_score: f32,
    pub excerpt: String,
    pub filename: String,
    pub tags: Vec<String>,
    pub folder: Option<String>,
}

const EXCERPT_MAX_CHARS: usize = 200;

impl Citation {
    pub fn from_chunk(chunk: &RetrievedChunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            relevance_score: chunk.relevance(),
            excerpt: chunk.content.chars().take(EXCERPT_MAX_CHARS).collect(),
            filename: chunk.filename.clone(),
            tags: chunk.tags.clone(),
            folder: chunk.folder.clone(),
        }
    }
}

/// Metadata criteria forwarded to the vector store and folded into cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
}
