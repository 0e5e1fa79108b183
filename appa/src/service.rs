use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use crate::cache::CacheManager;
use crate::config::Config;
use crate::error::Result;
use crate::generation::GenerationPipeline;
use crate::models::{AnalyticsRecord, AnswerRequest, AnswerResponse, Citation};
use crate::retrieval::{RetrievalOrchestrator, RetrievalOutcome};
use crate::traits::{AnalyticsSink, LanguageModel, MemoryService, RetrievalJudge, VectorSearch};

/// Front door of the pipeline: retrieval, generation, recovery and
/// analytics behind one call. The only hard failure is an unrecoverable
/// model call; everything else degrades into `warnings`.
pub struct AnswerService {
    retrieval: RetrievalOrchestrator,
    generation: GenerationPipeline,
}

/// Streaming answers resolve citations before the first token so clients
/// can render sources while text arrives.
pub struct StreamingAnswer {
    pub citations: Vec<Citation>,
    pub warnings: Vec<String>,
    pub stream: BoxStream<'static, Result<String>>,
}

impl AnswerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        model: Arc<dyn LanguageModel>,
        judge: Option<Arc<dyn RetrievalJudge>>,
        memory: Option<Arc<dyn MemoryService>>,
        analytics: Option<Arc<dyn AnalyticsSink>>,
        config: &Config,
    ) -> Self {
        let caches = Arc::new(CacheManager::new(&config.cache, &config.generation));
        let retrieval = RetrievalOrchestrator::new(
            vector,
            judge,
            memory,
            Arc::clone(&caches),
            config.retrieval.clone(),
            config.generation.side_channel_timeout_secs,
        );
        let generation = GenerationPipeline::new(
            model,
            caches,
            analytics,
            config.generation.clone(),
        );
        Self {
            retrieval,
            generation,
        }
    }

    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerResponse> {
        let started = Instant::now();
        let retrieval = self.retrieve_if_requested(&request).await;

        let generated = self.generation.generate(&request, &retrieval).await?;
        let timing = started.elapsed().as_millis() as u64;

        self.generation.record_analytics(AnalyticsRecord::new(
            &request.query,
            &request.model,
            request.use_rag,
            timing,
            document_ids(&retrieval),
            approximate_tokens(&generated.text),
        ));

        info!(
            model = %request.model,
            use_rag = request.use_rag,
            from_cache = generated.from_cache,
            timing_ms = timing,
            "Answered query"
        );

        Ok(AnswerResponse {
            answer_text: generated.text,
            citations: retrieval.citations,
            warnings: retrieval.warnings,
            timing,
        })
    }

    pub async fn answer_stream(&self, request: AnswerRequest) -> Result<StreamingAnswer> {
        let started = Instant::now();
        let retrieval = self.retrieve_if_requested(&request).await;
        let mut inner = self.generation.generate_stream(&request, &retrieval).await?;

        let generation = self.generation.clone();
        let ids = document_ids(&retrieval);
        let query = request.query.clone();
        let model = request.model.clone();
        let use_rag = request.use_rag;

        // Token count is only known once the model stops, so the usage
        // event fires when the wrapped stream terminates.
        let stream: BoxStream<'static, Result<String>> = Box::pin(async_stream::stream! {
            let mut tokens = 0usize;
            while let Some(piece) = inner.next().await {
                if let Ok(text) = &piece {
                    tokens += approximate_tokens(text);
                }
                yield piece;
            }
            generation.record_analytics(AnalyticsRecord::new(
                &query,
                &model,
                use_rag,
                started.elapsed().as_millis() as u64,
                ids,
                tokens,
            ));
        });

        Ok(StreamingAnswer {
            citations: retrieval.citations,
            warnings: retrieval.warnings,
            stream,
        })
    }

    async fn retrieve_if_requested(&self, request: &AnswerRequest) -> RetrievalOutcome {
        if !request.use_rag {
            return RetrievalOutcome::empty();
        }
        self.retrieval
            .retrieve(
                &request.query,
                &request.conversation_history,
                request.filters.as_ref(),
                request.user_id.as_deref(),
            )
            .await
    }
}

fn document_ids(retrieval: &RetrievalOutcome) -> Vec<String> {
    let mut ids: Vec<String> = retrieval
        .chunks
        .iter()
        .map(|c| c.document_id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Whitespace token count, good enough for usage accounting.
fn approximate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_ids_deduplicated_and_sorted() {
        let mut outcome = RetrievalOutcome::empty();
        for (chunk_id, doc) in [("c1", "d2"), ("c2", "d1"), ("c3", "d2")] {
            outcome.chunks.push(crate::models::RetrievedChunk {
                chunk_id: chunk_id.to_string(),
                content: "x".to_string(),
                document_id: doc.to_string(),
                filename: "f".to_string(),
                tags: Vec::new(),
                folder: None,
                distance: 0.1,
                relevance_score: None,
            });
        }
        assert_eq!(document_ids(&outcome), vec!["d1", "d2"]);
    }

    #[test]
    fn test_token_approximation() {
        assert_eq!(approximate_tokens("three plain words"), 3);
        assert_eq!(approximate_tokens(""), 0);
    }
}
