use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheManager;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{Citation, ConversationTurn, RetrievedChunk, SearchFilters};
use crate::traits::{MemoryService, RetrievalJudge, VectorSearch};

use super::context::{build_search_string, format_context_blocks, INSUFFICIENT_CONTEXT_NOTE};

/// Everything downstream stages need from one retrieval pass.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub context: String,
    pub citations: Vec<Citation>,
    pub chunks: Vec<RetrievedChunk>,
    /// True when the context is the insufficient-context sentinel.
    pub insufficient: bool,
    pub warnings: Vec<String>,
}

impl RetrievalOutcome {
    /// Outcome for a request that skipped retrieval entirely.
    pub fn empty() -> Self {
        Self {
            context: String::new(),
            citations: Vec::new(),
            chunks: Vec::new(),
            insufficient: false,
            warnings: Vec::new(),
        }
    }

    fn insufficient(warnings: Vec<String>) -> Self {
        Self {
            context: INSUFFICIENT_CONTEXT_NOTE.to_string(),
            citations: Vec::new(),
            chunks: Vec::new(),
            insufficient: true,
            warnings,
        }
    }
}

/// Turns a query plus optional history into a grounded context block and
/// citation list, via single-pass retrieval or the judge-escalated
/// multi-pass variant.
pub struct RetrievalOrchestrator {
    vector: Arc<dyn VectorSearch>,
    judge: Option<Arc<dyn RetrievalJudge>>,
    memory: Option<Arc<dyn MemoryService>>,
    caches: Arc<CacheManager>,
    config: RetrievalConfig,
    side_channel_timeout: Duration,
}

impl RetrievalOrchestrator {
    pub fn new(
        vector: Arc<dyn VectorSearch>,
        judge: Option<Arc<dyn RetrievalJudge>>,
        memory: Option<Arc<dyn MemoryService>>,
        caches: Arc<CacheManager>,
        config: RetrievalConfig,
        side_channel_timeout_secs: u64,
    ) -> Self {
        Self {
            vector,
            judge,
            memory,
            caches,
            config,
            side_channel_timeout: Duration::from_secs(side_channel_timeout_secs),
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        history: &[ConversationTurn],
        filters: Option<&SearchFilters>,
        user_id: Option<&str>,
    ) -> RetrievalOutcome {
        let search_string =
            build_search_string(query, history, self.config.history_suffix_chars);

        match self.judge.as_ref().filter(|_| self.config.use_judge) {
            Some(judge) => {
                let judge = Arc::clone(judge);
                match self
                    .retrieve_with_judge(query, &search_string, filters, user_id, judge)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(error = %e, "Judge-escalated retrieval failed, falling back to standard");
                        let mut outcome =
                            self.retrieve_standard(&search_string, filters).await;
                        outcome
                            .warnings
                            .push("retrieval judge unavailable; used standard retrieval".to_string());
                        outcome
                    }
                }
            }
            None => self.retrieve_standard(&search_string, filters).await,
        }
    }

    async fn retrieve_standard(
        &self,
        search_string: &str,
        filters: Option<&SearchFilters>,
    ) -> RetrievalOutcome {
        let top_k = self.config.top_k;

        if let Some(chunks) = self.caches.retrieval.get(search_string, top_k, filters) {
            tracing::debug!(chunks = chunks.len(), "Retrieval cache hit");
            return self.finish(chunks, Vec::new());
        }

        let candidates = match self.vector.search(search_string, top_k, filters).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Vector search failed");
                return RetrievalOutcome::insufficient(vec![
                    "document search unavailable".to_string(),
                ]);
            }
        };

        let survivors = self.filter_by_relevance(candidates, self.config.min_relevance);
        self.caches
            .retrieval
            .put(search_string, top_k, filters, survivors.clone());

        self.finish(survivors, Vec::new())
    }

    async fn retrieve_with_judge(
        &self,
        query: &str,
        search_string: &str,
        filters: Option<&SearchFilters>,
        user_id: Option<&str>,
        judge: Arc<dyn RetrievalJudge>,
    ) -> Result<RetrievalOutcome> {
        let plan = judge.analyze_query(query).await?;
        let top_k = self.config.top_k.max(plan.k + 5);

        if let Some(chunks) = self.caches.retrieval.get(search_string, top_k, filters) {
            tracing::debug!(chunks = chunks.len(), "Retrieval cache hit (judge path)");
            // Every retained chunk is notified, cached or fresh
            self.notify_interactions(&chunks, user_id);
            return Ok(self.finish(chunks, Vec::new()));
        }

        let mut candidates = self.vector.search(search_string, top_k, filters).await?;
        candidates.retain(|c| !c.content.trim().is_empty());

        let evaluation = judge.evaluate_chunks(query, &candidates).await?;
        apply_scores(&mut candidates, &evaluation.scores);

        if evaluation.needs_refinement {
            let refined = judge.refine_query(query, &candidates).await?;
            tracing::debug!(refined = %refined, "Judge requested query refinement");

            let extra = self.vector.search(&refined, top_k, filters).await?;
            merge_candidates(&mut candidates, extra);

            let re_evaluation = judge.evaluate_chunks(query, &candidates).await?;
            apply_scores(&mut candidates, &re_evaluation.scores);
        }

        let mut retained = self.filter_by_relevance(candidates, plan.threshold);

        if plan.rerank {
            // Stable sort: equal scores keep their original retrieval order
            retained.sort_by(|a, b| {
                b.relevance()
                    .partial_cmp(&a.relevance())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            if retained.len() > 3 {
                match judge.optimize_context(query, retained.clone()).await {
                    Ok(optimized) => retained = optimized,
                    Err(e) => {
                        tracing::warn!(error = %e, "Context optimization failed, keeping ranked set");
                    }
                }
            }
        }

        self.caches
            .retrieval
            .put(search_string, top_k, filters, retained.clone());

        self.notify_interactions(&retained, user_id);

        Ok(self.finish(retained, Vec::new()))
    }

    /// Drop content-less candidates, then keep those at or above the
    /// threshold. Order is preserved; ties never reorder.
    fn filter_by_relevance(
        &self,
        candidates: Vec<RetrievedChunk>,
        threshold: f32,
    ) -> Vec<RetrievedChunk> {
        candidates
            .into_iter()
            .filter(|c| !c.content.trim().is_empty())
            .filter(|c| c.relevance() >= threshold)
            .collect()
    }

    fn finish(&self, chunks: Vec<RetrievedChunk>, warnings: Vec<String>) -> RetrievalOutcome {
        for chunk in &chunks {
            self.caches.document.put_chunk(chunk.clone());
        }

        let context = format_context_blocks(&chunks);
        if chunks.is_empty() || context.len() < self.config.min_context_chars {
            return RetrievalOutcome::insufficient(warnings);
        }

        let citations = chunks.iter().map(Citation::from_chunk).collect();
        RetrievalOutcome {
            context,
            citations,
            chunks,
            insufficient: false,
            warnings,
        }
    }

    /// Best-effort document-interaction notifications; never blocks the
    /// request and never fails it.
    fn notify_interactions(&self, chunks: &[RetrievedChunk], user_id: Option<&str>) {
        let (Some(memory), Some(user_id)) = (self.memory.as_ref(), user_id) else {
            return;
        };

        for chunk in chunks {
            let memory = Arc::clone(memory);
            let user_id = user_id.to_string();
            let document_id = chunk.document_id.clone();
            let data = serde_json::json!({
                "chunk_id": chunk.chunk_id,
                "relevance": chunk.relevance(),
            });
            let timeout = self.side_channel_timeout;

            tokio::spawn(async move {
                let call = memory.record_interaction(&user_id, &document_id, "retrieval", data);
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, document_id, "Interaction notification failed")
                    }
                    Err(_) => {
                        tracing::debug!(document_id, "Interaction notification timed out")
                    }
                }
            });
        }
    }
}

fn apply_scores(candidates: &mut [RetrievedChunk], scores: &HashMap<String, f32>) {
    for chunk in candidates.iter_mut() {
        if let Some(score) = scores.get(&chunk.chunk_id) {
            chunk.relevance_score = Some(*score);
        }
    }
}

/// Merge refinement results into the candidate set, deduplicating by chunk
/// id and keeping first-seen order.
fn merge_candidates(candidates: &mut Vec<RetrievedChunk>, extra: Vec<RetrievedChunk>) {
    for chunk in extra {
        if chunk.content.trim().is_empty() {
            continue;
        }
        if candidates.iter().all(|c| c.chunk_id != chunk.chunk_id) {
            candidates.push(chunk);
        }
    }
}
