use crate::config::CacheTuning;
use crate::models::{RetrievedChunk, SearchFilters};

use super::bounded::{BoundedCache, CacheStats};
use super::keys::{digest_key, normalize_query};

/// Caches the surviving chunk set of a retrieval pass, keyed by normalized
/// query + top-k + canonical filter JSON.
pub struct RetrievalCache {
    inner: BoundedCache<Vec<RetrievedChunk>>,
}

const NAME: &str = "retrieval";

impl RetrievalCache {
    pub fn new(tuning: &CacheTuning, persist_dir: Option<&str>, debounce_ms: u64) -> Self {
        let inner = match (tuning.persist, persist_dir) {
            (true, Some(dir)) => {
                BoundedCache::persistent(NAME, tuning.ttl_secs, tuning.max_size, dir, debounce_ms)
            }
            _ => BoundedCache::new(NAME, tuning.ttl_secs, tuning.max_size),
        };
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self {
            inner: BoundedCache::disabled(NAME),
        }
    }

    pub fn key(query: &str, top_k: usize, filters: Option<&SearchFilters>) -> String {
        let filters_json = filters
            .map(|f| serde_json::to_string(f).unwrap_or_default())
            .unwrap_or_else(|| "null".to_string());
        digest_key(&format!(
            "{}|{top_k}|{filters_json}",
            normalize_query(query)
        ))
    }

    pub fn get(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Option<Vec<RetrievedChunk>> {
        self.inner.get(&Self::key(query, top_k, filters))
    }

    pub fn put(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
        chunks: Vec<RetrievedChunk>,
    ) {
        self.inner.set(Self::key(query, top_k, filters), chunks);
    }

    /// Drop every cached result list that mentions the document. O(n) scan
    /// over a bounded cache.
    pub fn invalidate_by_document_id(&self, document_id: &str) -> usize {
        self.inner
            .delete_where(|chunks| chunks.iter().any(|c| c.document_id == document_id))
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
