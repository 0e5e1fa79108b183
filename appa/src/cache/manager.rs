use serde::{Deserialize, Serialize};

use crate::config::CacheSettings;

use super::bounded::CacheStats;
use super::document::DocumentCache;
use super::response::ResponseCache;
use super::retrieval::RetrievalCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManagerStats {
    pub enabled: bool,
    pub retrieval: CacheStats,
    pub document: CacheStats,
    pub response: CacheStats,
}

/// Process-lifetime owner of the retrieval, document, and response caches.
///
/// Built disabled, every cache accepts writes as no-ops and always misses,
/// so call sites never branch on whether caching is on.
pub struct CacheManager {
    enabled: bool,
    pub retrieval: RetrievalCache,
    pub document: DocumentCache,
    pub response: ResponseCache,
}

impl CacheManager {
    pub fn new(settings: &CacheSettings, generation: &crate::config::GenerationConfig) -> Self {
        if !settings.enabled {
            return Self::disabled(generation);
        }

        let dir = Some(settings.persist_dir.as_str());
        let debounce = settings.persist_debounce_ms;

        Self {
            enabled: true,
            retrieval: RetrievalCache::new(&settings.retrieval, dir, debounce),
            document: DocumentCache::new(&settings.document, dir, debounce),
            response: ResponseCache::new(&settings.response, generation, dir, debounce),
        }
    }

    pub fn disabled(generation: &crate::config::GenerationConfig) -> Self {
        Self {
            enabled: false,
            retrieval: RetrievalCache::disabled(),
            document: DocumentCache::disabled(),
            response: ResponseCache::disabled(generation),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear_all(&self) {
        self.retrieval.clear();
        self.document.clear();
        self.response.clear();
        tracing::info!("All caches cleared");
    }

    pub fn stats_all(&self) -> CacheManagerStats {
        CacheManagerStats {
            enabled: self.enabled,
            retrieval: self.retrieval.stats(),
            document: self.document.stats(),
            response: self.response.stats(),
        }
    }

    /// Remove everything derived from one document across caches. Eventually
    /// consistent: a racing reader may still serve a stale entry until its
    /// ttl lapses.
    pub fn invalidate_document(&self, document_id: &str) {
        let retrieval = self.retrieval.invalidate_by_document_id(document_id);
        let document = self.document.invalidate_document(document_id);
        tracing::debug!(
            document_id,
            retrieval_entries = retrieval,
            document_entries = document,
            "Invalidated cached state for document"
        );
    }

    /// Flush pending snapshots. Used at shutdown when debounced persistence
    /// is on.
    pub fn flush_all(&self) {
        self.retrieval.flush();
        self.document.flush();
        self.response.flush();
    }
}
