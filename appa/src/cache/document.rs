use serde::{Deserialize, Serialize};

use crate::config::CacheTuning;
use crate::models::RetrievedChunk;

use super::bounded::{BoundedCache, CacheStats};

/// Document metadata worth keeping hot between requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDocument {
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folder: Option<String>,
    pub content: String,
}

/// Documents and chunks share one cache under `doc:`/`chunk:` key prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentEntry {
    Document(CachedDocument),
    Chunk(RetrievedChunk),
}

impl DocumentEntry {
    fn document_id(&self) -> &str {
        match self {
            DocumentEntry::Document(doc) => &doc.document_id,
            DocumentEntry::Chunk(chunk) => &chunk.document_id,
        }
    }

    fn tags(&self) -> &[String] {
        match self {
            DocumentEntry::Document(doc) => &doc.tags,
            DocumentEntry::Chunk(chunk) => &chunk.tags,
        }
    }

    fn folder(&self) -> Option<&str> {
        match self {
            DocumentEntry::Document(doc) => doc.folder.as_deref(),
            DocumentEntry::Chunk(chunk) => chunk.folder.as_deref(),
        }
    }
}

pub struct DocumentCache {
    inner: BoundedCache<DocumentEntry>,
}

const NAME: &str = "document";

impl DocumentCache {
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

    fn doc_key(id: &str) -> String {
        format!("doc:{id}")
    }

    fn chunk_key(id: &str) -> String {
        format!("chunk:{id}")
    }

    pub fn put_document(&self, doc: CachedDocument) {
        let key = Self::doc_key(&doc.document_id);
        self.inner.set(key, DocumentEntry::Document(doc));
    }

    pub fn get_document(&self, id: &str) -> Option<CachedDocument> {
        match self.inner.get(&Self::doc_key(id)) {
            Some(DocumentEntry::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn put_chunk(&self, chunk: RetrievedChunk) {
        let key = Self::chunk_key(&chunk.chunk_id);
        self.inner.set(key, DocumentEntry::Chunk(chunk));
    }

    pub fn get_chunk(&self, id: &str) -> Option<RetrievedChunk> {
        match self.inner.get(&Self::chunk_key(id)) {
            Some(DocumentEntry::Chunk(chunk)) => Some(chunk),
            _ => None,
        }
    }

    /// Remove the document entry and every cached chunk belonging to it.
    pub fn invalidate_document(&self, document_id: &str) -> usize {
        self.inner.delete_where(|entry| entry.document_id() == document_id)
    }

    /// Linear scan; acceptable at the cache's bounded size.
    pub fn find_by_tag(&self, tag: &str) -> Vec<DocumentEntry> {
        self.inner
            .find_where(|entry| entry.tags().iter().any(|t| t == tag))
    }

    pub fn find_by_folder(&self, folder: &str) -> Vec<DocumentEntry> {
        self.inner.find_where(|entry| entry.folder() == Some(folder))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> CacheTuning {
        CacheTuning {
            ttl_secs: 60,
            max_size: 20,
            persist: false,
        }
    }

    fn doc(id: &str, tags: &[&str], folder: Option<&str>) -> CachedDocument {
        CachedDocument {
            document_id: id.to_string(),
            filename: format!("{id}.md"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            folder: folder.map(|f| f.to_string()),
            content: "body".to_string(),
        }
    }

    fn chunk(chunk_id: &str, document_id: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            content: "chunk body".to_string(),
            document_id: document_id.to_string(),
            filename: format!("{document_id}.md"),
            tags: vec!["shared".to_string()],
            folder: Some("eng".to_string()),
            distance: 0.1,
            relevance_score: None,
        }
    }

    #[test]
    fn test_document_and_chunk_keys_do_not_collide() {
        let cache = DocumentCache::new(&tuning(), None, 0);
        cache.put_document(doc("same-id", &[], None));
        cache.put_chunk(chunk("same-id", "parent"));

        assert!(cache.get_document("same-id").is_some());
        assert!(cache.get_chunk("same-id").is_some());
    }

    #[test]
    fn test_invalidate_document_removes_doc_and_chunks() {
        let cache = DocumentCache::new(&tuning(), None, 0);
        cache.put_document(doc("d1", &[], None));
        cache.put_chunk(chunk("c1", "d1"));
        cache.put_chunk(chunk("c2", "d1"));
        cache.put_chunk(chunk("c3", "other"));

        let removed = cache.invalidate_document("d1");
        assert_eq!(removed, 3);
        assert!(cache.get_document("d1").is_none());
        assert!(cache.get_chunk("c1").is_none());
        assert!(cache.get_chunk("c3").is_some());
    }

    #[test]
    fn test_find_by_tag_and_folder() {
        let cache = DocumentCache::new(&tuning(), None, 0);
        cache.put_document(doc("d1", &["rust", "cache"], Some("eng")));
        cache.put_document(doc("d2", &["python"], Some("data")));
        cache.put_chunk(chunk("c1", "d3"));

        assert_eq!(cache.find_by_tag("rust").len(), 1);
        assert_eq!(cache.find_by_tag("shared").len(), 1);
        assert_eq!(cache.find_by_folder("eng").len(), 2);
        assert!(cache.find_by_folder("missing").is_empty());
    }
}
