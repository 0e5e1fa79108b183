mod bounded;
mod document;
mod keys;
mod manager;
mod response;
mod retrieval;

pub use bounded::{BoundedCache, CacheEntry, CacheStats};
pub use document::{CachedDocument, DocumentCache, DocumentEntry};
pub use keys::{digest_key, normalize_query};
pub use manager::{CacheManager, CacheManagerStats};
pub use response::ResponseCache;
pub use retrieval::RetrievalCache;
