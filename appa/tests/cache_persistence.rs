//! Cache snapshots must survive a process restart.

use appa::cache::CacheManager;
use appa::config::{CacheSettings, CacheTuning, GenerationConfig};
use appa::models::RetrievedChunk;
use tempfile::TempDir;

fn chunk(chunk_id: &str, document_id: &str) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: chunk_id.to_string(),
        content: "persisted content".to_string(),
        document_id: document_id.to_string(),
        filename: "doc.md".to_string(),
        tags: Vec::new(),
        folder: None,
        distance: 0.15,
        relevance_score: None,
    }
}

fn persistent_settings(dir: &TempDir) -> CacheSettings {
    let tuning = CacheTuning {
        ttl_secs: 3600,
        max_size: 50,
        persist: true,
    };
    CacheSettings {
        enabled: true,
        persist_dir: dir.path().to_string_lossy().into_owned(),
        persist_debounce_ms: 0,
        retrieval: tuning.clone(),
        document: tuning.clone(),
        response: tuning,
    }
}

#[test]
fn test_retrieval_entries_survive_restart() {
    let dir = TempDir::new().unwrap();
    let settings = persistent_settings(&dir);
    let generation = GenerationConfig::default();

    {
        let manager = CacheManager::new(&settings, &generation);
        manager
            .retrieval
            .put("what changed", 15, None, vec![chunk("c1", "d1")]);
        manager.flush_all();
    }

    let reloaded = CacheManager::new(&settings, &generation);
    let chunks = reloaded.retrieval.get("what changed", 15, None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_id, "c1");
}

#[test]
fn test_snapshot_and_stats_files_are_written() {
    let dir = TempDir::new().unwrap();
    let settings = persistent_settings(&dir);
    let manager = CacheManager::new(&settings, &GenerationConfig::default());

    manager.document.put_chunk(chunk("c1", "d1"));
    manager.flush_all();

    let cache_dir = dir.path().join("document");
    assert!(cache_dir.join("snapshot.json").exists());
    assert!(cache_dir.join("stats.json").exists());
}

#[test]
fn test_invalidation_survives_restart() {
    let dir = TempDir::new().unwrap();
    let settings = persistent_settings(&dir);
    let generation = GenerationConfig::default();

    {
        let manager = CacheManager::new(&settings, &generation);
        manager
            .retrieval
            .put("what changed", 15, None, vec![chunk("c1", "d1")]);
        manager.document.put_chunk(chunk("c1", "d1"));
        manager.invalidate_document("d1");
        manager.flush_all();
    }

    let reloaded = CacheManager::new(&settings, &generation);
    assert!(reloaded.retrieval.get("what changed", 15, None).is_none());
    assert!(reloaded.document.get_chunk("c1").is_none());
}

#[test]
fn test_disabled_manager_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut settings = persistent_settings(&dir);
    settings.enabled = false;
    let manager = CacheManager::new(&settings, &GenerationConfig::default());

    manager.document.put_chunk(chunk("c1", "d1"));
    manager.flush_all();

    assert!(!dir.path().join("document").exists());
}
