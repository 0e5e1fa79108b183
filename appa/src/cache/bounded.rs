use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One cached value with its store time. Owned exclusively by its cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub ttl_seconds: u64,
    pub persist_enabled: bool,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
    dirty: bool,
    last_persist: Option<Instant>,
    io_warned: bool,
}

/// TTL-expiring, size-bounded key-value store with optional disk snapshots.
///
/// Reads expire lazily; an insertion that exceeds `max_size` prunes down to
/// the newest `max_size / 2` entries so back-to-back inserts do not thrash
/// the eviction path. All read-modify-write sequences hold the cache mutex,
/// so concurrent request handlers can share one instance freely.
///
/// Disk I/O failures degrade to an empty cache or a skipped save; they are
/// logged once and never reach the caller.
pub struct BoundedCache<T> {
    name: String,
    ttl_secs: u64,
    max_size: usize,
    persist_dir: Option<PathBuf>,
    debounce_ms: u64,
    disabled: bool,
    state: Mutex<CacheState<T>>,
}

const SNAPSHOT_FILE: &str = "snapshot.json";
const STATS_FILE: &str = "stats.json";

impl<T> BoundedCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn new(name: &str, ttl_secs: u64, max_size: usize) -> Self {
        Self::build(name, ttl_secs, max_size, None, 0, false)
    }

    /// A persisting cache rooted at `dir/<name>/`. The on-disk snapshot is
    /// loaded eagerly; entries already expired under the current ttl are
    /// dropped during load.
    pub fn persistent(
        name: &str,
        ttl_secs: u64,
        max_size: usize,
        dir: impl Into<PathBuf>,
        debounce_ms: u64,
    ) -> Self {
        let dir = dir.into().join(name);
        Self::build(name, ttl_secs, max_size, Some(dir), debounce_ms, false)
    }

    /// No-op cache: writes are accepted and discarded, reads always miss.
    /// Lets call sites stay unconditional when caching is turned off.
    pub fn disabled(name: &str) -> Self {
        Self::build(name, 0, 0, None, 0, true)
    }

    fn build(
        name: &str,
        ttl_secs: u64,
        max_size: usize,
        persist_dir: Option<PathBuf>,
        debounce_ms: u64,
        disabled: bool,
    ) -> Self {
        let cache = Self {
            name: name.to_string(),
            ttl_secs,
            max_size,
            persist_dir,
            debounce_ms,
            disabled,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                dirty: false,
                last_persist: None,
                io_warned: false,
            }),
        };
        cache.load_snapshot();
        cache
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(entry.stored_at).num_milliseconds();
        age_ms < 0 || age_ms as u128 >= self.ttl_secs as u128 * 1000
    }

    pub fn get(&self, key: &str) -> Option<T> {
        if self.disabled {
            let mut state = self.state.lock().unwrap();
            state.misses += 1;
            return None;
        }

        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let expired = match state.entries.get(key) {
            Some(entry) => self.is_expired(entry, now),
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            state.dirty = true;
            self.persist_locked(&mut state);
            return None;
        }

        state.hits += 1;
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        if self.disabled {
            return;
        }

        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Utc::now(),
            },
        );

        if state.entries.len() > self.max_size {
            Self::prune(&mut state.entries, self.max_size);
        }

        state.dirty = true;
        self.persist_locked(&mut state);
    }

    /// Evict oldest-first down to half capacity, not to the limit. The
    /// hysteresis keeps a burst of inserts from pruning on every call.
    fn prune(entries: &mut HashMap<String, CacheEntry<T>>, max_size: usize) {
        let keep = max_size / 2;
        let mut by_age: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.stored_at))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        for (key, _) in by_age.into_iter().skip(keep) {
            entries.remove(&key);
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        if self.disabled {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.dirty = true;
            self.persist_locked(&mut state);
        }
        removed
    }

    pub fn clear(&self) {
        if self.disabled {
            return;
        }

        let mut state = self.state.lock().unwrap();
        if !state.entries.is_empty() {
            state.entries.clear();
            state.dirty = true;
            self.persist_locked(&mut state);
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        if self.disabled {
            return false;
        }

        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let expired = match state.entries.get(key) {
            Some(entry) => self.is_expired(entry, now),
            None => return false,
        };

        if expired {
            state.entries.remove(key);
            state.dirty = true;
            self.persist_locked(&mut state);
            return false;
        }

        true
    }

    /// Delete every unexpired entry matching `pred`. Returns how many were
    /// removed. Linear scan; acceptable at the cache's bounded size.
    pub fn delete_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        if self.disabled {
            return 0;
        }

        let mut state = self.state.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !pred(&entry.value));
        let removed = before - state.entries.len();
        if removed > 0 {
            state.dirty = true;
            self.persist_locked(&mut state);
        }
        removed
    }

    /// Clone every unexpired value matching `pred`. Linear scan.
    pub fn find_where(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        if self.disabled {
            return Vec::new();
        }

        let now = Utc::now();
        let state = self.state.lock().unwrap();
        state
            .entries
            .values()
            .filter(|entry| !self.is_expired(entry, now) && pred(&entry.value))
            .map(|entry| entry.value.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let total = state.hits + state.misses;
        CacheStats {
            name: self.name.clone(),
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
            ttl_seconds: self.ttl_secs,
            persist_enabled: self.persist_dir.is_some(),
        }
    }

    /// Force a snapshot write if there are unsaved mutations.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        if state.dirty {
            self.save_locked(&mut state);
        }
    }

    fn persist_locked(&self, state: &mut CacheState<T>) {
        if self.persist_dir.is_none() {
            return;
        }

        if self.debounce_ms > 0 {
            if let Some(last) = state.last_persist {
                if (last.elapsed().as_millis() as u64) < self.debounce_ms {
                    // Within the debounce window; flush() or the next
                    // out-of-window mutation will pick this up.
                    return;
                }
            }
        }

        self.save_locked(state);
    }

    fn save_locked(&self, state: &mut CacheState<T>) {
        let Some(dir) = self.persist_dir.as_ref() else {
            return;
        };

        let result = (|| -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;

            let snapshot = serde_json::to_vec(&state.entries)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(dir.join(SNAPSHOT_FILE), snapshot)?;

            let total = state.hits + state.misses;
            let stats = serde_json::json!({
                "name": self.name,
                "size": state.entries.len(),
                "max_size": self.max_size,
                "hits": state.hits,
                "misses": state.misses,
                "hit_ratio": if total == 0 { 0.0 } else { state.hits as f64 / total as f64 },
                "ttl_seconds": self.ttl_secs,
            });
            std::fs::write(
                dir.join(STATS_FILE),
                serde_json::to_vec_pretty(&stats)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                state.dirty = false;
                state.last_persist = Some(Instant::now());
            }
            Err(e) => {
                if !state.io_warned {
                    tracing::warn!(cache = %self.name, error = %e, "Cache snapshot save failed; skipping saves");
                    state.io_warned = true;
                }
            }
        }
    }

    fn load_snapshot(&self) {
        let Some(dir) = self.persist_dir.as_ref() else {
            return;
        };

        let path = dir.join(SNAPSHOT_FILE);
        if !path.exists() {
            return;
        }

        let loaded: Result<HashMap<String, CacheEntry<T>>, String> = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));

        match loaded {
            Ok(entries) => {
                let now = Utc::now();
                let mut state = self.state.lock().unwrap();
                state.entries = entries
                    .into_iter()
                    .filter(|(_, entry)| !self.is_expired(entry, now))
                    .collect();
                tracing::debug!(
                    cache = %self.name,
                    entries = state.entries.len(),
                    "Loaded cache snapshot"
                );
            }
            Err(e) => {
                tracing::warn!(cache = %self.name, error = %e, "Cache snapshot load failed; starting empty");
            }
        }
    }
}
