//! Bounded LRU cache of chat answers, persisted as a JSON array.
//!
//! Entries are kept least-recently-used first, which is also the on-disk
//! order, so reloading the file restores recency. The file is read on first
//! use and rewritten after every insertion. The entry lock is released before
//! the file is written; a generation number keeps an older snapshot from
//! overwriting a newer one. Persistence problems are logged and never reach
//! the caller.

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<V> {
    key: String,
    value: V,
}

struct Inner<V> {
    entries: VecDeque<CacheEntry<V>>,
    loaded: bool,
    /// Bumped on every mutation that must reach disk.
    generation: u64,
}

pub struct ResponseCache<V> {
    inner: Mutex<Inner<V>>,
    /// Generation of the snapshot currently on disk. Serializes file writes.
    written: Mutex<u64>,
    path: PathBuf,
    capacity: usize,
    reset: bool,
}

/// Canonical cache key for a question: `{"input":"<question>"}`.
pub fn cache_key(question: &str) -> String {
    #[derive(Serialize)]
    struct KeyForm<'a> {
        input: &'a str,
    }
    // Serializing a single string field cannot fail.
    serde_json::to_string(&KeyForm { input: question }).unwrap_or_else(|_| question.to_string())
}

impl<V> ResponseCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// `capacity` is clamped to at least one entry. With `reset` the file at
    /// `path` is ignored and overwritten on the first insertion.
    pub fn new(path: impl Into<PathBuf>, capacity: usize, reset: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                loaded: false,
                generation: 0,
            }),
            written: Mutex::new(0),
            path: path.into(),
            capacity: capacity.max(1),
            reset,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached value for `question`, or compute, store and return it.
    /// A failed computation stores nothing.
    pub async fn get_or_compute<F, Fut, E>(&self, question: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = cache_key(question);
        if let Some(hit) = self.get_by_key(&key) {
            tracing::debug!("Cache hit for {key}");
            return Ok(hit);
        }

        tracing::debug!("Cache miss for {key}");
        let value = compute().await?;
        self.insert_by_key(key, value.clone());
        Ok(value)
    }

    /// Look up `question`, promoting it to most recently used.
    pub fn get(&self, question: &str) -> Option<V> {
        self.get_by_key(&cache_key(question))
    }

    /// Insert or replace the answer for `question` and persist the cache.
    pub fn insert(&self, question: &str, value: V) {
        self.insert_by_key(cache_key(question), value);
    }

    fn get_by_key(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);

        let pos = inner.entries.iter().position(|e| e.key == key)?;
        let entry = inner.entries.remove(pos)?;
        let value = entry.value.clone();
        inner.entries.push_back(entry);
        Some(value)
    }

    fn insert_by_key(&self, key: String, value: V) {
        let snapshot = {
            let mut inner = self.inner.lock();
            self.ensure_loaded(&mut inner);
            self.store_entry(&mut inner, key, value);
            inner.generation += 1;
            let generation = inner.generation;
            let data = serde_json::to_string_pretty(&inner.entries);
            data.map(|data| (generation, data))
        };

        match snapshot {
            Ok((generation, data)) => self.write_snapshot(generation, &data),
            Err(e) => tracing::warn!("Failed to serialize response cache: {e}"),
        }
    }

    fn store_entry(&self, inner: &mut Inner<V>, key: String, value: V) {
        if let Some(pos) = inner.entries.iter().position(|e| e.key == key) {
            inner.entries.remove(pos);
        }
        inner.entries.push_back(CacheEntry { key, value });

        if inner.entries.len() > self.capacity {
            if let Some(evicted) = inner.entries.pop_front() {
                tracing::debug!("Evicted least recently used entry {}", evicted.key);
            }
        }
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        inner.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_loaded(&self, inner: &mut Inner<V>) {
        if inner.loaded {
            return;
        }
        inner.loaded = true;

        if self.reset {
            tracing::info!("Cache reset requested, ignoring {}", self.path.display());
            return;
        }

        let mut entries = load_entries::<V>(&self.path);
        // A file written with a larger capacity keeps only its most recent entries.
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        tracing::info!("Loaded {} cached answers from {}", entries.len(), self.path.display());
        inner.entries = entries;
    }

    /// Write `data` unless a newer generation is already on disk.
    fn write_snapshot(&self, generation: u64, data: &str) {
        let mut written = self.written.lock();
        if *written >= generation {
            tracing::debug!("Skipping stale cache snapshot {generation} (disk has {})", *written);
            return;
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Failed to create cache directory {}: {e}", parent.display());
                    return;
                }
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let result = std::fs::write(&tmp_path, data).and_then(|_| std::fs::rename(&tmp_path, &self.path));
        match result {
            Ok(()) => *written = generation,
            Err(e) => tracing::warn!("Failed to write response cache to {}: {e}", self.path.display()),
        }
    }
}

fn load_entries<V: DeserializeOwned>(path: &Path) -> VecDeque<CacheEntry<V>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return VecDeque::new(),
        Err(e) => {
            tracing::warn!("Failed to read response cache {}: {e}", path.display());
            return VecDeque::new();
        }
    };

    match serde_json::from_str::<Vec<CacheEntry<V>>>(&data) {
        Ok(entries) => entries.into(),
        Err(e) => {
            tracing::warn!("Response cache {} is malformed, starting empty: {e}", path.display());
            VecDeque::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir, capacity: usize) -> ResponseCache<String> {
        ResponseCache::new(dir.path().join("cache.json"), capacity, false)
    }

    // ─── Keys ────────────────────────────────────────────

    #[test]
    fn test_cache_key_is_canonical_json() {
        assert_eq!(cache_key("What is X?"), r#"{"input":"What is X?"}"#);
    }

    #[test]
    fn test_cache_key_escapes_quotes() {
        assert_eq!(cache_key(r#"say "hi""#), r#"{"input":"say \"hi\""}"#);
    }

    #[test]
    fn test_cache_key_no_semantic_dedup() {
        assert_ne!(cache_key("What is X?"), cache_key("what is x?"));
    }

    // ─── LRU behaviour ───────────────────────────────────

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 3);
        cache.insert("a", "1".into());
        cache.insert("b", "2".into());
        cache.insert("c", "3".into());
        cache.insert("d", "4".into());

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("d").as_deref(), Some("4"));
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 3);
        cache.insert("a", "1".into());
        cache.insert("b", "2".into());
        cache.insert("c", "3".into());

        assert!(cache.get("a").is_some());
        cache.insert("d", "4".into());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_reinsert_replaces_and_promotes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 2);
        cache.insert("a", "old".into());
        cache.insert("b", "2".into());
        cache.insert("a", "new".into());
        cache.insert("c", "3".into());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("new"));
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 0);
        cache.insert("a", "1".into());
        cache.insert("b", "2".into());
        assert_eq!(cache.keys(), vec![cache_key("b")]);
    }

    // ─── get_or_compute ──────────────────────────────────

    #[tokio::test]
    async fn test_get_or_compute_only_computes_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 5);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let v: Result<String, anyhow::Error> = cache
                .get_or_compute("q", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok("answer".to_string())
                })
                .await;
            assert_eq!(v.unwrap(), "answer");
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 5);
        let result: Result<String, anyhow::Error> = cache
            .get_or_compute("q", || async { Err(anyhow::anyhow!("backend down")) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert!(!cache.path().exists());
    }

    // ─── Persistence ─────────────────────────────────────

    #[test]
    fn test_round_trip_preserves_recency_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(&dir, 5);
            cache.insert("a", "1".into());
            cache.insert("b", "2".into());
            cache.insert("c", "3".into());
            cache.get("a");
        }

        let reloaded = cache_in(&dir, 5);
        assert_eq!(reloaded.keys(), vec![cache_key("b"), cache_key("c"), cache_key("a")]);
        assert_eq!(reloaded.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_missing_file_starts_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let cache: ResponseCache<String> = ResponseCache::new(dir.path().join("nested/cache.json"), 5, false);
        assert!(cache.is_empty());
        cache.insert("a", "1".into());
        assert!(dir.path().join("nested/cache.json").exists());
    }

    #[test]
    fn test_malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cache.json"), "{{{ not json").unwrap();
        let cache = cache_in(&dir, 5);
        assert!(cache.is_empty());
        cache.insert("a", "1".into());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reset_ignores_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(&dir, 5);
            cache.insert("a", "1".into());
        }
        let cache: ResponseCache<String> = ResponseCache::new(dir.path().join("cache.json"), 5, true);
        assert!(cache.is_empty());
        cache.insert("b", "2".into());

        let reloaded = cache_in(&dir, 5);
        assert_eq!(reloaded.keys(), vec![cache_key("b")]);
    }

    #[test]
    fn test_unwritable_path_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        std::fs::create_dir_all(dir.path().join("cache.json")).unwrap();
        let cache = cache_in(&dir, 5);
        cache.insert("a", "1".into());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_stale_snapshot_does_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 5);
        cache.insert("a", "1".into());
        cache.insert("b", "2".into());

        // A writer that serialized generation 1 but lost the race to generation 2.
        let stale = r#"[{"key":"{\"input\":\"a\"}","value":"1"}]"#;
        cache.write_snapshot(1, stale);

        let reloaded = cache_in(&dir, 5);
        assert_eq!(reloaded.keys(), vec![cache_key("a"), cache_key("b")]);
    }

    #[test]
    fn test_reads_proceed_while_file_write_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir, 5);
        cache.insert("a", "1".into());

        // Holding the writer lock stands in for a slow disk write.
        let _writer = cache.written.lock();
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reload_with_smaller_capacity_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(&dir, 5);
            for k in ["a", "b", "c", "d"] {
                cache.insert(k, k.to_string());
            }
        }
        let smaller = cache_in(&dir, 2);
        assert_eq!(smaller.keys(), vec![cache_key("c"), cache_key("d")]);
    }
}
