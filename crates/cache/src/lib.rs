//! Bounded transformation cache: LRU eviction at capacity, TTL expiry
//! on read, hit/miss statistics, and optional best-effort file
//! persistence. Persistence failures are logged and swallowed; the
//! cache is never correctness-critical.

use blake3::Hasher;
use fieldsync_protocol::Transformation;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const CACHE_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Zero disables expiry.
    pub ttl: Duration,
    pub persist_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: Duration::ZERO,
            persist_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_ms: u64,
    pub hits: u64,
    pub last_accessed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub oldest_entry_ms: u64,
    pub newest_entry_ms: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot<T> {
    schema_version: u32,
    /// Most recently used first, same order the live cache keeps.
    entries: Vec<(String, CacheEntry<T>)>,
}

pub struct TransformCache<T> {
    map: HashMap<String, CacheEntry<T>>,
    /// Access order, most recent at the front.
    order: VecDeque<String>,
    config: CacheConfig,
    hits: u64,
    misses: u64,
}

impl<T: Clone + Serialize + DeserializeOwned> TransformCache<T> {
    /// Build a cache, rehydrating from the persistence path when one is
    /// configured. A missing, corrupt, or version-mismatched snapshot
    /// starts the cache empty.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let mut cache = Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            config,
            hits: 0,
            misses: 0,
        };
        cache.rehydrate();
        cache
    }

    pub fn get(&mut self, key: &str) -> Option<T> {
        let now = unix_ms_now();
        let expired = match self.map.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => is_expired(entry.created_ms, now, self.config.ttl),
        };
        if expired {
            self.map.remove(key);
            remove_from_order(&mut self.order, key);
            self.misses += 1;
            self.persist();
            return None;
        }

        let value = {
            let entry = self.map.get_mut(key)?;
            entry.hits += 1;
            entry.last_accessed_ms = now;
            entry.value.clone()
        };
        self.hits += 1;
        touch(&mut self.order, key);
        Some(value)
    }

    /// Insert or overwrite. At capacity the least recently accessed
    /// entry is evicted before the new one goes in.
    pub fn set(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if !self.map.contains_key(&key) {
            while self.config.capacity > 0 && self.map.len() >= self.config.capacity {
                self.evict_lru();
            }
        }

        let now = unix_ms_now();
        self.map.insert(
            key.clone(),
            CacheEntry {
                value,
                created_ms: now,
                hits: 0,
                last_accessed_ms: now,
            },
        );
        touch(&mut self.order, &key);
        self.persist();
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.map.remove(key).is_some();
        if removed {
            remove_from_order(&mut self.order, key);
            self.persist();
        }
        removed
    }

    /// Expiry-aware presence check. Does not touch hit/miss counters or
    /// access order.
    pub fn contains(&mut self, key: &str) -> bool {
        let Some(entry) = self.map.get(key) else {
            return false;
        };
        if is_expired(entry.created_ms, unix_ms_now(), self.config.ttl) {
            self.map.remove(key);
            remove_from_order(&mut self.order, key);
            self.persist();
            return false;
        }
        true
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
        self.persist();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
        let oldest = self.map.values().map(|e| e.created_ms).min().unwrap_or(0);
        let newest = self.map.values().map(|e| e.created_ms).max().unwrap_or(0);
        CacheStats {
            size: self.map.len(),
            capacity: self.config.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            oldest_entry_ms: oldest,
            newest_entry_ms: newest,
        }
    }

    fn evict_lru(&mut self) {
        if let Some(old) = self.order.pop_back() {
            self.map.remove(&old);
        }
    }

    fn persist(&self) {
        let Some(path) = &self.config.persist_path else {
            return;
        };
        let snapshot = CacheSnapshot {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: self
                .order
                .iter()
                .filter_map(|key| self.map.get(key).map(|e| (key.clone(), e.clone())))
                .collect(),
        };
        let bytes = match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Cache snapshot serialization failed: {err}");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Cannot create cache dir {}: {err}", parent.display());
                return;
            }
        }
        let tmp = path.with_extension("json.tmp");
        if let Err(err) = std::fs::write(&tmp, &bytes) {
            warn!("Cache snapshot write failed {}: {err}", tmp.display());
            return;
        }
        if let Err(err) = std::fs::rename(&tmp, path) {
            warn!("Cache snapshot rename failed {}: {err}", path.display());
            let _ = std::fs::remove_file(&tmp);
        }
    }

    fn rehydrate(&mut self) {
        let Some(path) = self.config.persist_path.clone() else {
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        let snapshot: CacheSnapshot<T> = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Cache snapshot corrupted {}: {err}", path.display());
                return;
            }
        };
        if snapshot.schema_version != CACHE_SCHEMA_VERSION {
            warn!(
                "Cache snapshot version {} != {}, discarding {}",
                snapshot.schema_version,
                CACHE_SCHEMA_VERSION,
                path.display()
            );
            return;
        }
        for (key, entry) in snapshot.entries {
            self.order.push_back(key.clone());
            self.map.insert(key, entry);
        }
    }
}

/// Content-addressed key for one transformation run: mapping id,
/// transformation config, and input value all participate.
#[must_use]
pub fn transform_cache_key(
    mapping_id: &str,
    transformation: Option<&Transformation>,
    input: &serde_json::Value,
) -> String {
    let mut hasher = Hasher::new();
    hasher.update(mapping_id.as_bytes());
    hasher.update(b"|");
    if let Some(transformation) = transformation {
        if let Ok(raw) = serde_json::to_vec(transformation) {
            hasher.update(&raw);
        }
    }
    hasher.update(b"|");
    if let Ok(raw) = serde_json::to_vec(input) {
        hasher.update(&raw);
    }
    hasher.finalize().to_hex().to_string()
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn is_expired(created_ms: u64, now_ms: u64, ttl: Duration) -> bool {
    if ttl.is_zero() {
        return false;
    }
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_sub(created_ms) > ttl_ms
}

fn touch(order: &mut VecDeque<String>, key: &str) {
    remove_from_order(order, key);
    order.push_front(key.to_string());
}

fn remove_from_order(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn memory_cache(capacity: usize) -> TransformCache<String> {
        TransformCache::new(CacheConfig {
            capacity,
            ttl: Duration::ZERO,
            persist_path: None,
        })
    }

    #[test]
    fn capacity_is_never_exceeded_and_lru_is_evicted() {
        let mut cache = memory_cache(500);
        for i in 0..500 {
            cache.set(format!("k{i}"), format!("v{i}"));
        }
        // Touch k0 so it is no longer the least recently used.
        assert_eq!(cache.get("k0"), Some("v0".to_string()));

        cache.set("k500", "v500".to_string());
        assert_eq!(cache.len(), 500);
        assert_eq!(cache.get("k0"), Some("v0".to_string()));
        // k1 was the least recently accessed at eviction time.
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.get("k500"), Some("v500".to_string()));
    }

    #[test]
    fn hit_rate_is_zero_without_accesses_and_exact_after() {
        let mut cache = memory_cache(10);
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.set("a", "1".to_string());
        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 2.0 / 3.0);
    }

    #[test]
    fn expired_entries_count_as_misses() {
        let mut cache: TransformCache<String> = TransformCache::new(CacheConfig {
            capacity: 10,
            ttl: Duration::from_millis(5),
            persist_path: None,
        });
        cache.set("a", "1".to_string());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn clear_empties_entries_and_resets_counters() {
        let mut cache = memory_cache(10);
        cache.set("a", "1".to_string());
        let _ = cache.get("a");
        let _ = cache.get("b");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn contains_does_not_skew_counters() {
        let mut cache = memory_cache(10);
        cache.set("a", "1".to_string());
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn snapshot_rehydrates_entries_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let config = CacheConfig {
            capacity: 2,
            ttl: Duration::ZERO,
            persist_path: Some(path.clone()),
        };

        {
            let mut cache: TransformCache<String> = TransformCache::new(config.clone());
            cache.set("old", "1".to_string());
            cache.set("new", "2".to_string());
        }

        let mut reloaded: TransformCache<String> = TransformCache::new(config);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("old"), Some("1".to_string()));

        // At capacity, a fresh insert still evicts the rehydrated LRU.
        reloaded.set("extra", "3".to_string());
        assert_eq!(reloaded.len(), 2);
        assert!(!reloaded.contains("new"));
    }

    #[test]
    fn version_mismatch_discards_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            serde_json::json!({"schema_version": 99, "entries": [["a", {"value": "1", "created_ms": 0, "hits": 0, "last_accessed_ms": 0}]]})
                .to_string(),
        )
        .unwrap();

        let cache: TransformCache<String> = TransformCache::new(CacheConfig {
            capacity: 10,
            ttl: Duration::ZERO,
            persist_path: Some(path),
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn transform_keys_separate_by_mapping_and_input() {
        let input_a = serde_json::json!("hello");
        let input_b = serde_json::json!("world");
        let base = transform_cache_key("m1", None, &input_a);
        assert_eq!(base, transform_cache_key("m1", None, &input_a));
        assert_ne!(base, transform_cache_key("m2", None, &input_a));
        assert_ne!(base, transform_cache_key("m1", None, &input_b));
        assert_ne!(
            base,
            transform_cache_key("m1", Some(&Transformation::Lowercase), &input_a)
        );
    }
}
