//! Short-TTL response caching for Weathervane
//!
//! Upstream weather data ages in minutes, not milliseconds, so every proxy
//! route sits behind a small in-memory TTL cache. Each upstream domain gets
//! its own independent store; a flood of news lookups can never evict weather
//! entries.
//!
//! Expiry is lazy: an expired entry simply stops being returned and is
//! reclaimed either by the opportunistic sweep that follows every write or by
//! the periodic background sweep. TTL is caller policy, passed per insert,
//! which lets the precipitation store hold 15-minute current-conditions lines
//! next to 1-hour per-user history lines.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at_ms: i64,
}

/// Generic TTL cache keyed by `K`
///
/// All operations take the lock briefly and never hold it across an await
/// point. Values are cloned out on read.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

/// The per-domain cache stores, one per upstream API
///
/// The precipitation store is shared between current conditions and per-user
/// history; the key prefix and TTL keep the two populations apart.
#[derive(Clone)]
pub struct ResponseCaches {
    pub weather: Arc<TtlCache<String, serde_json::Value>>,
    pub metar: Arc<TtlCache<String, String>>,
    pub precipitation: Arc<TtlCache<String, serde_json::Value>>,
    pub pollen: Arc<TtlCache<String, serde_json::Value>>,
    pub news: Arc<TtlCache<String, serde_json::Value>>,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get a cached value if present and not expired
    ///
    /// An expired entry is a miss but is left in place for the next sweep.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, now_ms())
    }

    fn get_at(&self, key: &K, now_ms: i64) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|entry| now_ms < entry.expires_at_ms)
            .map(|entry| entry.value.clone())
    }

    /// Store a value with the given TTL, overwriting any existing entry
    ///
    /// Each write also sweeps expired entries so the map cannot grow without
    /// bound between background sweeps.
    pub fn insert(&self, key: K, value: V, ttl_secs: u64) {
        self.insert_at(key, value, ttl_secs, now_ms());
    }

    fn insert_at(&self, key: K, value: V, ttl_secs: u64, now_ms: i64) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at_ms: now_ms + (ttl_secs as i64) * 1000,
            },
        );
        entries.retain(|_, entry| now_ms < entry.expires_at_ms);
    }

    /// Remove all expired entries
    pub fn sweep(&self) {
        self.sweep_at(now_ms());
    }

    fn sweep_at(&self, now_ms: i64) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| now_ms < entry.expires_at_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCaches {
    pub fn new() -> Self {
        Self {
            weather: Arc::new(TtlCache::new()),
            metar: Arc::new(TtlCache::new()),
            precipitation: Arc::new(TtlCache::new()),
            pollen: Arc::new(TtlCache::new()),
            news: Arc::new(TtlCache::new()),
        }
    }

    /// Sweep every store, used by the periodic background task
    pub fn sweep_all(&self) {
        self.weather.sweep();
        self.metar.sweep();
        self.precipitation.sweep();
        self.pollen.sweep();
        self.news.sweep();
    }
}

impl Default for ResponseCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a coordinate cache key rounded to 2 decimal places
///
/// ~1.1 km of precision, enough to collapse near-duplicate map queries into
/// one cache line.
pub fn coordinate_key(lat: f64, lon: f64) -> String {
    format!("{:.2},{:.2}", lat, lon)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let cache: TtlCache<String, serde_json::Value> = TtlCache::new();
        cache.insert("40.71,-74.01".to_string(), json!({"temp": 21.5}), 300);

        let value = cache.get(&"40.71,-74.01".to_string()).unwrap();
        assert_eq!(value["temp"], 21.5);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache: TtlCache<String, String> = TtlCache::new();
        let t0 = 1_000_000;
        cache.insert_at("KJFK".to_string(), "METAR KJFK ...".to_string(), 600, t0);

        // One ms before expiry: hit. At expiry: miss, entry still present.
        assert!(cache.get_at(&"KJFK".to_string(), t0 + 599_999).is_some());
        assert!(cache.get_at(&"KJFK".to_string(), t0 + 600_000).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache: TtlCache<String, String> = TtlCache::new();
        let t0 = 1_000_000;
        cache.insert_at("old".to_string(), "a".to_string(), 10, t0);
        cache.insert_at("fresh".to_string(), "b".to_string(), 600, t0);

        cache.sweep_at(t0 + 60_000);

        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(&"fresh".to_string(), t0 + 60_000).is_some());
    }

    #[test]
    fn test_insert_overwrites_and_sweeps() {
        let cache: TtlCache<String, String> = TtlCache::new();
        let t0 = 1_000_000;
        cache.insert_at("stale".to_string(), "x".to_string(), 10, t0);
        cache.insert_at("key".to_string(), "v1".to_string(), 300, t0);

        // Overwrite much later: new value wins and the stale line is reclaimed
        cache.insert_at("key".to_string(), "v2".to_string(), 300, t0 + 60_000);

        assert_eq!(cache.get_at(&"key".to_string(), t0 + 60_000).unwrap(), "v2");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache: TtlCache<String, String> = TtlCache::new();
        cache.insert("a".to_string(), "1".to_string(), 300);
        cache.insert("b".to_string(), "2".to_string(), 300);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_coordinate_key_collapses_near_duplicates() {
        assert_eq!(coordinate_key(40.7128, -74.0059), "40.71,-74.01");
        assert_eq!(coordinate_key(40.7129, -74.0061), "40.71,-74.01");
        assert_ne!(coordinate_key(40.72, -74.01), coordinate_key(40.71, -74.01));
    }

    #[test]
    fn test_stores_are_independent() {
        let caches = ResponseCaches::new();
        caches
            .weather
            .insert("40.71,-74.01".to_string(), json!({"temp": 20}), 300);

        assert!(
            caches
                .precipitation
                .get(&"40.71,-74.01".to_string())
                .is_none()
        );
        assert_eq!(caches.weather.len(), 1);
    }
}
