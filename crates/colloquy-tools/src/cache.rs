use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

/// LRU + TTL cache for tool results, keyed by `(tool name, canonical args)`.
///
/// Entries expire after `ttl` even if still resident; eviction beyond
/// capacity is least-recently-used.
pub struct ResultCache {
    inner: Mutex<LruCache<String, CachedResult>>,
    ttl: Duration,
}

struct CachedResult {
    value: String,
    stored_at: Instant,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, tool: &str, args: &serde_json::Value) -> Option<String> {
        let key = cache_key(tool, args);
        let mut cache = self.inner.lock().unwrap();
        match cache.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!(tool, "tool cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, tool: &str, args: &serde_json::Value, value: String) {
        let key = cache_key(tool, args);
        self.inner.lock().unwrap().put(
            key,
            CachedResult {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

/// Canonical cache key: tool name plus the argument value with all object
/// keys recursively sorted, so `{"a":1,"b":2}` and `{"b":2,"a":1}` collide.
fn cache_key(tool: &str, args: &serde_json::Value) -> String {
    format!("{tool}\u{1f}{}", canonicalize(args))
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonicalize(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_object_key_order() {
        let a = serde_json::json!({"x": 1, "y": {"b": 2, "a": 3}});
        let b = serde_json::json!({"y": {"a": 3, "b": 2}, "x": 1});
        assert_eq!(cache_key("t", &a), cache_key("t", &b));
    }

    #[test]
    fn key_distinguishes_tools_and_args() {
        let args = serde_json::json!({"x": 1});
        assert_ne!(cache_key("t1", &args), cache_key("t2", &args));
        assert_ne!(
            cache_key("t", &serde_json::json!({"x": 1})),
            cache_key("t", &serde_json::json!({"x": 2}))
        );
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = ResultCache::new(10, Duration::from_millis(30));
        let args = serde_json::json!({"q": "now"});
        cache.put("clock", &args, "12:00".to_string());
        assert_eq!(cache.get("clock", &args), Some("12:00".to_string()));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("clock", &args), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put("t", &serde_json::json!(1), "one".into());
        cache.put("t", &serde_json::json!(2), "two".into());
        // Touch 1, then insert 3 — 2 is the LRU victim.
        assert!(cache.get("t", &serde_json::json!(1)).is_some());
        cache.put("t", &serde_json::json!(3), "three".into());
        assert!(cache.get("t", &serde_json::json!(2)).is_none());
        assert!(cache.get("t", &serde_json::json!(1)).is_some());
    }
}
