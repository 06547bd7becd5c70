// Short-TTL memoization of storage path -> retrieval URL. Entries past their
// TTL (minus a safety margin, so a URL is never handed out moments before it
// dies) are treated as misses and overwritten on the next set. There is no
// background eviction.

use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Remaining lifetime below which a cached URL is no longer served.
pub const SAFETY_MARGIN_MS: u64 = 30_000;

#[derive(Debug, Clone)]
struct SignedUrlEntry {
    url: String,
    expires_at_ms: u64,
}

/// Process-wide mutable state; the interior mutex keeps it sound on a
/// multi-threaded runtime.
#[derive(Debug, Default)]
pub struct SignedUrlCache {
    map: Mutex<HashMap<String, SignedUrlEntry>>,
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl SignedUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.get_at(path, now_unix_ms())
    }

    pub fn get_at(&self, path: &str, now_ms: u64) -> Option<String> {
        let mut map = self.map.lock().ok()?;
        let entry = map.get(path)?;
        if now_ms + SAFETY_MARGIN_MS >= entry.expires_at_ms {
            map.remove(path);
            return None;
        }
        Some(entry.url.clone())
    }

    pub fn set(&self, path: &str, url: &str, ttl_seconds: u64) {
        self.set_at(path, url, ttl_seconds, now_unix_ms());
    }

    pub fn set_at(&self, path: &str, url: &str, ttl_seconds: u64, now_ms: u64) {
        let ttl_seconds = ttl_seconds.max(1);
        if let Ok(mut map) = self.map.lock() {
            map.insert(
                path.to_string(),
                SignedUrlEntry {
                    url: url.to_string(),
                    expires_at_ms: now_ms + ttl_seconds * 1000,
                },
            );
        }
    }

    /// Drop all entries, or only those whose key starts with `prefix`.
    /// Used after a photo replace to force URL regeneration.
    pub fn clear(&self, prefix: Option<&str>) {
        if let Ok(mut map) = self.map.lock() {
            match prefix {
                None => map.clear(),
                Some(prefix) => map.retain(|key, _| !key.starts_with(prefix)),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl_minus_margin() {
        let cache = SignedUrlCache::new();
        cache.set_at("a/b/day7_photo1_1.jpg", "https://u/1", 3600, 1_000_000);
        assert_eq!(
            cache.get_at("a/b/day7_photo1_1.jpg", 1_000_000 + 1),
            Some("https://u/1".to_string())
        );
    }

    #[test]
    fn test_miss_inside_safety_margin() {
        let cache = SignedUrlCache::new();
        let now = 1_000_000;
        cache.set_at("p", "https://u/1", 60, now);
        let expires = now + 60_000;
        // still nominally alive, but within the safety margin of expiry
        assert_eq!(cache.get_at("p", expires - SAFETY_MARGIN_MS + 1), None);
        // and gone for good afterwards
        assert_eq!(cache.get_at("p", now + 1), None);
    }

    #[test]
    fn test_miss_after_expiry() {
        let cache = SignedUrlCache::new();
        cache.set_at("p", "https://u/1", 1, 0);
        assert_eq!(cache.get_at("p", 2_000_000), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_is_clamped_to_one_second() {
        let cache = SignedUrlCache::new();
        cache.set_at("p", "https://u/1", 0, 1_000_000);
        // 1s ttl is below the safety margin, so it is never served; the
        // clamp only guards against a zero or negative expiry time.
        assert_eq!(cache.get_at("p", 1_000_000), None);
    }

    #[test]
    fn test_clear_prefix_removes_only_matching_keys() {
        let cache = SignedUrlCache::new();
        cache.set_at("o/t/day7_photo1_1.jpg", "u1", 3600, 0);
        cache.set_at("o/t/day7_photo2_1.jpg", "u2", 3600, 0);
        cache.set_at("o/t/day14_photo1_1.jpg", "u3", 3600, 0);
        cache.clear(Some("o/t/day7_"));
        assert_eq!(cache.get_at("o/t/day7_photo1_1.jpg", 1), None);
        assert_eq!(cache.get_at("o/t/day7_photo2_1.jpg", 1), None);
        assert_eq!(cache.get_at("o/t/day14_photo1_1.jpg", 1), Some("u3".to_string()));

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites_existing_entry() {
        let cache = SignedUrlCache::new();
        cache.set_at("p", "old", 3600, 0);
        cache.set_at("p", "new", 3600, 0);
        assert_eq!(cache.get_at("p", 1), Some("new".to_string()));
    }
}
