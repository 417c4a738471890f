//! TTL response store for rendered feed pages.

use std::sync::RwLock;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::PageKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// A fully rendered response ready to replay verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

struct Entry {
    page: CachedPage,
    stored_at: Instant,
}

/// Time-bounded response cache.
///
/// Reads inside the TTL return the stored response even when the underlying
/// data has changed; expired entries are dropped on access. Capacity is LRU
/// bounded so arbitrary query strings cannot grow the map without limit.
pub struct PageCache {
    entries: RwLock<LruCache<PageKey, Entry>>,
    ttl: tokio::time::Duration,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.entry_limit_non_zero())),
            ttl: config.ttl,
        }
    }

    /// Look up a stored page, discarding it if the TTL has elapsed.
    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                counter!("cortile_feed_cache_hit_total").increment(1);
                Some(entry.page.clone())
            }
            Some(_) => {
                entries.pop(key);
                counter!("cortile_feed_cache_expired_total").increment(1);
                None
            }
            None => {
                counter!("cortile_feed_cache_miss_total").increment(1);
                None
            }
        }
    }

    /// Store a page, stamping it with the current instant.
    pub fn insert(&self, key: PageKey, page: CachedPage) {
        let evicted = rw_write(&self.entries, SOURCE, "insert").push(
            key,
            Entry {
                page,
                stored_at: Instant::now(),
            },
        );
        if evicted.is_some() {
            counter!("cortile_feed_cache_evict_total").increment(1);
        }
    }

    /// Manual invalidation: drop every entry regardless of age.
    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
        counter!("cortile_feed_cache_clear_total").increment(1);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn sample_page(body: &str) -> CachedPage {
        CachedPage {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn key(query: &str) -> PageKey {
        PageKey::new("feed_index", "/", query)
    }

    #[tokio::test]
    async fn round_trip_within_ttl() {
        let cache = PageCache::new(&CacheConfig::default());

        assert!(cache.get(&key("")).is_none());

        cache.insert(key(""), sample_page("feed"));

        let cached = cache.get(&key("")).expect("cached page");
        assert_eq!(cached.body, Bytes::from("feed"));
        assert_eq!(cached.status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = PageCache::new(&CacheConfig::default());
        cache.insert(key(""), sample_page("feed"));

        tokio::time::advance(std::time::Duration::from_secs(19)).await;
        assert!(cache.get(&key("")).is_some());

        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!(cache.get(&key("")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn clear_bypasses_ttl() {
        let cache = PageCache::new(&CacheConfig::default());
        cache.insert(key(""), sample_page("feed"));
        cache.insert(key("page=2"), sample_page("feed page two"));
        assert_eq!(cache.len(), 2);

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get(&key("")).is_none());
    }

    #[tokio::test]
    async fn pages_are_keyed_by_query() {
        let cache = PageCache::new(&CacheConfig::default());
        cache.insert(key("page=1"), sample_page("one"));
        cache.insert(key("page=2"), sample_page("two"));

        assert_eq!(cache.get(&key("page=1")).expect("page one").body, Bytes::from("one"));
        assert_eq!(cache.get(&key("page=2")).expect("page two").body, Bytes::from("two"));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let config = CacheConfig {
            entry_limit: 2,
            ..Default::default()
        };
        let cache = PageCache::new(&config);

        cache.insert(key("page=1"), sample_page("one"));
        cache.insert(key("page=2"), sample_page("two"));
        cache.insert(key("page=3"), sample_page("three"));

        assert!(cache.get(&key("page=1")).is_none());
        assert!(cache.get(&key("page=2")).is_some());
        assert!(cache.get(&key("page=3")).is_some());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let cache = PageCache::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.entries.write().expect("lock should be acquired");
            panic!("poison the entries lock");
        }));

        cache.insert(key(""), sample_page("feed"));
        assert!(cache.get(&key("")).is_some());
    }
}
