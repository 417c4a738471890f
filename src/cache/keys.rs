//! Cache key definitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies one cached feed response: the configured prefix, the request
/// path, and a hash of the query string (so `?page=2` and `?page=3` occupy
/// separate slots). No viewer identity enters the key; the cached page is
/// shared by everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub prefix: String,
    pub path: String,
    pub query_hash: u64,
}

impl PageKey {
    pub fn new(prefix: &str, path: &str, query: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            query_hash: hash_query(query),
        }
    }
}

/// Hash a query string for cache key generation.
pub fn hash_query(query: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_request_produces_same_key() {
        let a = PageKey::new("feed_index", "/", "page=2");
        let b = PageKey::new("feed_index", "/", "page=2");
        assert_eq!(a, b);
    }

    #[test]
    fn different_pages_produce_different_keys() {
        let a = PageKey::new("feed_index", "/", "page=1");
        let b = PageKey::new("feed_index", "/", "page=2");
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_partitions_the_keyspace() {
        let a = PageKey::new("feed_index", "/", "");
        let b = PageKey::new("other", "/", "");
        assert_ne!(a, b);
    }
}
