//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

/// How long a cached feed page stays valid.
pub const DEFAULT_FEED_CACHE_TTL_SECS: u64 = 20;
const DEFAULT_ENTRY_LIMIT: usize = 64;
const DEFAULT_KEY_PREFIX: &str = "feed_index";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Disables the cache layer entirely when false.
    pub enabled: bool,
    /// Validity window counted from the instant a response is stored.
    pub ttl: Duration,
    /// Maximum cached responses; least recently used entries are evicted.
    pub entry_limit: usize,
    /// Namespace prepended to every cache key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_FEED_CACHE_TTL_SECS),
            entry_limit: DEFAULT_ENTRY_LIMIT,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            entry_limit: settings.entry_limit,
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

impl CacheConfig {
    /// Entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(20));
        assert_eq!(config.entry_limit, 64);
        assert_eq!(config.key_prefix, "feed_index");
    }

    #[test]
    fn entry_limit_clamps_to_min() {
        let config = CacheConfig {
            entry_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.entry_limit_non_zero().get(), 1);
    }
}
