//! Context cache handles.
//!
//! Providers that support native caching keep one opaque handle here. The
//! handle is valid while the cacheable content hash matches and less than
//! the TTL has elapsed since creation; anything else discards it. Failures
//! while creating or using a handle fall back to inline context — caching
//! can degrade cost, never correctness.

use std::time::{Duration, Instant};
use tracing::debug;

/// Default handle lifetime mandated by the caching contract.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CacheHandle {
    /// Provider-assigned name/ID of the cached content
    pub id: String,
    pub content_hash: u64,
    pub created_at: Instant,
}

/// One provider's cache slot plus invalidation/creation counters.
#[derive(Debug)]
pub struct ContextCache {
    handle: Option<CacheHandle>,
    ttl: Duration,
    invalidations: u64,
    creations: u64,
    failures: u64,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            handle: None,
            ttl,
            invalidations: 0,
            creations: 0,
            failures: 0,
        }
    }

    /// A handle usable for the given content hash, if one is still live.
    /// A stale or mismatched handle is discarded as a side effect.
    pub fn valid_handle(&mut self, content_hash: u64) -> Option<&CacheHandle> {
        let stale = match &self.handle {
            None => return None,
            Some(h) => {
                h.content_hash != content_hash || h.created_at.elapsed() >= self.ttl
            }
        };
        if stale {
            debug!("cache handle stale or content changed, discarding");
            self.invalidate();
            return None;
        }
        self.handle.as_ref()
    }

    /// Store a freshly created handle.
    pub fn store(&mut self, id: String, content_hash: u64) {
        self.creations += 1;
        self.handle = Some(CacheHandle {
            id,
            content_hash,
            created_at: Instant::now(),
        });
    }

    /// Drop the current handle, if any.
    pub fn invalidate(&mut self) {
        if self.handle.take().is_some() {
            self.invalidations += 1;
        }
    }

    /// Record a caching failure (creation or use). The caller falls back to
    /// inline context.
    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.invalidate();
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    pub fn creations(&self) -> u64 {
        self.creations
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable hash of the cacheable context text.
pub fn content_hash(text: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_survives_matching_hash() {
        let mut cache = ContextCache::new();
        let hash = content_hash("objectives v1");
        cache.store("cachedContents/abc".into(), hash);
        assert!(cache.valid_handle(hash).is_some());
        assert_eq!(cache.creations(), 1);
        assert_eq!(cache.invalidations(), 0);
    }

    #[test]
    fn content_change_invalidates_exactly_once() {
        let mut cache = ContextCache::new();
        cache.store("h1".into(), content_hash("objectives v1"));

        let new_hash = content_hash("objectives v2");
        assert!(cache.valid_handle(new_hash).is_none());
        assert_eq!(cache.invalidations(), 1);

        // The follow-up creation is the one new cache
        cache.store("h2".into(), new_hash);
        assert_eq!(cache.creations(), 2);
        assert!(cache.valid_handle(new_hash).is_some());
        assert_eq!(cache.invalidations(), 1);
    }

    #[test]
    fn ttl_expiry_discards_handle() {
        let mut cache = ContextCache::with_ttl(Duration::ZERO);
        let hash = content_hash("anything");
        cache.store("h".into(), hash);
        assert!(cache.valid_handle(hash).is_none());
        assert_eq!(cache.invalidations(), 1);
    }

    #[test]
    fn failure_counts_and_clears() {
        let mut cache = ContextCache::new();
        cache.store("h".into(), 42);
        cache.record_failure();
        assert!(!cache.has_handle());
        assert_eq!(cache.failures(), 1);
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
