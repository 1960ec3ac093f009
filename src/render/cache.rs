//! LRU store for rasterized page bitmaps

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::document::Bitmap;

/// Cache key for rasterized pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// 1-based page number
    pub page: u32,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(page: u32, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: (scale * 1_000_000.0) as u32,
        }
    }
}

/// LRU cache for page bitmaps; bounds how many pages hold pixels at once
pub struct PageCache {
    cache: LruCache<CacheKey, Arc<Bitmap>>,
}

impl PageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached bitmap, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        self.cache.get(key).cloned()
    }

    /// Get a cached bitmap without promoting it
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        self.cache.peek(key).cloned()
    }

    /// Check if a key is in the cache without promoting it
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a bitmap. Returns the key pushed out to make room, if any.
    pub fn insert(&mut self, key: CacheKey, bitmap: Bitmap) -> (Arc<Bitmap>, Option<CacheKey>) {
        let arc = Arc::new(bitmap);
        let evicted = self
            .cache
            .push(key, Arc::clone(&arc))
            .map(|(old_key, _)| old_key)
            .filter(|old_key| *old_key != key);
        (arc, evicted)
    }

    /// Clear all cached bitmaps
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Drop every cached scale of a specific page
    pub fn invalidate_page(&mut self, page: u32) {
        let keys_to_remove: Vec<_> = self
            .cache
            .iter()
            .filter(|(k, _)| k.page == page)
            .map(|(k, _)| *k)
            .collect();

        for key in keys_to_remove {
            self.cache.pop(&key);
        }
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cache capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
