//! In-memory artwork cache
//!
//! A byte-budgeted map from (artwork id, target size) to encoded images.
//! Only resized images are cached; raw entries are rejected, though probing
//! for one still counts as a miss so the counters reflect real traffic.
//! Under memory pressure, uniformly random entries are evicted until the new
//! image fits.

use crate::imaging::{EncodedImage, ImageSize};
use mezzo_common::db::models::ArtworkId;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryDesc {
    pub id: ArtworkId,
    pub size: Option<ImageSize>,
}

struct CacheInner {
    entries: HashMap<EntryDesc, Arc<EncodedImage>>,
    total_size: usize,
}

pub struct ImageCache {
    max_cache_size: usize,
    inner: RwLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageCache {
    pub fn new(max_cache_size: usize) -> Self {
        Self {
            max_cache_size,
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                total_size: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Insert a resized image, evicting random entries while over budget.
    /// Raw entries (no size) are never cached.
    pub fn add_image(&self, desc: EntryDesc, image: Arc<EncodedImage>) {
        if desc.size.is_none() {
            return;
        }

        let mut inner = self.inner.write().unwrap();

        while inner.total_size + image.size() > self.max_cache_size && !inner.entries.is_empty() {
            let victim = *inner
                .entries
                .keys()
                .choose(&mut rand::thread_rng())
                .expect("cache is non-empty");
            if let Some(evicted) = inner.entries.remove(&victim) {
                inner.total_size -= evicted.size();
            }
        }

        inner.total_size += image.size();
        if let Some(replaced) = inner.entries.insert(desc, image) {
            inner.total_size -= replaced.size();
        }
    }

    /// Probe the cache. Every probe counts as a hit or a miss, including
    /// probes for never-cached raw entries.
    pub fn get_image(&self, desc: &EntryDesc) -> Option<Arc<EncodedImage>> {
        if desc.size.is_none() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let inner = self.inner.read().unwrap();
        match inner.entries.get(desc) {
            Some(image) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(image))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop every entry, log the counters and reset them
    pub fn flush(&self) {
        let mut inner = self.inner.write().unwrap();

        tracing::debug!(
            hits = self.hits.load(Ordering::Relaxed),
            misses = self.misses.load(Ordering::Relaxed),
            entries = inner.entries.len(),
            size = inner.total_size,
            "Flushing artwork cache"
        );

        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        inner.entries.clear();
        inner.total_size = 0;
    }

    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    pub fn current_size(&self) -> usize {
        self.inner.read().unwrap().total_size
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_of(bytes: usize) -> Arc<EncodedImage> {
        Arc::new(EncodedImage::new("image/jpeg", vec![0u8; bytes]))
    }

    fn desc(id: i64, size: Option<ImageSize>) -> EntryDesc {
        EntryDesc {
            id: ArtworkId(id),
            size,
        }
    }

    #[test]
    fn test_eviction_keeps_size_within_budget() {
        let cache = ImageCache::new(1000);

        for i in 0..10 {
            cache.add_image(desc(1, Some(100 + i)), image_of(200));
            assert!(cache.current_size() <= 1000);
        }

        assert_eq!(cache.entry_count(), 5);
        assert_eq!(cache.current_size(), 1000);
    }

    #[test]
    fn test_size_tracks_stored_bytes() {
        let cache = ImageCache::new(10_000);
        cache.add_image(desc(1, Some(128)), image_of(300));
        cache.add_image(desc(2, Some(128)), image_of(500));
        assert_eq!(cache.current_size(), 800);

        // Overwriting adjusts the counter for the replaced bytes
        cache.add_image(desc(1, Some(128)), image_of(100));
        assert_eq!(cache.current_size(), 600);
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_raw_entries_are_never_cached_but_count_as_misses() {
        let cache = ImageCache::new(10_000);
        cache.add_image(desc(1, None), image_of(100));
        assert_eq!(cache.entry_count(), 0);

        assert!(cache.get_image(&desc(1, None)).is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = ImageCache::new(10_000);
        cache.add_image(desc(7, Some(64)), image_of(10));

        assert!(cache.get_image(&desc(7, Some(64))).is_some());
        assert!(cache.get_image(&desc(7, Some(128))).is_none());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_flush_clears_entries_and_counters() {
        let cache = ImageCache::new(10_000);
        cache.add_image(desc(7, Some(64)), image_of(10));
        let before = cache.get_image(&desc(7, Some(64))).unwrap();

        cache.flush();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.misses(), 0);

        // The flushed entry is gone; the bytes held before the flush are
        // unchanged
        assert!(cache.get_image(&desc(7, Some(64))).is_none());
        assert_eq!(before.size(), 10);
    }
}
