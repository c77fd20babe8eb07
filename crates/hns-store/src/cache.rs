//! Metadata cache for object headers and other addressed metadata.
//!
//! Entries are keyed by address and tagged with the address of the object
//! that owns them, so every entry belonging to one group can be flushed or
//! evicted together when the group is closed. Protected (pinned) entries and
//! entries whose tag is corked are never evicted. Unprotected entries beyond
//! the byte budget are evicted least-recently-used first.

use std::collections::{HashMap, HashSet};

use hns_types::Address;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{StoreError, StoreResult};

/// Default metadata cache size: 2 MiB.
pub const DEFAULT_METADATA_CACHE_BYTES: usize = 2 * 1024 * 1024;

/// Size charged for an entry whose real size is zero.
const MIN_ENTRY_BYTES: usize = 64;

struct CacheEntry {
    tag: Address,
    size: usize,
    pins: u32,
    dirty: bool,
    last_access: u64,
}

struct CacheInner {
    entries: HashMap<Address, CacheEntry>,
    corked: HashSet<Address>,
    current_bytes: usize,
    max_bytes: usize,
    tick: u64,
    stats: CacheStats,
}

/// Counters describing cache activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub flushes: u64,
    pub evictions: u64,
    pub entries: usize,
    pub dirty: usize,
    pub bytes: usize,
}

/// A tagged metadata cache with protect/unprotect pinning.
pub struct MetadataCache {
    inner: Mutex<CacheInner>,
}

impl MetadataCache {
    /// Create a cache with the default byte budget.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_METADATA_CACHE_BYTES)
    }

    /// Create a cache with a custom byte budget.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                corked: HashSet::new(),
                current_bytes: 0,
                max_bytes,
                tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Pin the entry at `addr`, loading it if absent.
    ///
    /// A protected entry stays resident until every protect is matched by an
    /// [`unprotect`](Self::unprotect).
    pub fn protect(&self, addr: Address, tag: Address, size: usize) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let size = size.max(MIN_ENTRY_BYTES);
        match inner.entries.get_mut(&addr) {
            Some(entry) => {
                entry.pins += 1;
                entry.last_access = tick;
                inner.stats.hits += 1;
            }
            None => {
                inner.entries.insert(
                    addr,
                    CacheEntry {
                        tag,
                        size,
                        pins: 1,
                        dirty: false,
                        last_access: tick,
                    },
                );
                inner.current_bytes += size;
                inner.stats.misses += 1;
                inner.shrink();
            }
        }
    }

    /// Release one pin on `addr`, optionally marking it dirty.
    pub fn unprotect(&self, addr: Address, dirty: bool) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(&addr)
            .filter(|e| e.pins > 0)
            .ok_or(StoreError::EntryNotProtected(addr))?;
        entry.pins -= 1;
        entry.dirty |= dirty;
        inner.shrink();
        Ok(())
    }

    /// Mark a resident entry dirty. Absent entries are loaded dirty.
    pub fn mark_dirty(&self, addr: Address, tag: Address) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(&addr) {
            Some(entry) => {
                entry.dirty = true;
                entry.last_access = tick;
            }
            None => {
                inner.entries.insert(
                    addr,
                    CacheEntry {
                        tag,
                        size: MIN_ENTRY_BYTES,
                        pins: 0,
                        dirty: true,
                        last_access: tick,
                    },
                );
                inner.current_bytes += MIN_ENTRY_BYTES;
                inner.shrink();
            }
        }
    }

    /// Returns `true` if `addr` is resident and dirty.
    pub fn is_dirty(&self, addr: Address) -> bool {
        self.inner
            .lock()
            .entries
            .get(&addr)
            .is_some_and(|e| e.dirty)
    }

    /// Returns `true` if `addr` is resident.
    pub fn contains(&self, addr: Address) -> bool {
        self.inner.lock().entries.contains_key(&addr)
    }

    /// Keep every entry tagged `tag` resident until [`uncork`](Self::uncork).
    pub fn cork(&self, tag: Address) {
        self.inner.lock().corked.insert(tag);
    }

    /// Undo a [`cork`](Self::cork). Returns `false` if the tag was not corked.
    pub fn uncork(&self, tag: Address) -> bool {
        let mut inner = self.inner.lock();
        let was = inner.corked.remove(&tag);
        inner.shrink();
        was
    }

    /// Returns `true` if `tag` is corked.
    pub fn is_corked(&self, tag: Address) -> bool {
        self.inner.lock().corked.contains(&tag)
    }

    /// Write back every dirty entry tagged `tag`. Returns the number flushed.
    pub fn flush_tagged(&self, tag: Address) -> usize {
        let mut inner = self.inner.lock();
        let mut flushed = 0;
        for entry in inner.entries.values_mut().filter(|e| e.tag == tag) {
            if entry.dirty {
                entry.dirty = false;
                flushed += 1;
            }
        }
        inner.stats.flushes += flushed as u64;
        trace!(tag = %tag, flushed, "flushed tagged entries");
        flushed
    }

    /// Write back every dirty entry.
    pub fn flush_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut flushed = 0;
        for entry in inner.entries.values_mut() {
            if entry.dirty {
                entry.dirty = false;
                flushed += 1;
            }
        }
        inner.stats.flushes += flushed as u64;
        flushed
    }

    /// Flush and drop every entry tagged `tag`.
    ///
    /// Fails without evicting anything if one of those entries is still
    /// protected. Corked tags are left alone and report zero evictions.
    pub fn evict_tagged(&self, tag: Address) -> StoreResult<usize> {
        let mut inner = self.inner.lock();
        if inner.corked.contains(&tag) {
            return Ok(0);
        }
        if let Some((addr, _)) = inner
            .entries
            .iter()
            .find(|(_, e)| e.tag == tag && e.pins > 0)
        {
            return Err(StoreError::EntryProtected(*addr));
        }
        let doomed: Vec<Address> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.tag == tag)
            .map(|(a, _)| *a)
            .collect();
        for addr in &doomed {
            inner.remove(*addr);
        }
        inner.stats.evictions += doomed.len() as u64;
        trace!(tag = %tag, evicted = doomed.len(), "evicted tagged entries");
        Ok(doomed.len())
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            dirty: inner.entries.values().filter(|e| e.dirty).count(),
            bytes: inner.current_bytes,
            ..inner.stats
        }
    }
}

impl CacheInner {
    fn remove(&mut self, addr: Address) {
        if let Some(entry) = self.entries.remove(&addr) {
            if entry.dirty {
                self.stats.flushes += 1;
            }
            self.current_bytes = self.current_bytes.saturating_sub(entry.size);
        }
    }

    /// Evict least-recently-used unpinned, uncorked entries until the cache
    /// fits its budget or nothing more can go.
    fn shrink(&mut self) {
        while self.current_bytes > self.max_bytes {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| e.pins == 0 && !self.corked.contains(&e.tag))
                .min_by_key(|(_, e)| e.last_access)
                .map(|(a, _)| *a);
            let Some(addr) = victim else { break };
            self.remove(addr);
            self.stats.evictions += 1;
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("MetadataCache")
            .field("entries", &stats.entries)
            .field("bytes", &stats.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::new(n)
    }

    // ---- Test 1: Protect counts misses then hits ----
    #[test]
    fn protect_counts_hits_and_misses() {
        let cache = MetadataCache::new();
        cache.protect(addr(1), addr(1), 100);
        cache.unprotect(addr(1), false).unwrap();
        cache.protect(addr(1), addr(1), 100);
        cache.unprotect(addr(1), false).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    // ---- Test 2: Unprotect without protect fails ----
    #[test]
    fn unprotect_without_protect_fails() {
        let cache = MetadataCache::new();
        assert!(matches!(
            cache.unprotect(addr(5), false),
            Err(StoreError::EntryNotProtected(_))
        ));
    }

    // ---- Test 3: Dirty entries are flushed by tag ----
    #[test]
    fn flush_tagged_cleans_only_that_tag() {
        let cache = MetadataCache::new();
        cache.mark_dirty(addr(1), addr(10));
        cache.mark_dirty(addr(2), addr(10));
        cache.mark_dirty(addr(3), addr(20));

        assert_eq!(cache.flush_tagged(addr(10)), 2);
        assert!(!cache.is_dirty(addr(1)));
        assert!(cache.is_dirty(addr(3)));
    }

    // ---- Test 4: Evicting a tag with a pinned entry fails ----
    #[test]
    fn evict_tagged_refuses_protected() {
        let cache = MetadataCache::new();
        cache.protect(addr(1), addr(10), 0);
        cache.mark_dirty(addr(2), addr(10));

        assert!(matches!(
            cache.evict_tagged(addr(10)),
            Err(StoreError::EntryProtected(_))
        ));
        cache.unprotect(addr(1), false).unwrap();
        assert_eq!(cache.evict_tagged(addr(10)).unwrap(), 2);
        assert!(!cache.contains(addr(1)));
        assert_eq!(cache.stats().entries, 0);
    }

    // ---- Test 5: Corked tags survive eviction ----
    #[test]
    fn corked_tag_is_not_evicted() {
        let cache = MetadataCache::new();
        cache.mark_dirty(addr(1), addr(10));
        cache.cork(addr(10));
        assert!(cache.is_corked(addr(10)));
        assert_eq!(cache.evict_tagged(addr(10)).unwrap(), 0);
        assert!(cache.contains(addr(1)));

        assert!(cache.uncork(addr(10)));
        assert!(!cache.uncork(addr(10)));
        assert_eq!(cache.evict_tagged(addr(10)).unwrap(), 1);
    }

    // ---- Test 6: Budget evicts least recently used ----
    #[test]
    fn budget_evicts_lru() {
        let cache = MetadataCache::with_capacity(250);
        for n in 1..=3 {
            cache.protect(addr(n), addr(n), 100);
            cache.unprotect(addr(n), false).unwrap();
        }
        // Three 100-byte entries exceed 250; the oldest goes.
        assert!(!cache.contains(addr(1)));
        assert!(cache.contains(addr(2)));
        assert!(cache.contains(addr(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    // ---- Test 7: Pinned entries are never evicted by budget ----
    #[test]
    fn pinned_entries_survive_budget() {
        let cache = MetadataCache::with_capacity(100);
        cache.protect(addr(1), addr(1), 100);
        cache.protect(addr(2), addr(2), 100);
        assert!(cache.contains(addr(1)));
        assert!(cache.contains(addr(2)));
        cache.unprotect(addr(1), false).unwrap();
        assert!(!cache.contains(addr(1)));
    }
}
