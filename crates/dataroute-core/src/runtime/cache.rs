// crates/dataroute-core/src/runtime/cache.rs
// ============================================================================
// Module: Routing Cache
// Description: TTL + LRU cache for routing decisions with background sweep.
// Purpose: Reuse routing decisions across calls without re-running strategies.
// Dependencies: dashmap, tracing
// ============================================================================

//! ## Overview
//! The cache maps a decision key to a cached (data source, table) pair.
//! Lookups remove expired entries lazily and refresh the entry's last-access
//! time; insertions at capacity evict the entry with the oldest last access
//! first. The eviction scan is a best-effort approximation under concurrent
//! access: the configured maximum may be overshot by a small margin, never
//! undercounted. A background sweeper removes expired entries proactively
//! and supports shutdown with a bounded wait followed by detachment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;
use tracing::trace;
use tracing::warn;

// ============================================================================
// SECTION: Cached Route
// ============================================================================

/// Cached routing result: the decided data source and table name.
///
/// # Invariants
/// - `table_name` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRoute {
    /// Decided data source; `None` keeps the ambient default.
    pub data_source: Option<String>,
    /// Decided physical table name.
    pub table_name: String,
}

/// One cache slot with expiry and access bookkeeping.
#[derive(Debug)]
struct CacheEntry {
    /// Cached routing result.
    route: CachedRoute,
    /// Absolute expiry instant.
    expires_at: Instant,
    /// Milliseconds since the cache origin at last access.
    last_access: AtomicU64,
}

// ============================================================================
// SECTION: Cache Core
// ============================================================================

/// Shared cache state accessed by callers and the sweeper.
#[derive(Debug)]
struct CacheInner {
    /// Entries keyed by decision key.
    entries: DashMap<String, CacheEntry>,
    /// Maximum entry count enforced on insertion.
    capacity: usize,
    /// Origin instant for last-access timestamps.
    origin: Instant,
}

impl CacheInner {
    /// Returns milliseconds elapsed since the cache origin.
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Removes all expired entries; returns the number removed.
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Evicts the entry with the oldest last access.
    ///
    /// Linear scan; acceptable at the intended scale of roughly a thousand
    /// entries.
    fn evict_oldest(&self) {
        let mut oldest: Option<(String, u64)> = None;
        for entry in &self.entries {
            let accessed = entry.value().last_access.load(Ordering::Relaxed);
            let replace = oldest.as_ref().is_none_or(|(_, current)| accessed < *current);
            if replace {
                oldest = Some((entry.key().clone(), accessed));
            }
        }
        if let Some((key, _)) = oldest {
            self.entries.remove(&key);
        }
    }
}

// ============================================================================
// SECTION: Route Cache
// ============================================================================

/// TTL + LRU routing decision cache.
///
/// # Invariants
/// - `get`/`put`/`evict` are individually atomic over the concurrent map.
/// - Size never exceeds capacity after an insertion completes, modulo the
///   documented best-effort margin under concurrent insertion.
#[derive(Debug)]
pub struct RouteCache {
    /// Shared cache state.
    inner: Arc<CacheInner>,
    /// Running sweeper, when started.
    sweeper: Mutex<Option<Sweeper>>,
}

impl RouteCache {
    /// Creates a cache with the given maximum entry count.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                capacity: capacity.max(1),
                origin: Instant::now(),
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Looks up a non-expired entry, refreshing its last-access time.
    ///
    /// Expired entries are removed as a side effect of the failed lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CachedRoute> {
        let expired = {
            let entry = self.inner.entries.get(key)?;
            if Instant::now() >= entry.expires_at {
                true
            } else {
                entry.last_access.store(self.inner.now_millis(), Ordering::Relaxed);
                return Some(entry.route.clone());
            }
        };
        if expired {
            self.inner.entries.remove(key);
        }
        None
    }

    /// Inserts a routing result with the given time-to-live.
    ///
    /// At capacity, the entry with the oldest last access is evicted first.
    pub fn put(&self, key: &str, route: CachedRoute, ttl: Duration) {
        if !self.inner.entries.contains_key(key)
            && self.inner.entries.len() >= self.inner.capacity
        {
            self.inner.evict_oldest();
        }
        let now = self.inner.now_millis();
        self.inner.entries.insert(key.to_string(), CacheEntry {
            route,
            expires_at: Instant::now() + ttl,
            last_access: AtomicU64::new(now),
        });
    }

    /// Removes one entry.
    pub fn evict(&self, key: &str) {
        self.inner.entries.remove(key);
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Returns the current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Starts the background expiry sweeper.
    ///
    /// A second call while a sweeper is running is a no-op.
    pub fn start_sweeper(&self, interval: Duration) {
        let Ok(mut slot) = self.sweeper.lock() else {
            warn!("cache sweeper state poisoned; sweeper not started");
            return;
        };
        if slot.is_some() {
            return;
        }
        *slot = Some(Sweeper::spawn(Arc::clone(&self.inner), interval));
    }

    /// Stops the background sweeper, waiting up to `wait` for the in-flight
    /// sweep to finish before detaching the thread.
    pub fn shutdown_sweeper(&self, wait: Duration) {
        let Ok(mut slot) = self.sweeper.lock() else {
            return;
        };
        if let Some(sweeper) = slot.take() {
            sweeper.stop(wait);
        }
    }
}

impl Drop for RouteCache {
    fn drop(&mut self) {
        // Signal without waiting; the sweeper thread exits on its own.
        if let Ok(mut slot) = self.sweeper.lock()
            && let Some(sweeper) = slot.take()
        {
            sweeper.stop(Duration::ZERO);
        }
    }
}

// ============================================================================
// SECTION: Background Sweeper
// ============================================================================

/// Handle to the background sweep thread.
#[derive(Debug)]
struct Sweeper {
    /// Channel signalling shutdown to the sweep loop.
    stop_tx: mpsc::Sender<()>,
    /// Channel reporting sweep-loop exit.
    done_rx: mpsc::Receiver<()>,
}

impl Sweeper {
    /// Spawns the sweep loop.
    fn spawn(inner: Arc<CacheInner>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let builder = thread::Builder::new().name("dataroute-cache-sweep".to_string());
        let spawned = builder.spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let removed = inner.sweep();
                        if removed > 0 {
                            trace!(removed, "cache sweep removed expired entries");
                        }
                    }
                }
            }
            let _ = done_tx.send(());
        });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn cache sweeper");
        }
        Self {
            stop_tx,
            done_rx,
        }
    }

    /// Requests shutdown and waits up to `wait` for the loop to exit.
    fn stop(self, wait: Duration) {
        let _ = self.stop_tx.send(());
        if wait.is_zero() {
            return;
        }
        if self.done_rx.recv_timeout(wait).is_err() {
            debug!("cache sweeper did not stop within the wait; detaching");
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn route(data_source: &str, table: &str) -> CachedRoute {
        CachedRoute {
            data_source: Some(data_source.to_string()),
            table_name: table.to_string(),
        }
    }

    #[test]
    fn entry_expires_after_ttl_and_is_removed() {
        let cache = RouteCache::new(8);
        cache.put("k", route("primary", "user"), Duration::from_millis(100));
        assert!(cache.get("k").is_some());

        thread::sleep(Duration::from_millis(150));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_evicts_least_recently_accessed() {
        let cache = RouteCache::new(2);
        cache.put("a", route("d1", "t1"), Duration::from_secs(60));
        thread::sleep(Duration::from_millis(5));
        cache.put("b", route("d2", "t2"), Duration::from_secs(60));
        thread::sleep(Duration::from_millis(5));

        // Touch "a" so "b" becomes the oldest-accessed entry.
        assert!(cache.get("a").is_some());
        thread::sleep(Duration::from_millis(5));
        cache.put("c", route("d3", "t3"), Duration::from_secs(60));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweeper_removes_expired_entries() {
        let cache = RouteCache::new(8);
        cache.put("k", route("primary", "user"), Duration::from_millis(20));
        cache.start_sweeper(Duration::from_millis(10));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(cache.len(), 0);
        cache.shutdown_sweeper(Duration::from_secs(1));
    }

    #[test]
    fn clear_and_evict_remove_entries() {
        let cache = RouteCache::new(8);
        cache.put("a", route("d1", "t1"), Duration::from_secs(60));
        cache.put("b", route("d2", "t2"), Duration::from_secs(60));
        cache.evict("a");
        assert!(cache.get("a").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
