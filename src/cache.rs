//! Keyed single-flight chunk cache
//!
//! A concurrent memo over `(cx, cy) -> Arc<Chunk>` with three contracts:
//!
//! - **At-most-once generation.** The first requester of a coordinate
//!   claims the build; everyone else awaits the same watch channel and
//!   observes the identical result. The build runs on a detached blocking
//!   task, so a requester that goes away does not cancel it: the chunk
//!   still publishes for later callers.
//! - **Publication after success.** A chunk becomes visible only when its
//!   build completed and passed the self-check. Failed builds clear the
//!   in-flight marker and propagate the error to every waiter; nothing is
//!   cached.
//! - **Bounded memory.** Published entries are LRU-evicted beyond the
//!   configured capacity. Eviction is safe because generation is pure;
//!   a re-request rebuilds the identical chunk.
//!
//! No lock is held during generation. The map mutex guards only claim and
//! publish, both O(log n).

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::generator::GenerateError;
use crate::Chunk;

type Key = (i32, i32);
type BuildResult = Result<Arc<Chunk>, GenerateError>;
type Publication = watch::Receiver<Option<BuildResult>>;

enum Slot {
    Ready { chunk: Arc<Chunk>, tick: u64 },
    Pending(Publication),
}

struct Inner {
    entries: HashMap<Key, Slot>,
    /// Recency index over the `Ready` entries: tick -> key, oldest first.
    order: BTreeMap<u64, Key>,
    tick: u64,
}

enum Claim {
    Hit(Arc<Chunk>),
    Wait(Publication),
    Build(watch::Sender<Option<BuildResult>>),
}

/// Capacity-bounded single-flight memo over chunk coordinates.
pub struct ChunkCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ChunkCache {
    /// An empty cache holding at most `capacity` published chunks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
            }),
        }
    }

    /// Number of published chunks currently held.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// True when no chunk is published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is published (pending builds do not count).
    pub fn contains(&self, key: Key) -> bool {
        matches!(self.lock().entries.get(&key), Some(Slot::Ready { .. }))
    }

    /// Fetch the chunk for `key`, building it with `build` on a detached
    /// blocking task if neither a published entry nor an in-flight build
    /// exists. Concurrent callers for the same key coalesce onto one
    /// build; all of them observe its result.
    pub async fn get_or_build<F>(self: Arc<Self>, key: Key, build: F) -> BuildResult
    where
        F: FnOnce() -> Result<Chunk, GenerateError> + Send + 'static,
    {
        match self.claim(key) {
            Claim::Hit(chunk) => Ok(chunk),
            Claim::Wait(rx) => await_publication(rx).await,
            Claim::Build(tx) => {
                let rx = tx.subscribe();
                let cache = Arc::clone(&self);
                tokio::spawn(async move {
                    let result = match tokio::task::spawn_blocking(build).await {
                        Ok(Ok(chunk)) => Ok(Arc::new(chunk)),
                        Ok(Err(e)) => Err(e),
                        Err(join) => Err(GenerateError::Aborted(join.to_string())),
                    };
                    // Publish into the map first, then wake the waiters.
                    cache.publish(key, &result);
                    let _ = tx.send(Some(result));
                });
                await_publication(rx).await
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("chunk cache mutex poisoned")
    }

    /// Resolve `key` to a hit, an in-flight build to await, or a claim to
    /// build. Claiming installs the pending marker atomically, so exactly
    /// one caller ever receives `Claim::Build` per missing key.
    fn claim(&self, key: Key) -> Claim {
        let mut inner = self.lock();
        if let Some(slot) = inner.entries.get(&key) {
            match slot {
                Slot::Ready { chunk, tick } => {
                    let chunk = Arc::clone(chunk);
                    let old = *tick;
                    inner.tick += 1;
                    let now = inner.tick;
                    inner.order.remove(&old);
                    inner.order.insert(now, key);
                    if let Some(Slot::Ready { tick, .. }) = inner.entries.get_mut(&key) {
                        *tick = now;
                    }
                    trace!(?key, "cache hit");
                    return Claim::Hit(chunk);
                }
                Slot::Pending(rx) => {
                    trace!(?key, "joining in-flight build");
                    return Claim::Wait(rx.clone());
                }
            }
        }
        let (tx, rx) = watch::channel(None);
        inner.entries.insert(key, Slot::Pending(rx));
        trace!(?key, "claimed build");
        Claim::Build(tx)
    }

    /// Record a finished build. Successes enter the LRU index and may
    /// evict the stalest entries; failures only clear the marker.
    fn publish(&self, key: Key, result: &BuildResult) {
        let mut inner = self.lock();
        match result {
            Ok(chunk) => {
                inner.tick += 1;
                let now = inner.tick;
                inner.order.insert(now, key);
                inner.entries.insert(key, Slot::Ready { chunk: Arc::clone(chunk), tick: now });
                while inner.order.len() > self.capacity {
                    if let Some((_, stale)) = inner.order.pop_first() {
                        inner.entries.remove(&stale);
                        debug!(?stale, "evicted chunk");
                    }
                }
            }
            Err(e) => {
                inner.entries.remove(&key);
                debug!(?key, error = %e, "build failed, not cached");
            }
        }
    }
}

/// Wait until the build behind `rx` publishes, then return its result.
async fn await_publication(mut rx: Publication) -> BuildResult {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        if rx.changed().await.is_err() {
            // Builder task is gone; its final send (if any) is still
            // observable in the channel.
            let last = rx.borrow().clone();
            return last.unwrap_or_else(|| Err(GenerateError::Aborted("builder vanished".into())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate_chunk;
    use crate::GenConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_chunk(cx: i32, cy: i32) -> Chunk {
        let config = GenConfig { world_seed: 1, ..GenConfig::default() };
        generate_chunk(&config, cx, cy)
    }

    #[tokio::test]
    async fn miss_builds_and_hit_reuses() {
        let cache = Arc::new(ChunkCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let got = Arc::clone(&cache)
                .get_or_build((2, 3), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(test_chunk(2, 3))
                })
                .await
                .unwrap();
            assert_eq!((got.cx, got.cy), (2, 3));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_coalesce_onto_one_build() {
        let cache = Arc::new(ChunkCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build((7, 7), move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the build open long enough for every task
                        // to join the pending entry.
                        std::thread::sleep(Duration::from_millis(20));
                        Ok(test_chunk(7, 7))
                    })
                    .await
            }));
        }

        let mut first: Option<Arc<Chunk>> = None;
        for h in handles {
            let chunk = h.await.unwrap().unwrap();
            match &first {
                None => first = Some(chunk),
                Some(f) => assert!(Arc::ptr_eq(f, &chunk) || **f == *chunk),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced_lru_first() {
        let cache = Arc::new(ChunkCache::new(2));

        for cx in 0..2 {
            Arc::clone(&cache)
                .get_or_build((cx, 0), move || Ok(test_chunk(cx, 0)))
                .await
                .unwrap();
        }
        // Touch (0,0) so (1,0) becomes the stalest entry.
        Arc::clone(&cache)
            .get_or_build((0, 0), || panic!("unexpected rebuild"))
            .await
            .unwrap();

        Arc::clone(&cache)
            .get_or_build((2, 0), || Ok(test_chunk(2, 0)))
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains((0, 0)));
        assert!(cache.contains((2, 0)));
        assert!(!cache.contains((1, 0)));
    }

    #[tokio::test]
    async fn capacity_holds_under_many_keys() {
        let cache = Arc::new(ChunkCache::new(4));
        for cx in -10..=10 {
            Arc::clone(&cache)
                .get_or_build((cx, 5), move || Ok(test_chunk(cx, 5)))
                .await
                .unwrap();
            assert!(cache.len() <= 4);
        }
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn failed_builds_are_not_cached_and_can_retry() {
        let cache = Arc::new(ChunkCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let err = Arc::clone(&cache)
            .get_or_build((9, 9), move || {
                c1.fetch_add(1, Ordering::SeqCst);
                Err(GenerateError::Inconsistent { cx: 9, cy: 9, detail: "induced".into() })
            })
            .await;
        assert!(err.is_err());
        assert!(!cache.contains((9, 9)));

        let c2 = Arc::clone(&calls);
        let ok = Arc::clone(&cache)
            .get_or_build((9, 9), move || {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(test_chunk(9, 9))
            })
            .await;
        assert!(ok.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.contains((9, 9)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_requests_still_publish() {
        let cache = Arc::new(ChunkCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let requester = tokio::spawn(Arc::clone(&cache).get_or_build((4, 4), move || {
            c1.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(40));
            Ok(test_chunk(4, 4))
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
        requester.abort();

        // The detached build keeps running and publishes.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.contains((4, 4)));

        let got = Arc::clone(&cache)
            .get_or_build((4, 4), || panic!("must not rebuild"))
            .await
            .unwrap();
        assert_eq!((got.cx, got.cy), (4, 4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let cache = Arc::new(ChunkCache::new(64));
        for (cx, cy) in [(0, 0), (0, 1), (1, 0), (-1, 0), (0, -1)] {
            Arc::clone(&cache)
                .get_or_build((cx, cy), move || Ok(test_chunk(cx, cy)))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 5);
        for (cx, cy) in [(0, 0), (0, 1), (1, 0), (-1, 0), (0, -1)] {
            let got = Arc::clone(&cache)
                .get_or_build((cx, cy), || panic!("must not rebuild"))
                .await
                .unwrap();
            assert_eq!((got.cx, got.cy), (cx, cy));
        }
    }
}
