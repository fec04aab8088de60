//! Concurrent deduplicating memoisation with TTL expiry.
//!
//! The map is guarded by a plain mutex held only for synchronous lookup
//! and insert; the pending result is shared out and awaited outside the
//! lock, so any number of concurrent callers ride on one supplier run.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use lru::LruCache;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache is closed")]
    Closed,
    #[error("pending computation was cancelled")]
    Cancelled,
    #[error("supplier failed: {0}")]
    Supplier(Arc<anyhow::Error>),
}

type Pending<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

struct Entry<V> {
    /// Distinguishes this installation from any later one under the same
    /// key: a failure may only evict the exact entry that failed.
    generation: u64,
    created_at: Instant,
    abort: AbortHandle,
    pending: Pending<V>,
}

struct State<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    closed: bool,
}

struct Inner<K: Hash + Eq, V> {
    map: StdMutex<State<K, V>>,
    ttl: Duration,
    generations: AtomicU64,
}

pub struct AsyncMemoCache<K: Hash + Eq, V> {
    inner: Arc<Inner<K, V>>,
    sweeper: AbortHandle,
}

impl<K, V> AsyncMemoCache<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `capacity` bounds the map; once full, the least recently used
    /// entry is dropped (its supplier keeps running for whoever already
    /// awaits it, the result just is not retained).
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        let inner = Arc::new(Inner {
            map: StdMutex::new(State::<K, V> {
                entries: LruCache::new(capacity),
                closed: false,
            }),
            ttl,
            generations: AtomicU64::new(0),
        });

        let sweep_target = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_target.ttl).await;
                let mut state = sweep_target.map.lock().expect("cache map poisoned");
                if state.closed {
                    return;
                }
                let expired: Vec<K> = state
                    .entries
                    .iter()
                    .filter(|(_, entry)| entry.created_at.elapsed() >= sweep_target.ttl)
                    .map(|(key, _)| key.clone())
                    .collect();
                if !expired.is_empty() {
                    tracing::debug!(expired = expired.len(), "Sweeping expired cache entries");
                }
                for key in expired {
                    state.entries.pop(&key);
                }
            }
        })
        .abort_handle();

        Self { inner, sweeper }
    }

    /// Returns the live entry for `key`, installing a run of `supplier`
    /// when there is none. The supplier runs at most once per live entry
    /// no matter how many callers arrive concurrently. A failed run is
    /// evicted so the next caller retries - but only if its entry is
    /// still the one installed.
    pub async fn get<F, Fut>(&self, key: K, supplier: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let (generation, pending) = self.lookup_or_install(key.clone(), supplier)?;

        let result = pending.await;

        if matches!(result, Err(CacheError::Supplier(_)) | Err(CacheError::Cancelled)) {
            let mut state = self.inner.map.lock().expect("cache map poisoned");
            let same_entry = state
                .entries
                .peek(&key)
                .map(|entry| entry.generation == generation)
                .unwrap_or(false);
            if same_entry {
                state.entries.pop(&key);
            }
        }

        result
    }

    fn lookup_or_install<F, Fut>(&self, key: K, supplier: F) -> Result<(u64, Pending<V>), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let mut state = self.inner.map.lock().expect("cache map poisoned");
        if state.closed {
            return Err(CacheError::Closed);
        }

        if let Some(entry) = state.entries.get(&key) {
            if entry.created_at.elapsed() < self.inner.ttl {
                return Ok((entry.generation, entry.pending.clone()));
            }
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst);
        let supplier_future = supplier();
        let (sender, receiver) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = sender.send(
                supplier_future
                    .await
                    .map_err(|e| CacheError::Supplier(Arc::new(e))),
            );
        });
        let pending: Pending<V> = async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Cancelled),
            }
        }
        .boxed()
        .shared();

        state.entries.put(
            key,
            Entry {
                generation,
                created_at: Instant::now(),
                abort: task.abort_handle(),
                pending: pending.clone(),
            },
        );
        Ok((generation, pending))
    }

}

impl<K: Hash + Eq, V> AsyncMemoCache<K, V> {
    /// Cancels the sweep task and every pending computation, and clears
    /// the map. Later `get` calls fail with [`CacheError::Closed`].
    /// Idempotent.
    pub fn close(&self) {
        self.sweeper.abort();
        let Ok(mut state) = self.inner.map.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        state.closed = true;
        while let Some((_, entry)) = state.entries.pop_lru() {
            entry.abort.abort();
        }
    }
}

impl<K: Hash + Eq, V> Drop for AsyncMemoCache<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}
