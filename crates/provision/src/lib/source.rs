//! Query-keyed trust anchor retrieval and its combinators.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lote_trust_shared::nonempty::NonEmptyList;

use crate::memo_cache::{AsyncMemoCache, CacheError};

/// A source either knows a non-empty anchor set for a query or it knows
/// nothing; "some but empty" cannot be expressed. I/O failures during
/// retrieval escape as errors.
#[async_trait]
pub trait TrustAnchorSource<Q, A>: Send + Sync
where
    Q: Sync,
    A: Send,
{
    async fn get(&self, query: &Q) -> anyhow::Result<Option<NonEmptyList<A>>>;

    /// Releases whatever the source holds. Composites close each child
    /// exactly once; the default is a no-op.
    async fn close(&self) {}
}

pub type SharedAnchorSource<Q, A> = Arc<dyn TrustAnchorSource<Q, A>>;

/// Always answers with the same anchors, for sources whose material was
/// resolved up front.
pub struct FixedAnchorSource<A> {
    anchors: NonEmptyList<A>,
}

impl<A> FixedAnchorSource<A> {
    pub fn new(anchors: NonEmptyList<A>) -> Self {
        Self { anchors }
    }
}

#[async_trait]
impl<Q, A> TrustAnchorSource<Q, A> for FixedAnchorSource<A>
where
    Q: Sync,
    A: Clone + Send + Sync,
{
    async fn get(&self, _query: &Q) -> anyhow::Result<Option<NonEmptyList<A>>> {
        Ok(Some(self.anchors.clone()))
    }
}

/// Tries the primary source, then the fallback when the primary knows
/// nothing. Handle with care: a fallback that always answers can mask a
/// misconfigured primary.
pub struct OrElse<Q, A> {
    primary: SharedAnchorSource<Q, A>,
    fallback: SharedAnchorSource<Q, A>,
    closed: AtomicBool,
}

impl<Q, A> OrElse<Q, A> {
    pub fn new(primary: SharedAnchorSource<Q, A>, fallback: SharedAnchorSource<Q, A>) -> Self {
        Self {
            primary,
            fallback,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<Q, A> TrustAnchorSource<Q, A> for OrElse<Q, A>
where
    Q: Send + Sync,
    A: Send + Sync,
{
    async fn get(&self, query: &Q) -> anyhow::Result<Option<NonEmptyList<A>>> {
        if let Some(anchors) = self.primary.get(query).await? {
            return Ok(Some(anchors));
        }
        tracing::warn!("Primary anchor source knows nothing for query, trying fallback");
        self.fallback.get(query).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.primary.close().await;
            self.fallback.close().await;
        }
    }
}

/// Adapts the query type of a source: callers ask in `Q2`, the inner
/// source is asked in `Q`.
pub struct ContraMap<Q2, Q, A> {
    inner: SharedAnchorSource<Q, A>,
    map: Arc<dyn Fn(&Q2) -> Q + Send + Sync>,
    closed: AtomicBool,
}

impl<Q2, Q, A> ContraMap<Q2, Q, A> {
    pub fn new(inner: SharedAnchorSource<Q, A>, map: Arc<dyn Fn(&Q2) -> Q + Send + Sync>) -> Self {
        Self {
            inner,
            map,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<Q2, Q, A> TrustAnchorSource<Q2, A> for ContraMap<Q2, Q, A>
where
    Q2: Sync,
    Q: Send + Sync,
    A: Send + Sync,
{
    async fn get(&self, query: &Q2) -> anyhow::Result<Option<NonEmptyList<A>>> {
        let mapped = (self.map)(query);
        self.inner.get(&mapped).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.close().await;
        }
    }
}

/// Memoises the inner source per query for `ttl`. Concurrent callers for
/// the same query share one inner retrieval.
pub struct CachedAnchorSource<Q, A>
where
    Q: Clone + Eq + Hash + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    inner: SharedAnchorSource<Q, A>,
    cache: AsyncMemoCache<Q, Option<NonEmptyList<A>>>,
    closed: AtomicBool,
}

impl<Q, A> CachedAnchorSource<Q, A>
where
    Q: Clone + Eq + Hash + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    pub fn new(inner: SharedAnchorSource<Q, A>, ttl: Duration, expected_queries: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: AsyncMemoCache::new(ttl, expected_queries),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<Q, A> TrustAnchorSource<Q, A> for CachedAnchorSource<Q, A>
where
    Q: Clone + Eq + Hash + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    async fn get(&self, query: &Q) -> anyhow::Result<Option<NonEmptyList<A>>> {
        let inner = Arc::clone(&self.inner);
        let inner_query = query.clone();
        self.cache
            .get(query.clone(), move || async move { inner.get(&inner_query).await })
            .await
            .map_err(|e: CacheError| anyhow::Error::new(e))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cache.close();
            self.inner.close().await;
        }
    }
}
