//! Explicit query-set to source routing.
//!
//! Routing faults are configuration faults: overlapping key sets and
//! non-injective remappings fail at construction, never at `get` time.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lote_trust_shared::nonempty::NonEmptyList;

use crate::source::{ContraMap, SharedAnchorSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoutingConfigError {
    #[error("route entry has an empty query set")]
    EmptyQuerySet,
    #[error("route entries have overlapping query sets")]
    OverlappingQuerySets,
    #[error("query transformation is not injective within an entry")]
    NonInjectiveTransform,
}

#[derive(Debug)]
pub enum RoutingOutcome<A> {
    /// A source owns the query and knows anchors for it.
    Found(NonEmptyList<A>),
    /// A source owns the query but knows no anchors - provisioning for
    /// this query yielded nothing.
    NotFound,
    /// No entry's query set contains the query.
    QueryNotSupported,
}

struct RouteEntry<Q, A> {
    queries: HashSet<Q>,
    source: SharedAnchorSource<Q, A>,
}

/// An ordered table of disjoint query sets, each owned by exactly one
/// source.
pub struct RoutedAnchorSource<Q, A> {
    entries: Vec<RouteEntry<Q, A>>,
    closed: AtomicBool,
}

impl<Q, A> fmt::Debug for RoutedAnchorSource<Q, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutedAnchorSource")
            .field("entries", &self.entries.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl<Q, A> RoutedAnchorSource<Q, A>
where
    Q: Clone + Eq + Hash + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub fn new(
        entries: Vec<(HashSet<Q>, SharedAnchorSource<Q, A>)>,
    ) -> Result<Self, RoutingConfigError> {
        let entries: Vec<RouteEntry<Q, A>> = entries
            .into_iter()
            .map(|(queries, source)| RouteEntry { queries, source })
            .collect();
        Self::validate(&entries)?;
        Ok(Self {
            entries,
            closed: AtomicBool::new(false),
        })
    }

    pub fn single(
        queries: impl IntoIterator<Item = Q>,
        source: SharedAnchorSource<Q, A>,
    ) -> Result<Self, RoutingConfigError> {
        Self::new(vec![(queries.into_iter().collect(), source)])
    }

    fn validate(entries: &[RouteEntry<Q, A>]) -> Result<(), RoutingConfigError> {
        let mut seen: HashSet<Q> = HashSet::new();
        for entry in entries {
            if entry.queries.is_empty() {
                return Err(RoutingConfigError::EmptyQuerySet);
            }
            for query in &entry.queries {
                if !seen.insert(query.clone()) {
                    return Err(RoutingConfigError::OverlappingQuerySets);
                }
            }
        }
        Ok(())
    }

    /// Every query the table routes, across all entries.
    pub fn supported_queries(&self) -> impl Iterator<Item = &Q> {
        self.entries.iter().flat_map(|entry| entry.queries.iter())
    }

    pub async fn get(&self, query: &Q) -> anyhow::Result<RoutingOutcome<A>> {
        let Some(entry) = self.entries.iter().find(|entry| entry.queries.contains(query)) else {
            return Ok(RoutingOutcome::QueryNotSupported);
        };
        match entry.source.get(query).await? {
            Some(anchors) => Ok(RoutingOutcome::Found(anchors)),
            None => {
                tracing::warn!("Routed source owns the query but has no anchors for it");
                Ok(RoutingOutcome::NotFound)
            }
        }
    }

    /// Disjoint union of two tables; fails when any query is claimed by
    /// both.
    pub fn plus(mut self, mut other: Self) -> Result<Self, RoutingConfigError> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.append(&mut other.entries);
        Self::validate(&entries)?;
        Ok(Self {
            entries,
            closed: AtomicBool::new(false),
        })
    }

    /// Remaps the query type. `map` must be injective within each entry
    /// and the mapped sets must stay globally disjoint; the sources are
    /// adapted back through `contra_map` on lookup.
    pub fn transform<Q2>(
        mut self,
        map: impl Fn(&Q) -> Q2,
        contra_map: Arc<dyn Fn(&Q2) -> Q + Send + Sync>,
    ) -> Result<RoutedAnchorSource<Q2, A>, RoutingConfigError>
    where
        Q2: Clone + Eq + Hash + Send + Sync + 'static,
    {
        let mut mapped_entries: Vec<(HashSet<Q2>, SharedAnchorSource<Q2, A>)> = Vec::new();
        for entry in std::mem::take(&mut self.entries) {
            let mapped: HashSet<Q2> = entry.queries.iter().map(&map).collect();
            if mapped.len() != entry.queries.len() {
                return Err(RoutingConfigError::NonInjectiveTransform);
            }
            let source: SharedAnchorSource<Q2, A> =
                Arc::new(ContraMap::new(entry.source, Arc::clone(&contra_map)));
            mapped_entries.push((mapped, source));
        }
        RoutedAnchorSource::new(mapped_entries)
    }

    /// Closes each owned source exactly once. Idempotent.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            for entry in &self.entries {
                entry.source.close().await;
            }
        }
    }
}
