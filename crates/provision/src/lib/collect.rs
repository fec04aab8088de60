//! Folding a traversal event stream into a load result.

use chrono::{DateTime, Utc};
use tokio_stream::{Stream, StreamExt};

use lote_trust_shared::lote::TrustedEntitiesList;

use crate::loader::{LoadedLoteEvent, Problem, TraversalEvent};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decides, after each problem, whether collection keeps draining the
/// stream or stops and cancels the in-flight traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueOnProblem {
    /// Stop on the first problem.
    Never,
    /// Collect everything the traversal produces.
    Always,
    /// Keep going only once the root list itself has loaded.
    AlwaysIfDownloaded,
}

impl ContinueOnProblem {
    pub fn should_continue(&self, main_loaded: bool, _problems: &[Problem]) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::AlwaysIfDownloaded => main_loaded,
        }
    }
}

/// The root list together with every sibling list the traversal reached.
#[derive(Debug, Clone)]
pub struct LoadedLote {
    pub list: TrustedEntitiesList,
    pub other_lists: Vec<TrustedEntitiesList>,
}

#[derive(Debug)]
pub struct LoteLoadResult {
    main: Option<LoadedLoteEvent>,
    siblings: Vec<LoadedLoteEvent>,
    problems: Vec<Problem>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

impl LoteLoadResult {
    /// Drains `stream` under `policy`. Returning early drops the stream,
    /// which cancels whatever the traversal still has in flight.
    pub async fn collect<S>(stream: S, policy: ContinueOnProblem, clock: &dyn Clock) -> Self
    where
        S: Stream<Item = TraversalEvent> + Unpin,
    {
        let started_at = clock.now();
        let mut stream = stream;
        let mut main: Option<LoadedLoteEvent> = None;
        let mut siblings: Vec<LoadedLoteEvent> = Vec::new();
        let mut problems: Vec<Problem> = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                TraversalEvent::Loaded(loaded) if loaded.depth == 0 => {
                    // Intentional panic - the loader guarantees a single
                    // root success; a second one means the loader and the
                    // collector disagree about the protocol.
                    assert!(
                        main.is_none(),
                        "second root list event from {}",
                        loaded.source
                    );
                    main = Some(loaded);
                }
                TraversalEvent::Loaded(loaded) => {
                    assert!(
                        main.is_some(),
                        "sibling list from {} before the root list",
                        loaded.source
                    );
                    siblings.push(loaded);
                }
                TraversalEvent::Problem(problem) => {
                    tracing::debug!("Traversal problem: {problem:?}");
                    problems.push(problem);
                    if !policy.should_continue(main.is_some(), &problems) {
                        break;
                    }
                }
            }
        }

        Self {
            main,
            siblings,
            problems,
            started_at,
            ended_at: clock.now(),
        }
    }

    pub fn main(&self) -> Option<&LoadedLoteEvent> {
        self.main.as_ref()
    }

    pub fn siblings(&self) -> &[LoadedLoteEvent] {
        &self.siblings
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// The loaded tree, when the root list made it.
    pub fn loaded(self) -> Option<LoadedLote> {
        self.main.map(|main| LoadedLote {
            list: main.lote,
            other_lists: self.siblings.into_iter().map(|sibling| sibling.lote).collect(),
        })
    }
}
