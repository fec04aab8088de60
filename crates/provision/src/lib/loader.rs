//! Recursive, bounded traversal of a tree of linked lists.
//!
//! `load` walks the pointer graph depth-first and emits a finite stream of
//! events: one `Loaded` per successfully verified and parsed list, plus a
//! `Problem` for everything that goes wrong along the way. Problems are
//! values; the traversal itself only stops early on a bound hit or when
//! the consumer drops the stream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use lote_trust_shared::lote::TrustedEntitiesList;
use lote_trust_shared::uri::Uri;

use crate::env;
use crate::fetch::{Fetch, FetchOutcome};
use crate::token::{ParseLote, ParseOutcome, SignedToken, TokenVerifier, VerifyOutcome};

const EVENT_BUFFER: usize = 64;

const DEFAULT_PARALLELISM: usize = 4;
const DEFAULT_MAX_DEPTH: u32 = 4;
const DEFAULT_MAX_LISTS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidConstraints {
    #[error("parallelism must be positive")]
    ZeroParallelism,
    #[error("max depth must be positive")]
    ZeroMaxDepth,
    #[error("max lists must be positive")]
    ZeroMaxLists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConstraints {
    parallelism: usize,
    max_depth: u32,
    max_lists: u32,
}

impl LoaderConstraints {
    pub fn new(parallelism: usize, max_depth: u32, max_lists: u32) -> Result<Self, InvalidConstraints> {
        if parallelism == 0 {
            return Err(InvalidConstraints::ZeroParallelism);
        }
        if max_depth == 0 {
            return Err(InvalidConstraints::ZeroMaxDepth);
        }
        if max_lists == 0 {
            return Err(InvalidConstraints::ZeroMaxLists);
        }
        Ok(Self {
            parallelism,
            max_depth,
            max_lists,
        })
    }

    pub fn from_env() -> Result<Self, InvalidConstraints> {
        Self::new(
            env::LOTE_PARALLELISM.default(DEFAULT_PARALLELISM).value,
            env::LOTE_MAX_DEPTH.default(DEFAULT_MAX_DEPTH).value,
            env::LOTE_MAX_LISTS.default(DEFAULT_MAX_LISTS).value,
        )
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_lists(&self) -> u32 {
        self.max_lists
    }
}

impl Default for LoaderConstraints {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            max_depth: DEFAULT_MAX_DEPTH,
            max_lists: DEFAULT_MAX_LISTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedLoteEvent {
    pub lote: TrustedEntitiesList,
    pub source: Uri,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub enum Problem {
    ResourceNotFound { uri: Uri, cause: Option<String> },
    InvalidSignature { uri: Uri, cause: Option<String> },
    ParseFailed { uri: Uri, cause: Option<String> },
    MaxDepthReached { uri: Uri, limit: u32 },
    MaxListsReached { uri: Uri, limit: u32 },
    CircularReferenceDetected { uri: Uri },
    TimedOut { elapsed: Duration },
    Error { uri: Uri, cause: String },
}

#[derive(Debug, Clone)]
pub enum TraversalEvent {
    Loaded(LoadedLoteEvent),
    Problem(Problem),
}

/// Per-invocation traversal state: the count of successful downloads and
/// whether the list bound has halted the issuing of new steps.
struct TraversalState {
    downloads: AtomicU32,
    halted: AtomicBool,
}

struct WalkContext {
    fetcher: Arc<dyn Fetch>,
    verifier: Arc<dyn TokenVerifier>,
    parser: Arc<dyn ParseLote>,
    constraints: LoaderConstraints,
    state: TraversalState,
}

/// One unit of traversal work. `ancestors` holds the URIs on the path
/// from the root to this step's parent: the DFS stack, carried per branch
/// so that concurrent sibling subtrees referencing the same URI are loaded
/// as a DAG while re-entering an ancestor is still flagged as a cycle.
struct Step {
    uri: Uri,
    depth: u32,
    ancestors: Arc<HashSet<Uri>>,
}

pub struct LoteLoader {
    fetcher: Arc<dyn Fetch>,
    verifier: Arc<dyn TokenVerifier>,
    parser: Arc<dyn ParseLote>,
    constraints: LoaderConstraints,
}

impl LoteLoader {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        verifier: Arc<dyn TokenVerifier>,
        parser: Arc<dyn ParseLote>,
        constraints: LoaderConstraints,
    ) -> Self {
        Self {
            fetcher,
            verifier,
            parser,
            constraints,
        }
    }

    /// Starts a traversal at `root`. The returned stream is finite; the
    /// root's `Loaded` event (if any) precedes every deeper event.
    /// Dropping the stream cancels in-flight work.
    pub fn load(&self, root: Uri) -> ReceiverStream<TraversalEvent> {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let context = Arc::new(WalkContext {
            fetcher: Arc::clone(&self.fetcher),
            verifier: Arc::clone(&self.verifier),
            parser: Arc::clone(&self.parser),
            constraints: self.constraints,
            state: TraversalState {
                downloads: AtomicU32::new(0),
                halted: AtomicBool::new(false),
            },
        });
        let root_step = Step {
            uri: root,
            depth: 0,
            ancestors: Arc::new(HashSet::new()),
        };
        tokio::spawn(walk(context, root_step, events));
        ReceiverStream::new(receiver)
    }

    /// Like [`Self::load`], but ends the stream with a `TimedOut` problem
    /// when the whole invocation exceeds `deadline`. In-flight work is
    /// cancelled by dropping the inner stream.
    pub fn load_with_deadline(&self, root: Uri, deadline: Duration) -> ReceiverStream<TraversalEvent> {
        let mut inner = self.load(root);
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let expiry = tokio::time::sleep(deadline);
            tokio::pin!(expiry);
            loop {
                tokio::select! {
                    _ = &mut expiry => {
                        tracing::warn!("List traversal timed out after {deadline:?}");
                        let _ = events
                            .send(TraversalEvent::Problem(Problem::TimedOut { elapsed: deadline }))
                            .await;
                        return;
                    }
                    event = inner.next() => match event {
                        Some(event) => {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }
        });
        ReceiverStream::new(receiver)
    }
}

/// Emits an event, reporting whether the consumer is still listening.
async fn emit(events: &mpsc::Sender<TraversalEvent>, event: TraversalEvent) -> bool {
    events.send(event).await.is_ok()
}

fn walk(
    context: Arc<WalkContext>,
    step: Step,
    events: mpsc::Sender<TraversalEvent>,
) -> BoxFuture<'static, ()> {
    async move {
        let Step {
            uri,
            depth,
            ancestors,
        } = step;
        // Consumer gone or the list bound already hit: nothing more to
        // report.
        if events.is_closed() || context.state.halted.load(Ordering::SeqCst) {
            return;
        }

        // Depth is a per-branch bound: the branch stops descending, other
        // branches keep going.
        if depth > context.constraints.max_depth() {
            tracing::warn!(uri = %uri, depth, "Max traversal depth reached");
            emit(
                &events,
                TraversalEvent::Problem(Problem::MaxDepthReached {
                    uri,
                    limit: context.constraints.max_depth(),
                }),
            )
            .await;
            return;
        }

        if context.state.downloads.load(Ordering::SeqCst) >= context.constraints.max_lists() {
            emit_max_lists(&context, &events, uri).await;
            return;
        }

        if ancestors.contains(&uri) {
            tracing::warn!(uri = %uri, depth, "Circular list reference detected");
            emit(
                &events,
                TraversalEvent::Problem(Problem::CircularReferenceDetected { uri }),
            )
            .await;
            return;
        }

        let pointers = run_step(&context, &uri, depth, &events).await;

        if let Some(pointers) = pointers {
            if !pointers.is_empty() {
                let mut child_ancestors = HashSet::clone(&ancestors);
                child_ancestors.insert(uri);
                fan_out(
                    &context,
                    &events,
                    pointers,
                    depth + 1,
                    Arc::new(child_ancestors),
                )
                .await;
            }
        }
    }
    .boxed()
}

/// Emits `MaxListsReached` exactly once per traversal and halts the
/// issuing of further steps.
async fn emit_max_lists(context: &Arc<WalkContext>, events: &mpsc::Sender<TraversalEvent>, uri: Uri) {
    if !context.state.halted.swap(true, Ordering::SeqCst) {
        tracing::warn!(uri = %uri, "Max list count reached");
        emit(
            events,
            TraversalEvent::Problem(Problem::MaxListsReached {
                uri,
                limit: context.constraints.max_lists(),
            }),
        )
        .await;
    }
}

/// Fetch → verify → parse → emit for one step. Returns the pointers to
/// fan out to, or `None` when the step produced no list.
async fn run_step(
    context: &Arc<WalkContext>,
    uri: &Uri,
    depth: u32,
    events: &mpsc::Sender<TraversalEvent>,
) -> Option<Vec<Uri>> {
    let token_text = match context.fetcher.fetch(uri).await {
        Ok(FetchOutcome::Loaded(text)) => text,
        Ok(FetchOutcome::NotFound { cause }) => {
            tracing::debug!(uri = %uri, "List not found: {cause:?}");
            emit(
                events,
                TraversalEvent::Problem(Problem::ResourceNotFound {
                    uri: uri.clone(),
                    cause,
                }),
            )
            .await;
            return None;
        }
        Err(error) => {
            tracing::warn!(uri = %uri, "Fetch failed: {error:#}");
            emit(
                events,
                TraversalEvent::Problem(Problem::Error {
                    uri: uri.clone(),
                    cause: format!("{error:#}"),
                }),
            )
            .await;
            return None;
        }
    };

    let token = match SignedToken::new(token_text) {
        Ok(token) => token,
        Err(error) => {
            emit(
                events,
                TraversalEvent::Problem(Problem::InvalidSignature {
                    uri: uri.clone(),
                    cause: Some(error.to_string()),
                }),
            )
            .await;
            return None;
        }
    };

    let token = match context.verifier.verify(&token).await {
        Ok(VerifyOutcome::Verified(token)) => token,
        Ok(VerifyOutcome::NotVerified { cause }) => {
            tracing::warn!(uri = %uri, "List signature rejected: {cause:?}");
            emit(
                events,
                TraversalEvent::Problem(Problem::InvalidSignature {
                    uri: uri.clone(),
                    cause,
                }),
            )
            .await;
            return None;
        }
        Err(error) => {
            emit(
                events,
                TraversalEvent::Problem(Problem::Error {
                    uri: uri.clone(),
                    cause: format!("{error:#}"),
                }),
            )
            .await;
            return None;
        }
    };

    let lote = match context.parser.parse(&token) {
        ParseOutcome::Parsed { payload, .. } => payload,
        ParseOutcome::ParseFailed { cause } => {
            tracing::warn!(uri = %uri, "List payload rejected: {cause:?}");
            emit(
                events,
                TraversalEvent::Problem(Problem::ParseFailed {
                    uri: uri.clone(),
                    cause,
                }),
            )
            .await;
            return None;
        }
    };

    // The downloads counter gates the list bound; claim a slot before
    // emitting so concurrent siblings cannot push the count past it.
    let claimed = context
        .state
        .downloads
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |downloads| {
            (downloads < context.constraints.max_lists()).then_some(downloads + 1)
        });
    if claimed.is_err() {
        emit_max_lists(context, events, uri.clone()).await;
        return None;
    }

    let pointers: Vec<Uri> = lote
        .pointers()
        .iter()
        .map(|pointer| pointer.location.clone())
        .collect();
    tracing::info!(uri = %uri, depth, pointers = pointers.len(), "Loaded list");
    emit(
        events,
        TraversalEvent::Loaded(LoadedLoteEvent {
            lote,
            source: uri.clone(),
            depth,
        }),
    )
    .await;
    Some(pointers)
}

/// Processes children in consecutive chunks of `parallelism`. Children in
/// a chunk run concurrently as supervised tasks: a panic in one is
/// reported as an `Error` problem and does not cancel its peers.
async fn fan_out(
    context: &Arc<WalkContext>,
    events: &mpsc::Sender<TraversalEvent>,
    pointers: Vec<Uri>,
    depth: u32,
    ancestors: Arc<HashSet<Uri>>,
) {
    for chunk in pointers.chunks(context.constraints.parallelism()) {
        if events.is_closed() || context.state.halted.load(Ordering::SeqCst) {
            return;
        }
        let handles: Vec<_> = chunk
            .iter()
            .map(|location| {
                tokio::spawn(walk(
                    Arc::clone(context),
                    Step {
                        uri: location.clone(),
                        depth,
                        ancestors: Arc::clone(&ancestors),
                    },
                    events.clone(),
                ))
            })
            .collect();
        for (handle, location) in handles.into_iter().zip(chunk) {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    emit(
                        events,
                        TraversalEvent::Problem(Problem::Error {
                            uri: location.clone(),
                            cause: format!("Child traversal panicked: {join_error}"),
                        }),
                    )
                    .await;
                }
                // A cancelled child propagates as cancellation, not as a
                // problem.
            }
        }
    }
}
