//! End-to-end assembly: per-context list loading, anchor extraction, and
//! reduction into one routed anchor source.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use lote_trust_shared::context::VerificationContext;
use lote_trust_shared::lote::PkiObject;
use lote_trust_shared::uri::Uri;

use crate::collect::{Clock, ContinueOnProblem, LoteLoadResult, SystemClock};
use crate::extract::extract_anchors;
use crate::loader::LoteLoader;
use crate::routed::RoutedAnchorSource;
use crate::source::{FixedAnchorSource, SharedAnchorSource};

const DEFAULT_EXTRACTION_PARALLELISM: usize = 4;

/// Where one context's anchors come from: a list location, the service
/// type to project on, and whether chains for this context are validated
/// by direct trust instead of path building.
#[derive(Debug, Clone)]
pub struct ProvisionEntry {
    pub download_url: Uri,
    pub service_type: Uri,
    pub direct_trust: bool,
}

impl ProvisionEntry {
    pub fn new(download_url: Uri, service_type: Uri) -> Self {
        Self {
            download_url,
            service_type,
            direct_trust: false,
        }
    }

    pub fn with_direct_trust(mut self) -> Self {
        self.direct_trust = true;
        self
    }
}

pub struct ProvisionOutcome {
    pub source: RoutedAnchorSource<VerificationContext, PkiObject>,
    /// The contexts whose entries asked for direct-trust validation;
    /// callers bind those to a direct-trust validator facade.
    pub direct_trust_contexts: HashSet<VerificationContext>,
}

pub struct Provisioner {
    loader: LoteLoader,
    policy: ContinueOnProblem,
    clock: Arc<dyn Clock>,
    extraction_parallelism: usize,
}

impl Provisioner {
    pub fn new(loader: LoteLoader) -> Self {
        Self {
            loader,
            policy: ContinueOnProblem::AlwaysIfDownloaded,
            clock: Arc::new(SystemClock),
            extraction_parallelism: DEFAULT_EXTRACTION_PARALLELISM,
        }
    }

    pub fn with_policy(mut self, policy: ContinueOnProblem) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_extraction_parallelism(mut self, extraction_parallelism: usize) -> Self {
        assert!(extraction_parallelism > 0, "extraction parallelism must be positive");
        self.extraction_parallelism = extraction_parallelism;
        self
    }

    /// Loads and extracts anchors for every context in `table`, dropping
    /// contexts whose list fails to load or yields no anchors, and
    /// reduces the survivors into one routed source. Returns `None` when
    /// nothing survives.
    pub async fn provision(
        &self,
        table: Vec<(VerificationContext, ProvisionEntry)>,
    ) -> anyhow::Result<Option<ProvisionOutcome>> {
        let resolved: Vec<_> = stream::iter(table)
            .map(|(context, entry)| async move {
                let events = self.loader.load(entry.download_url.clone());
                let result = LoteLoadResult::collect(events, self.policy, self.clock.as_ref()).await;
                for problem in result.problems() {
                    tracing::warn!(context = %context, "Provisioning problem: {problem:?}");
                }
                let Some(loaded) = result.loaded() else {
                    tracing::warn!(context = %context, "Root list failed to load, dropping context");
                    return None;
                };
                let Some(anchors) = extract_anchors(&loaded, &entry.service_type) else {
                    tracing::warn!(
                        context = %context,
                        service_type = %entry.service_type,
                        "List has no anchors for the service type, dropping context"
                    );
                    return None;
                };
                tracing::info!(context = %context, anchors = anchors.len(), "Provisioned context");
                Some((context, entry, anchors))
            })
            .buffer_unordered(self.extraction_parallelism)
            .collect()
            .await;

        let mut combined: Option<RoutedAnchorSource<VerificationContext, PkiObject>> = None;
        let mut direct_trust_contexts = HashSet::new();
        for (context, entry, anchors) in resolved.into_iter().flatten() {
            if entry.direct_trust {
                direct_trust_contexts.insert(context.clone());
            }
            let source: SharedAnchorSource<VerificationContext, PkiObject> =
                Arc::new(FixedAnchorSource::new(anchors));
            let single = RoutedAnchorSource::single([context], source)?;
            combined = Some(match combined {
                None => single,
                Some(existing) => existing.plus(single)?,
            });
        }

        Ok(combined.map(|source| ProvisionOutcome {
            source,
            direct_trust_contexts,
        }))
    }
}
