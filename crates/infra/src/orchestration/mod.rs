//! Orchestration services over the job and request stores.
//!
//! Every service holds the same [`ServiceDeps`]; [`CreativeServices`] wires
//! them together so callers (HTTP handlers, the status watcher) share one
//! set of stores, one dispatcher and one realtime channel.

pub mod aggregator;
pub mod lifecycle;
pub mod orchestrator;
pub mod queries;
pub mod retry;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::dispatch::JobDispatcher;
use crate::jobs::JobStore;
use crate::notify::SharedNotifier;
use crate::requests::RequestStore;

pub use aggregator::{RecomputeOutcome, StatusAggregator};
pub use lifecycle::JobLifecycle;
pub use orchestrator::{CreatedJob, CreatedRequest, Orchestrator};
pub use queries::Queries;
pub use retry::{JobRetryResult, RetriedJob, RetryCoordinator, RetryRequestOutcome, RetrySummary};
pub use scanner::{ConsistencyScanner, Correction, ScanFailure, ScanReport};

/// Shared collaborators of every orchestration service.
#[derive(Clone)]
pub struct ServiceDeps {
    pub jobs: Arc<dyn JobStore>,
    pub requests: Arc<dyn RequestStore>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub notifier: SharedNotifier,
}

impl ServiceDeps {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        requests: Arc<dyn RequestStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            jobs,
            requests,
            dispatcher,
            notifier,
        }
    }
}

/// All orchestration services built over one [`ServiceDeps`].
#[derive(Clone)]
pub struct CreativeServices {
    pub orchestrator: Orchestrator,
    pub aggregator: StatusAggregator,
    pub scanner: ConsistencyScanner,
    pub retry: RetryCoordinator,
    pub lifecycle: JobLifecycle,
    pub queries: Queries,
    deps: ServiceDeps,
}

impl CreativeServices {
    pub fn new(deps: ServiceDeps) -> Self {
        let aggregator = StatusAggregator::new(deps.clone());
        Self {
            orchestrator: Orchestrator::new(deps.clone()),
            scanner: ConsistencyScanner::new(deps.clone()),
            retry: RetryCoordinator::new(deps.clone(), aggregator.clone()),
            lifecycle: JobLifecycle::new(deps.clone(), aggregator.clone()),
            queries: Queries::new(deps.clone()),
            aggregator,
            deps,
        }
    }

    pub fn notifier(&self) -> &SharedNotifier {
        &self.deps.notifier
    }
}
