//! Recomputing a request's aggregate status from its jobs.

use tracing::{debug, info, instrument};

use creatives_core::{OwnerId, RequestId, RequestStatus, StatusHistogram};
use creatives_events::StatusEvent;

use super::ServiceDeps;
use crate::error::OrchestratorError;

/// Result of one recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// The request has no jobs; nothing was written.
    NoJobs,
    /// Stored status already matches the children.
    Unchanged(RequestStatus),
    Updated {
        from: RequestStatus,
        to: RequestStatus,
    },
}

/// Keeps `Request.status` equal to the aggregate of its jobs.
///
/// Idempotent: every call reads a fresh snapshot and writes only on change,
/// so concurrent or repeated calls for one request converge.
#[derive(Clone)]
pub struct StatusAggregator {
    deps: ServiceDeps,
}

impl StatusAggregator {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, request_id = %request_id))]
    pub async fn recompute(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<RecomputeOutcome, OrchestratorError> {
        let request = self
            .deps
            .requests
            .get(owner_id, request_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("request {request_id}")))?;

        let jobs = self.deps.jobs.list_for_request(owner_id, request_id).await?;
        let histogram: StatusHistogram = jobs.iter().map(|j| j.status()).collect();

        let Some(next) = histogram.aggregate() else {
            debug!("request has no jobs; skipping recompute");
            return Ok(RecomputeOutcome::NoJobs);
        };

        if next == request.status {
            return Ok(RecomputeOutcome::Unchanged(next));
        }

        let from = request.status;
        self.deps
            .requests
            .update_status(owner_id, request_id, next)
            .await?;
        self.deps
            .notifier
            .notify(StatusEvent::request_status_changed(owner_id, request_id, from, next));

        info!(from = %from, to = %next, "request status updated");
        Ok(RecomputeOutcome::Updated { from, to: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::testing::Harness;
    use creatives_core::JobStatus;

    #[tokio::test]
    async fn recompute_is_a_no_op_when_in_sync() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9"]).await;

        let outcome = h
            .services
            .aggregator
            .recompute(h.owner, created.request.id)
            .await
            .unwrap();
        assert_eq!(outcome, RecomputeOutcome::Unchanged(RequestStatus::Processing));
    }

    #[tokio::test]
    async fn recompute_writes_and_publishes_on_change() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9"]).await;
        for job in &created.jobs {
            h.set_job_status(job.id, JobStatus::Completed).await;
        }
        let sub = h.subscribe();

        let outcome = h
            .services
            .aggregator
            .recompute(h.owner, created.request.id)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecomputeOutcome::Updated {
                from: RequestStatus::Processing,
                to: RequestStatus::Completed,
            }
        );
        assert_eq!(h.request_status(created.request.id).await, RequestStatus::Completed);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.topic(), "request.status_changed");

        let again = h
            .services
            .aggregator
            .recompute(h.owner, created.request.id)
            .await
            .unwrap();
        assert_eq!(again, RecomputeOutcome::Unchanged(RequestStatus::Completed));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let h = Harness::new();
        let err = h
            .services
            .aggregator
            .recompute(h.owner, RequestId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
