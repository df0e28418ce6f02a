//! Re-entering failed jobs into the pipeline.

use serde::Serialize;
use tracing::{info, instrument, warn};

use creatives_core::{JobId, JobStatus, OwnerId, RequestId, RequestStatus};
use creatives_events::StatusEvent;

use super::ServiceDeps;
use super::aggregator::{RecomputeOutcome, StatusAggregator};
use crate::dispatch::{DispatchSignal, signal_pending};
use crate::error::{DispatchWarning, OrchestratorError};
use crate::jobs::{Job, RETRY_PRIORITY};

#[derive(Debug, Clone, Serialize)]
pub struct RetriedJob {
    pub job: Job,
    pub dispatch_warning: Option<DispatchWarning>,
}

/// Per-job result inside a request retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobRetryResult {
    Requeued { job_id: JobId },
    Error { job_id: JobId, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrySummary {
    pub request_id: RequestId,
    pub requeued: usize,
    pub errors: usize,
    pub jobs: Vec<JobRetryResult>,
    /// Aggregate after the retry; `None` if the recompute failed.
    pub request_status: Option<RequestStatus>,
    pub dispatch_warning: Option<DispatchWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RetryRequestOutcome {
    /// No failed jobs; nothing was touched.
    NothingToRetry,
    Retried(RetrySummary),
}

#[derive(Clone)]
pub struct RetryCoordinator {
    deps: ServiceDeps,
    aggregator: StatusAggregator,
}

impl RetryCoordinator {
    pub fn new(deps: ServiceDeps, aggregator: StatusAggregator) -> Self {
        Self { deps, aggregator }
    }

    /// Requeue one failed job with elevated priority.
    #[instrument(skip(self), fields(owner_id = %owner_id, job_id = %job_id))]
    pub async fn retry_job(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
    ) -> Result<RetriedJob, OrchestratorError> {
        let mut job = self
            .deps
            .jobs
            .get(owner_id, job_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id}")))?;

        if job.status() != JobStatus::Failed {
            return Err(OrchestratorError::invalid_state(format!(
                "job {job_id} is {}; only failed jobs can be retried",
                job.status()
            )));
        }

        self.requeue(&mut job).await?;

        let dispatch_warning = signal_pending(
            self.deps.dispatcher.as_ref(),
            DispatchSignal {
                owner_id,
                priority: RETRY_PRIORITY,
                job_count: 1,
            },
        )
        .await;

        if let Some(request_id) = job.request_id {
            self.recompute_logged(owner_id, request_id).await;
        }

        info!(attempts = job.attempts, "job requeued for retry");
        Ok(RetriedJob {
            job,
            dispatch_warning,
        })
    }

    /// Requeue every failed job of a request, then recompute its status.
    ///
    /// Partial success is allowed: each job's outcome is reported and one
    /// dispatch signal covers the whole batch.
    #[instrument(skip(self), fields(owner_id = %owner_id, request_id = %request_id))]
    pub async fn retry_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<RetryRequestOutcome, OrchestratorError> {
        self.deps
            .requests
            .get(owner_id, request_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("request {request_id}")))?;

        let failed: Vec<Job> = self
            .deps
            .jobs
            .list_for_request(owner_id, request_id)
            .await?
            .into_iter()
            .filter(|j| j.status() == JobStatus::Failed)
            .collect();

        if failed.is_empty() {
            return Ok(RetryRequestOutcome::NothingToRetry);
        }

        let mut results = Vec::with_capacity(failed.len());
        for mut job in failed {
            let job_id = job.id;
            match self.requeue(&mut job).await {
                Ok(()) => results.push(JobRetryResult::Requeued { job_id }),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "failed to requeue job");
                    results.push(JobRetryResult::Error {
                        job_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        let requeued = results
            .iter()
            .filter(|r| matches!(r, JobRetryResult::Requeued { .. }))
            .count();

        let dispatch_warning = if requeued > 0 {
            signal_pending(
                self.deps.dispatcher.as_ref(),
                DispatchSignal {
                    owner_id,
                    priority: RETRY_PRIORITY,
                    job_count: requeued,
                },
            )
            .await
        } else {
            None
        };

        let request_status = self.recompute_logged(owner_id, request_id).await;

        info!(requeued, errors = results.len() - requeued, "request retry finished");
        Ok(RetryRequestOutcome::Retried(RetrySummary {
            request_id,
            requeued,
            errors: results.len() - requeued,
            jobs: results,
            request_status,
            dispatch_warning,
        }))
    }

    async fn requeue(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        let from = job.status();
        job.requeue_for_retry()?;
        self.deps.jobs.update(job, from).await?;
        self.deps.notifier.notify(StatusEvent::job_status_changed(
            job.owner_id,
            job.id,
            job.request_id,
            job.status(),
        ));
        Ok(())
    }

    async fn recompute_logged(&self, owner_id: OwnerId, request_id: RequestId) -> Option<RequestStatus> {
        match self.aggregator.recompute(owner_id, request_id).await {
            Ok(RecomputeOutcome::Updated { to, .. }) => Some(to),
            Ok(RecomputeOutcome::Unchanged(status)) => Some(status),
            Ok(RecomputeOutcome::NoJobs) => None,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "recompute after retry failed");
                None
            }
        }
    }
}
