//! Worker callbacks: the only writer of `processing`, `completed` and `failed`.

use tracing::{info, instrument, warn};

use creatives_core::{DomainResult, JobId, OwnerId};
use creatives_events::StatusEvent;

use super::ServiceDeps;
use super::aggregator::StatusAggregator;
use crate::error::OrchestratorError;
use crate::jobs::Job;

#[derive(Clone)]
pub struct JobLifecycle {
    deps: ServiceDeps,
    aggregator: StatusAggregator,
}

impl JobLifecycle {
    pub fn new(deps: ServiceDeps, aggregator: StatusAggregator) -> Self {
        Self { deps, aggregator }
    }

    /// The worker picked the job up.
    #[instrument(skip(self), fields(owner_id = %owner_id, job_id = %job_id))]
    pub async fn mark_processing(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
    ) -> Result<Job, OrchestratorError> {
        self.apply(owner_id, job_id, |job| job.mark_processing()).await
    }

    /// The worker rendered the job; `result_ref` points at the output.
    #[instrument(skip(self, result_ref), fields(owner_id = %owner_id, job_id = %job_id))]
    pub async fn complete(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        result_ref: impl Into<String> + Send,
    ) -> Result<Job, OrchestratorError> {
        let result_ref = result_ref.into();
        self.apply(owner_id, job_id, move |job| job.mark_completed(result_ref))
            .await
    }

    /// The worker gave up on the job.
    #[instrument(skip(self, error), fields(owner_id = %owner_id, job_id = %job_id))]
    pub async fn fail(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        error: impl Into<String> + Send,
    ) -> Result<Job, OrchestratorError> {
        let error = error.into();
        self.apply(owner_id, job_id, move |job| job.mark_failed(error))
            .await
    }

    async fn apply<F>(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        transition: F,
    ) -> Result<Job, OrchestratorError>
    where
        F: FnOnce(&mut Job) -> DomainResult<()>,
    {
        let mut job = self
            .deps
            .jobs
            .get(owner_id, job_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id}")))?;

        let from = job.status();
        transition(&mut job)?;
        // A concurrent callback that already moved the job wins.
        self.deps.jobs.update(&job, from).await?;

        let status = job.status();
        self.deps.notifier.notify(StatusEvent::job_status_changed(
            owner_id,
            job.id,
            job.request_id,
            status,
        ));
        info!(from = %from, to = %status, attempts = job.attempts, "job status changed");

        if status.is_terminal() {
            if let Some(request_id) = job.request_id {
                if let Err(err) = self.aggregator.recompute(owner_id, request_id).await {
                    warn!(request_id = %request_id, error = %err, "recompute after job outcome failed");
                }
            }
        }

        Ok(job)
    }
}
