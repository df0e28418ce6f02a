//! Fan-out of a request into per-format jobs, and request deletion.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use creatives_core::{FormatTag, JobId, OwnerId, RequestId, RequestStatus, RequestedFormats};
use creatives_events::StatusEvent;

use super::ServiceDeps;
use crate::dispatch::{DispatchSignal, signal_pending};
use crate::error::{DispatchWarning, OrchestratorError, StoreError};
use crate::jobs::{DEFAULT_PRIORITY, Job};
use crate::requests::Request;

/// A freshly created request with all of its jobs.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedRequest {
    pub request: Request,
    pub jobs: Vec<Job>,
    pub dispatch_warning: Option<DispatchWarning>,
}

/// A freshly created standalone job.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedJob {
    pub job: Job,
    pub dispatch_warning: Option<DispatchWarning>,
}

#[derive(Clone)]
pub struct Orchestrator {
    deps: ServiceDeps,
}

impl Orchestrator {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Create a request and one queued job per format.
    ///
    /// All-or-nothing: if any job insert or the final status write fails,
    /// everything created so far is deleted before the error is returned.
    /// A failed worker signal does not fail creation; it comes back as
    /// `dispatch_warning`.
    #[instrument(skip(self, formats, payload), fields(owner_id = %owner_id, formats = formats.len()))]
    pub async fn create_request(
        &self,
        owner_id: OwnerId,
        formats: RequestedFormats,
        payload: JsonValue,
    ) -> Result<CreatedRequest, OrchestratorError> {
        let request = Request::pending(owner_id, formats, payload);
        let request_id = request.id;
        self.deps.requests.insert(request.clone()).await?;

        let mut jobs = Vec::with_capacity(request.requested_formats.len());
        for format in request.requested_formats.iter() {
            let job = Job::queued(owner_id, Some(request_id), *format, &request.payload);
            if let Err(err) = self.deps.jobs.insert(job.clone()).await {
                let mut created: Vec<JobId> = jobs.iter().map(|j: &Job| j.id).collect();
                created.push(job.id);
                self.roll_back(owner_id, request_id, &created, &err).await;
                return Err(err.into());
            }
            jobs.push(job);
        }

        let request = match self
            .deps
            .requests
            .update_status(owner_id, request_id, RequestStatus::Processing)
            .await
        {
            Ok(request) => request,
            Err(err) => {
                let created: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
                self.roll_back(owner_id, request_id, &created, &err).await;
                return Err(err.into());
            }
        };

        for job in &jobs {
            self.deps.notifier.notify(StatusEvent::job_status_changed(
                owner_id,
                job.id,
                Some(request_id),
                job.status(),
            ));
        }

        let dispatch_warning = signal_pending(
            self.deps.dispatcher.as_ref(),
            DispatchSignal {
                owner_id,
                priority: DEFAULT_PRIORITY,
                job_count: jobs.len(),
            },
        )
        .await;

        info!(request_id = %request_id, jobs = jobs.len(), "creative request created");
        Ok(CreatedRequest {
            request,
            jobs,
            dispatch_warning,
        })
    }

    /// Create one queued job that belongs to no request.
    #[instrument(skip(self, payload), fields(owner_id = %owner_id, format = %format))]
    pub async fn create_standalone_job(
        &self,
        owner_id: OwnerId,
        format: FormatTag,
        payload: JsonValue,
    ) -> Result<CreatedJob, OrchestratorError> {
        let job = Job::queued(owner_id, None, format, &payload);
        self.deps.jobs.insert(job.clone()).await?;

        self.deps
            .notifier
            .notify(StatusEvent::job_status_changed(owner_id, job.id, None, job.status()));

        let dispatch_warning = signal_pending(
            self.deps.dispatcher.as_ref(),
            DispatchSignal {
                owner_id,
                priority: job.priority,
                job_count: 1,
            },
        )
        .await;

        info!(job_id = %job.id, "standalone job created");
        Ok(CreatedJob {
            job,
            dispatch_warning,
        })
    }

    /// Delete a request and its jobs.
    ///
    /// Only allowed while every job is `draft` or `failed`.
    #[instrument(skip(self), fields(owner_id = %owner_id, request_id = %request_id))]
    pub async fn delete_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<(), OrchestratorError> {
        self.deps
            .requests
            .get(owner_id, request_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("request {request_id}")))?;

        let removed = match self
            .deps
            .jobs
            .delete_settled_for_request(owner_id, request_id)
            .await
        {
            Ok(n) => n,
            Err(StoreError::Conflict(detail)) => {
                debug!(detail = %detail, "delete refused");
                return Err(OrchestratorError::invalid_state(
                    "cannot delete while processing/completed jobs exist",
                ));
            }
            Err(err) => return Err(err.into()),
        };
        self.deps.requests.delete(owner_id, request_id).await?;

        info!(jobs = removed, "creative request deleted");
        Ok(())
    }

    async fn roll_back(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
        job_ids: &[JobId],
        cause: &StoreError,
    ) {
        warn!(
            owner_id = %owner_id,
            request_id = %request_id,
            error = %cause,
            "request creation failed; rolling back"
        );

        for job_id in job_ids {
            match self.deps.jobs.delete(owner_id, *job_id).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(err) => warn!(job_id = %job_id, error = %err, "rollback failed to delete job"),
            }
        }

        if let Err(err) = self.deps.requests.delete(owner_id, request_id).await {
            warn!(request_id = %request_id, error = %err, "rollback failed to delete request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;
    use crate::orchestration::testing::Harness;
    use crate::requests::RequestStore;
    use creatives_core::JobStatus;
    use proptest::prelude::*;
    use std::time::Duration;

    #[tokio::test]
    async fn creates_one_queued_job_per_format() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9", "9:16"]).await;

        assert_eq!(created.request.status, RequestStatus::Processing);
        assert_eq!(created.jobs.len(), 3);
        assert!(created.jobs.iter().all(|j| j.status() == JobStatus::Queued));
        assert!(created.dispatch_warning.is_none());

        let formats: Vec<_> = created.jobs.iter().map(|j| j.payload["format"].clone()).collect();
        assert_eq!(formats, vec!["1:1", "16:9", "9:16"]);

        let signals = h.dispatcher.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].job_count, 3);
    }

    #[tokio::test]
    async fn publishes_queued_event_per_job() {
        let h = Harness::new();
        let sub = h.subscribe();
        h.create(&["1:1", "4:5"]).await;

        let mut queued = 0;
        while let Ok(event) = sub.try_recv() {
            if let StatusEvent::JobStatusChanged { status, .. } = event {
                assert_eq!(status, JobStatus::Queued);
                queued += 1;
            }
        }
        assert_eq!(queued, 2);
    }

    #[tokio::test]
    async fn dispatch_failure_is_a_warning() {
        let h = Harness::new();
        h.dispatcher.set_failing(true);

        let created = h.create(&["1:1"]).await;
        assert!(created.dispatch_warning.is_some());
        assert_eq!(h.jobs.len(), 1);
        assert_eq!(h.requests.len(), 1);
    }

    #[tokio::test]
    async fn status_write_failure_rolls_back_everything() {
        let h = Harness::new();
        h.requests.fail_status_updates(true);

        let err = h
            .services
            .orchestrator
            .create_request(
                h.owner,
                RequestedFormats::parse(["1:1", "16:9"]).unwrap(),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert!(h.jobs.is_empty());
        assert!(h.requests.is_empty());
        assert!(h.dispatcher.signals().is_empty());
    }

    #[tokio::test]
    async fn standalone_job_has_no_request() {
        let h = Harness::new();
        let created = h
            .services
            .orchestrator
            .create_standalone_job(h.owner, FormatTag::Story9x16, serde_json::json!({"prompt": "x"}))
            .await
            .unwrap();

        assert_eq!(created.job.request_id, None);
        assert_eq!(created.job.status(), JobStatus::Queued);
        assert!(h.requests.is_empty());
        assert_eq!(h.dispatcher.signals().len(), 1);
    }

    #[tokio::test]
    async fn delete_is_guarded_by_job_status() {
        for blocking in [JobStatus::Queued, JobStatus::Processing, JobStatus::Completed] {
            let h = Harness::new();
            let created = h.create(&["1:1", "16:9"]).await;
            h.set_job_status(created.jobs[0].id, JobStatus::Failed).await;
            h.set_job_status(created.jobs[1].id, blocking).await;

            let err = h
                .services
                .orchestrator
                .delete_request(h.owner, created.request.id)
                .await
                .unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidState(_)), "{blocking}");
            assert_eq!(h.jobs.len(), 2);
            assert_eq!(h.requests.len(), 1);
        }
    }

    #[tokio::test]
    async fn delete_removes_request_and_jobs() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9"]).await;
        h.set_job_status(created.jobs[0].id, JobStatus::Failed).await;
        h.set_job_status(created.jobs[1].id, JobStatus::Draft).await;

        h.services
            .orchestrator
            .delete_request(h.owner, created.request.id)
            .await
            .unwrap();

        assert!(h.jobs.is_empty());
        assert_eq!(h.requests.get(h.owner, created.request.id).await, Ok(None));
    }

    #[tokio::test]
    async fn retry_racing_delete_never_revives_a_deleted_job() {
        let h = Harness::with_slow_job_reads(Duration::from_millis(10));
        let created = h.create(&["1:1"]).await;
        let job_id = created.jobs[0].id;
        h.set_job_status(job_id, JobStatus::Failed).await;
        let signals_before = h.dispatcher.signals().len();

        // The retry reads the failed job, then the delete lands before it writes.
        let (retried, deleted) = tokio::join!(
            h.services.retry.retry_job(h.owner, job_id),
            async {
                tokio::time::sleep(Duration::from_millis(2)).await;
                h.services.orchestrator.delete_request(h.owner, created.request.id).await
            },
        );

        deleted.unwrap();
        assert!(matches!(
            retried,
            Err(OrchestratorError::Persistence(StoreError::NotFound(_)))
        ));
        assert!(h.jobs.is_empty());
        assert_eq!(h.dispatcher.signals().len(), signals_before);
    }

    #[tokio::test]
    async fn delete_refuses_when_a_job_is_requeued_underneath() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9"]).await;
        for job in &created.jobs {
            h.set_job_status(job.id, JobStatus::Failed).await;
        }
        h.services.retry.retry_job(h.owner, created.jobs[1].id).await.unwrap();

        let err = h
            .services
            .orchestrator
            .delete_request(h.owner, created.request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState(_)));
        assert_eq!(h.jobs.len(), 2);
        assert_eq!(h.job_status(created.jobs[1].id).await, JobStatus::Queued);
    }

    #[tokio::test]
    async fn delete_unknown_request_is_not_found() {
        let h = Harness::new();
        let err = h
            .services
            .orchestrator
            .delete_request(h.owner, RequestId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    fn any_formats() -> impl Strategy<Value = Vec<FormatTag>> {
        prop::sample::subsequence(FormatTag::ALL.to_vec(), 1..=FormatTag::ALL.len())
            .prop_shuffle()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: creation yields a request with |F| jobs, or nothing at all.
        #[test]
        fn fan_out_is_all_or_nothing(
            formats in any_formats(),
            fail_after in prop::option::of(0usize..10),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let h = Harness::new();
                if let Some(n) = fail_after {
                    h.jobs.fail_inserts_after(n);
                }

                let expected = formats.len();
                let result = h
                    .services
                    .orchestrator
                    .create_request(
                        h.owner,
                        RequestedFormats::new(formats).unwrap(),
                        serde_json::json!({"prompt": "p"}),
                    )
                    .await;

                let stored_jobs = h.jobs.list_for_owner(h.owner).await.unwrap();
                let stored_requests = h.requests.list_for_owner(h.owner).await.unwrap();

                match result {
                    Ok(created) => {
                        prop_assert!(fail_after.is_none_or(|n| n >= expected));
                        prop_assert_eq!(stored_requests.len(), 1);
                        prop_assert_eq!(stored_jobs.len(), expected);
                        prop_assert!(stored_jobs.iter().all(|j| j.request_id == Some(created.request.id)));
                    }
                    Err(err) => {
                        prop_assert!(matches!(err, OrchestratorError::Persistence(_)));
                        prop_assert!(fail_after.is_some_and(|n| n < expected));
                        prop_assert!(stored_requests.is_empty());
                        prop_assert!(stored_jobs.is_empty());
                    }
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
