//! Read side: request views and job counts.

use creatives_core::{JobId, OwnerId, RequestId};

use super::ServiceDeps;
use crate::error::OrchestratorError;
use crate::jobs::{Job, JobStats};
use crate::requests::RequestView;

#[derive(Clone)]
pub struct Queries {
    deps: ServiceDeps,
}

impl Queries {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    pub async fn get_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<RequestView, OrchestratorError> {
        let request = self
            .deps
            .requests
            .get(owner_id, request_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("request {request_id}")))?;
        let jobs = self.deps.jobs.list_for_request(owner_id, request_id).await?;
        Ok(RequestView::new(request, jobs))
    }

    /// Newest first.
    pub async fn list_requests(&self, owner_id: OwnerId) -> Result<Vec<RequestView>, OrchestratorError> {
        let requests = self.deps.requests.list_for_owner(owner_id).await?;
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            let jobs = self.deps.jobs.list_for_request(owner_id, request.id).await?;
            views.push(RequestView::new(request, jobs));
        }
        Ok(views)
    }

    pub async fn get_job(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
    ) -> Result<Job, OrchestratorError> {
        self.deps
            .jobs
            .get(owner_id, job_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id}")))
    }

    pub async fn job_stats(&self, owner_id: OwnerId) -> Result<JobStats, OrchestratorError> {
        Ok(self.deps.jobs.stats(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::testing::Harness;
    use creatives_core::RequestStatus;

    #[tokio::test]
    async fn views_include_jobs_and_breakdown() {
        let h = Harness::new();
        let first = h.create(&["1:1"]).await;
        let second = h.create(&["16:9", "9:16"]).await;
        h.services
            .lifecycle
            .fail(h.owner, second.jobs[0].id, "timeout")
            .await
            .unwrap();

        let view = h.services.queries.get_request(h.owner, second.request.id).await.unwrap();
        assert_eq!(view.jobs.len(), 2);
        assert_eq!(view.breakdown.total(), 2);
        assert_eq!(view.request.status, RequestStatus::Processing);

        let listed: Vec<_> = h
            .services
            .queries
            .list_requests(h.owner)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.request.id)
            .collect();
        assert_eq!(listed, vec![second.request.id, first.request.id]);

        let stats = h.services.queries.job_stats(h.owner).await.unwrap();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn other_owners_see_nothing() {
        let h = Harness::new();
        h.create(&["1:1"]).await;

        let other = OwnerId::new();
        assert!(h.services.queries.list_requests(other).await.unwrap().is_empty());
        assert_eq!(h.services.queries.job_stats(other).await.unwrap(), JobStats::default());
    }
}
