//! In-memory wiring shared by the orchestration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use creatives_core::{JobId, JobStatus, OwnerId, RequestId, RequestStatus, RequestedFormats};
use creatives_events::{EventBus, InMemoryEventBus, StatusEvent, Subscription};

use super::{CreatedRequest, CreativeServices, ServiceDeps};
use crate::dispatch::RecordingDispatcher;
use crate::error::StoreError;
use crate::jobs::{InMemoryJobStore, Job, JobState, JobStore};
use crate::requests::{InMemoryRequestStore, RequestStore};

pub(crate) struct Harness {
    pub owner: OwnerId,
    pub jobs: Arc<InMemoryJobStore>,
    pub requests: Arc<InMemoryRequestStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub bus: Arc<InMemoryEventBus<StatusEvent>>,
    pub services: CreativeServices,
}

impl Harness {
    pub fn new() -> Self {
        let jobs = InMemoryJobStore::arc();
        Self::build(jobs.clone(), jobs)
    }

    /// Services see job snapshots that are `delay` old by the time they act
    /// on them; `jobs` still inspects the store directly.
    pub fn with_slow_job_reads(delay: Duration) -> Self {
        let jobs = InMemoryJobStore::arc();
        let slow = Arc::new(SlowJobReads {
            inner: jobs.clone(),
            delay,
        });
        Self::build(jobs, slow)
    }

    fn build(jobs: Arc<InMemoryJobStore>, service_jobs: Arc<dyn JobStore>) -> Self {
        let requests = InMemoryRequestStore::arc();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let bus = Arc::new(InMemoryEventBus::new());

        let services = CreativeServices::new(ServiceDeps::new(
            service_jobs,
            requests.clone(),
            dispatcher.clone(),
            bus.clone(),
        ));

        Self {
            owner: OwnerId::new(),
            jobs,
            requests,
            dispatcher,
            bus,
            services,
        }
    }

    pub fn subscribe(&self) -> Subscription<StatusEvent> {
        EventBus::subscribe(&*self.bus)
    }

    pub async fn create(&self, formats: &[&str]) -> CreatedRequest {
        self.services
            .orchestrator
            .create_request(
                self.owner,
                RequestedFormats::parse(formats).unwrap(),
                serde_json::json!({"prompt": "a lighthouse at dusk"}),
            )
            .await
            .unwrap()
    }

    /// Overwrite a job's state directly, bypassing the lifecycle service.
    pub async fn set_job_status(&self, job_id: JobId, status: JobStatus) {
        let mut job = self.jobs.get(self.owner, job_id).await.unwrap().unwrap();
        let current = job.status();
        job.state = match status {
            JobStatus::Draft => JobState::Draft,
            JobStatus::Queued => JobState::Queued,
            JobStatus::Processing => JobState::Processing,
            JobStatus::Completed => JobState::Completed {
                result_ref: format!("renders/{job_id}.png"),
            },
            JobStatus::Failed => JobState::Failed {
                error: "render failed".to_string(),
            },
        };
        self.jobs.update(&job, current).await.unwrap();
    }

    pub async fn remove_job(&self, job_id: JobId) {
        self.jobs.delete(self.owner, job_id).await.unwrap();
    }

    pub async fn job_status(&self, job_id: JobId) -> JobStatus {
        self.jobs.get(self.owner, job_id).await.unwrap().unwrap().status()
    }

    pub async fn request_status(&self, request_id: RequestId) -> RequestStatus {
        self.requests
            .get(self.owner, request_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

/// Job store whose single-job reads return only after `delay`, like a
/// round trip to a remote database.
struct SlowJobReads {
    inner: Arc<InMemoryJobStore>,
    delay: Duration,
}

#[async_trait]
impl JobStore for SlowJobReads {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        self.inner.insert(job).await
    }

    async fn get(&self, owner_id: OwnerId, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let snapshot = self.inner.get(owner_id, job_id).await;
        tokio::time::sleep(self.delay).await;
        snapshot
    }

    async fn update(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        self.inner.update(job, expected).await
    }

    async fn list_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Vec<Job>, StoreError> {
        self.inner.list_for_request(owner_id, request_id).await
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Job>, StoreError> {
        self.inner.list_for_owner(owner_id).await
    }

    async fn delete(&self, owner_id: OwnerId, job_id: JobId) -> Result<(), StoreError> {
        self.inner.delete(owner_id, job_id).await
    }

    async fn delete_settled_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<usize, StoreError> {
        self.inner.delete_settled_for_request(owner_id, request_id).await
    }
}
