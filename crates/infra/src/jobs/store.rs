//! Job storage abstraction and the in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use creatives_core::{JobId, JobStatus, OwnerId, RequestId};

use super::types::{Job, JobStats};
use crate::error::StoreError;

/// Durable record of jobs.
///
/// Every operation is owner-scoped; touching another owner's job is an
/// `OwnerIsolation` error, never a silent success.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    /// Get a job by ID.
    async fn get(&self, owner_id: OwnerId, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Replace a stored job (matched by id and owner) if its stored status
    /// is still `expected`; otherwise `Conflict` and nothing is written.
    async fn update(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError>;

    /// All jobs of a request, oldest first.
    async fn list_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Vec<Job>, StoreError>;

    /// All jobs of an owner, oldest first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Job>, StoreError>;

    /// Delete a single job.
    async fn delete(&self, owner_id: OwnerId, job_id: JobId) -> Result<(), StoreError>;

    /// Delete every job of a request, all or nothing: if any of them is not
    /// deletable (`draft`/`failed`) at write time, nothing is removed and
    /// `Conflict` is returned. Returns the number of jobs removed.
    async fn delete_settled_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<usize, StoreError>;

    /// Job counts per status.
    async fn stats(&self, owner_id: OwnerId) -> Result<JobStats, StoreError> {
        let mut stats = JobStats::default();
        for job in self.list_for_owner(owner_id).await? {
            stats.record(job.status());
        }
        Ok(stats)
    }
}

#[async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, owner_id: OwnerId, job_id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get(owner_id, job_id).await
    }

    async fn update(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        (**self).update(job, expected).await
    }

    async fn list_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Vec<Job>, StoreError> {
        (**self).list_for_request(owner_id, request_id).await
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Job>, StoreError> {
        (**self).list_for_owner(owner_id).await
    }

    async fn delete(&self, owner_id: OwnerId, job_id: JobId) -> Result<(), StoreError> {
        (**self).delete(owner_id, job_id).await
    }

    async fn delete_settled_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<usize, StoreError> {
        (**self).delete_settled_for_request(owner_id, request_id).await
    }

    async fn stats(&self, owner_id: OwnerId) -> Result<JobStats, StoreError> {
        (**self).stats(owner_id).await
    }
}

/// Injected failures for exercising rollback and partial-failure paths.
#[derive(Debug, Default)]
struct JobStoreFaults {
    /// Inserts still allowed before every further insert fails.
    insert_budget: Option<usize>,
    failing_updates: HashSet<JobId>,
    failing_request_reads: HashSet<RequestId>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    faults: Mutex<JobStoreFaults>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Allow `n` more inserts, then fail every insert after that.
    pub fn fail_inserts_after(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert_budget = Some(n);
        }
    }

    /// Make every update of `job_id` fail.
    pub fn fail_updates_for(&self, job_id: JobId) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_updates.insert(job_id);
        }
    }

    /// Make listing the jobs of `request_id` fail.
    pub fn fail_reads_for_request(&self, request_id: RequestId) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_request_reads.insert(request_id);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = JobStoreFaults::default();
        }
    }

    /// Total number of stored jobs across all owners.
    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_insert_budget(&self) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| StoreError::poisoned())?;
        match faults.insert_budget.as_mut() {
            Some(0) => Err(StoreError::storage("injected insert failure")),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        self.check_insert_budget()?;

        let mut jobs = self.jobs.write().map_err(|_| StoreError::poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, owner_id: OwnerId, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::poisoned())?;
        match jobs.get(&job_id) {
            Some(job) if job.owner_id == owner_id => Ok(Some(job.clone())),
            Some(_) => Err(StoreError::OwnerIsolation),
            None => Ok(None),
        }
    }

    async fn update(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        {
            let faults = self.faults.lock().map_err(|_| StoreError::poisoned())?;
            if faults.failing_updates.contains(&job.id) {
                return Err(StoreError::storage("injected update failure"));
            }
        }

        let mut jobs = self.jobs.write().map_err(|_| StoreError::poisoned())?;
        match jobs.get(&job.id) {
            None => Err(StoreError::NotFound(job.id.to_string())),
            Some(existing) if existing.owner_id != job.owner_id => Err(StoreError::OwnerIsolation),
            Some(existing) if existing.status() != expected => Err(StoreError::Conflict(format!(
                "job {} is {}, expected {expected}",
                job.id,
                existing.status()
            ))),
            Some(_) => {
                jobs.insert(job.id, job.clone());
                Ok(())
            }
        }
    }

    async fn list_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Vec<Job>, StoreError> {
        {
            let faults = self.faults.lock().map_err(|_| StoreError::poisoned())?;
            if faults.failing_request_reads.contains(&request_id) {
                return Err(StoreError::storage("injected read failure"));
            }
        }

        let jobs = self.jobs.read().map_err(|_| StoreError::poisoned())?;
        let result = jobs
            .values()
            .filter(|j| j.owner_id == owner_id && j.request_id == Some(request_id))
            .cloned()
            .collect();
        Ok(Self::sorted(result))
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::poisoned())?;
        let result = jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(Self::sorted(result))
    }

    async fn delete(&self, owner_id: OwnerId, job_id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::poisoned())?;
        match jobs.get(&job_id) {
            None => Err(StoreError::NotFound(job_id.to_string())),
            Some(job) if job.owner_id != owner_id => Err(StoreError::OwnerIsolation),
            Some(_) => {
                jobs.remove(&job_id);
                Ok(())
            }
        }
    }

    async fn delete_settled_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<usize, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::poisoned())?;
        let ids: Vec<JobId> = jobs
            .values()
            .filter(|j| j.owner_id == owner_id && j.request_id == Some(request_id))
            .map(|j| j.id)
            .collect();

        if let Some(busy) = ids
            .iter()
            .filter_map(|id| jobs.get(id))
            .find(|j| !j.status().is_deletable())
        {
            return Err(StoreError::Conflict(format!(
                "job {} of request {request_id} is {}",
                busy.id,
                busy.status()
            )));
        }

        for id in &ids {
            jobs.remove(id);
        }
        Ok(ids.len())
    }
}
