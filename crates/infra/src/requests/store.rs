//! Request storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use creatives_core::{OwnerId, RequestId, RequestStatus};

use super::types::Request;
use crate::error::StoreError;

/// Durable record of creative requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: Request) -> Result<(), StoreError>;

    async fn get(&self, owner_id: OwnerId, request_id: RequestId)
    -> Result<Option<Request>, StoreError>;

    /// Overwrite the aggregate status and return the updated record.
    async fn update_status(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<Request, StoreError>;

    /// All requests of an owner, newest first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Request>, StoreError>;

    async fn delete(&self, owner_id: OwnerId, request_id: RequestId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> RequestStore for Arc<S>
where
    S: RequestStore + ?Sized,
{
    async fn insert(&self, request: Request) -> Result<(), StoreError> {
        (**self).insert(request).await
    }

    async fn get(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        (**self).get(owner_id, request_id).await
    }

    async fn update_status(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<Request, StoreError> {
        (**self).update_status(owner_id, request_id, status).await
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Request>, StoreError> {
        (**self).list_for_owner(owner_id).await
    }

    async fn delete(&self, owner_id: OwnerId, request_id: RequestId) -> Result<(), StoreError> {
        (**self).delete(owner_id, request_id).await
    }
}

/// In-memory request store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<RequestId, Request>>,
    fail_status_updates: AtomicBool,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Toggle injected failures for `update_status`.
    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    /// Total number of stored requests across all owners.
    pub fn len(&self) -> usize {
        self.requests.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a status without touching anything else.
    ///
    /// Simulates drift between the stored aggregate and the children.
    pub fn force_status(&self, request_id: RequestId, status: RequestStatus) -> Result<(), StoreError> {
        let mut requests = self.requests.write().map_err(|_| StoreError::poisoned())?;
        let request = requests
            .get_mut(&request_id)
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        request.status = status;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: Request) -> Result<(), StoreError> {
        let mut requests = self.requests.write().map_err(|_| StoreError::poisoned())?;
        if requests.contains_key(&request.id) {
            return Err(StoreError::AlreadyExists(request.id.to_string()));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        let requests = self.requests.read().map_err(|_| StoreError::poisoned())?;
        match requests.get(&request_id) {
            Some(r) if r.owner_id == owner_id => Ok(Some(r.clone())),
            Some(_) => Err(StoreError::OwnerIsolation),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<Request, StoreError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(StoreError::storage("injected status update failure"));
        }

        let mut requests = self.requests.write().map_err(|_| StoreError::poisoned())?;
        let request = requests
            .get_mut(&request_id)
            .ok_or_else(|| StoreError::NotFound(request_id.to_string()))?;
        if request.owner_id != owner_id {
            return Err(StoreError::OwnerIsolation);
        }

        request.status = status;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Request>, StoreError> {
        let requests = self.requests.read().map_err(|_| StoreError::poisoned())?;
        let mut result: Vec<Request> = requests
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(result)
    }

    async fn delete(&self, owner_id: OwnerId, request_id: RequestId) -> Result<(), StoreError> {
        let mut requests = self.requests.write().map_err(|_| StoreError::poisoned())?;
        match requests.get(&request_id) {
            None => Err(StoreError::NotFound(request_id.to_string())),
            Some(r) if r.owner_id != owner_id => Err(StoreError::OwnerIsolation),
            Some(_) => {
                requests.remove(&request_id);
                Ok(())
            }
        }
    }
}
