use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use creatives_core::{JobId, JobStatus, OwnerId, RequestId, RequestStatus};

/// Change notification published on the realtime channel.
///
/// Consumers must be idempotent: the same event can arrive more than once
/// and events for one request can arrive out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    JobStatusChanged {
        owner_id: OwnerId,
        job_id: JobId,
        /// `None` for standalone jobs.
        request_id: Option<RequestId>,
        status: JobStatus,
        occurred_at: DateTime<Utc>,
    },
    RequestStatusChanged {
        owner_id: OwnerId,
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        occurred_at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn job_status_changed(
        owner_id: OwnerId,
        job_id: JobId,
        request_id: Option<RequestId>,
        status: JobStatus,
    ) -> Self {
        Self::JobStatusChanged {
            owner_id,
            job_id,
            request_id,
            status,
            occurred_at: Utc::now(),
        }
    }

    pub fn request_status_changed(
        owner_id: OwnerId,
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Self {
        Self::RequestStatusChanged {
            owner_id,
            request_id,
            from,
            to,
            occurred_at: Utc::now(),
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        match self {
            StatusEvent::JobStatusChanged { owner_id, .. } => *owner_id,
            StatusEvent::RequestStatusChanged { owner_id, .. } => *owner_id,
        }
    }

    /// Stable topic name for realtime subscribers.
    pub fn topic(&self) -> &'static str {
        match self {
            StatusEvent::JobStatusChanged { .. } => "job.status_changed",
            StatusEvent::RequestStatusChanged { .. } => "request.status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = StatusEvent::job_status_changed(
            OwnerId::new(),
            JobId::new(),
            None,
            JobStatus::Queued,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_status_changed");
        assert_eq!(json["status"], "queued");
        assert!(json["request_id"].is_null());
        assert_eq!(event.topic(), "job.status_changed");
    }
}
