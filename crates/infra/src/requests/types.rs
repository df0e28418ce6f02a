//! Creative request record and its read view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use creatives_core::{OwnerId, RequestId, RequestStatus, RequestedFormats, StatusHistogram};

use crate::jobs::Job;

/// A user-submitted batch of formats sharing one payload.
///
/// `status` is owned by the aggregator and the consistency scanner; nothing
/// else writes it after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub owner_id: OwnerId,
    pub requested_formats: RequestedFormats,
    pub payload: JsonValue,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// New request in `pending`, before any job exists.
    pub fn pending(owner_id: OwnerId, requested_formats: RequestedFormats, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: RequestId::new(),
            owner_id,
            requested_formats,
            payload,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A request together with its jobs and their status histogram.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub jobs: Vec<Job>,
    pub breakdown: StatusHistogram,
}

impl RequestView {
    pub fn new(request: Request, jobs: Vec<Job>) -> Self {
        let breakdown = jobs.iter().map(Job::status).collect();
        Self {
            request,
            jobs,
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creatives_core::FormatTag;

    #[test]
    fn view_flattens_request_and_counts_jobs() {
        let owner = OwnerId::new();
        let formats = RequestedFormats::parse(["1:1", "16:9"]).unwrap();
        let request = Request::pending(owner, formats, serde_json::json!({"prompt": "lighthouse"}));

        let mut done = Job::queued(owner, Some(request.id), FormatTag::Square, &request.payload);
        done.mark_completed("renders/a.png").unwrap();
        let waiting = Job::queued(owner, Some(request.id), FormatTag::Landscape16x9, &request.payload);

        let view = RequestView::new(request, vec![done, waiting]);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["requested_formats"], serde_json::json!(["1:1", "16:9"]));
        assert_eq!(json["breakdown"], serde_json::json!({"queued": 1, "completed": 1}));
        assert_eq!(json["jobs"].as_array().map(Vec::len), Some(2));
    }
}
