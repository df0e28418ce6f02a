//! Job record and its state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use creatives_core::{
    DomainError, DomainResult, FormatTag, JobId, JobStatus, OwnerId, RequestId,
};

/// Priority for freshly created jobs.
pub const DEFAULT_PRIORITY: i16 = 0;
/// Priority for jobs re-entering the pipeline through a retry.
pub const RETRY_PRIORITY: i16 = 10;

/// Job state together with the data that only exists in that state.
///
/// `result_ref` lives inside `Completed` and `error` inside `Failed`, so a
/// job can never carry a result while failed or an error while completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Draft,
    Queued,
    Processing,
    Completed { result_ref: String },
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Draft => JobStatus::Draft,
            JobState::Queued => JobStatus::Queued,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Rebuild a state from flat columns (`status`, `result_ref`, `error`).
    pub fn from_parts(
        status: JobStatus,
        result_ref: Option<String>,
        error: Option<String>,
    ) -> DomainResult<Self> {
        match (status, result_ref, error) {
            (JobStatus::Draft, None, None) => Ok(JobState::Draft),
            (JobStatus::Queued, None, None) => Ok(JobState::Queued),
            (JobStatus::Processing, None, None) => Ok(JobState::Processing),
            (JobStatus::Completed, Some(result_ref), None) => Ok(JobState::Completed { result_ref }),
            (JobStatus::Failed, None, Some(error)) => Ok(JobState::Failed { error }),
            (status, result_ref, error) => Err(DomainError::validation(format!(
                "inconsistent job row: status={status} result_ref={} error={}",
                result_ref.is_some(),
                error.is_some()
            ))),
        }
    }
}

/// One unit of rendering work: a single output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Parent request; `None` for standalone jobs.
    pub request_id: Option<RequestId>,
    pub owner_id: OwnerId,
    pub format: FormatTag,
    /// Shared request payload (prompt, style, ...) plus the format tag.
    pub payload: JsonValue,
    #[serde(flatten)]
    pub state: JobState,
    /// Cumulative across retries; never reset.
    pub attempts: u32,
    pub priority: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job for `format` carrying `payload`.
    ///
    /// The format tag is written into the payload under `"format"` so the
    /// image worker needs nothing but the job row.
    pub fn queued(
        owner_id: OwnerId,
        request_id: Option<RequestId>,
        format: FormatTag,
        payload: &JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            request_id,
            owner_id,
            format,
            payload: payload_with_format(payload, format),
            state: JobState::Queued,
            attempts: 0,
            priority: DEFAULT_PRIORITY,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn result_ref(&self) -> Option<&str> {
        match &self.state {
            JobState::Completed { result_ref } => Some(result_ref),
            _ => None,
        }
    }

    fn transition(&mut self, next: JobState) -> DomainResult<()> {
        let from = self.status();
        let to = next.status();
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidTransition { from, to });
        }

        // An attempt starts when the worker picks the job up, or implicitly
        // when it reports a terminal outcome straight from the queue.
        if to == JobStatus::Processing || (from == JobStatus::Queued && to.is_terminal()) {
            self.attempts += 1;
        }

        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_processing(&mut self) -> DomainResult<()> {
        self.transition(JobState::Processing)
    }

    pub fn mark_completed(&mut self, result_ref: impl Into<String>) -> DomainResult<()> {
        let result_ref = result_ref.into();
        if result_ref.trim().is_empty() {
            return Err(DomainError::validation("result_ref must not be empty"));
        }
        self.transition(JobState::Completed { result_ref })
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> DomainResult<()> {
        let error = error.into();
        if error.trim().is_empty() {
            return Err(DomainError::validation("error must not be empty"));
        }
        self.transition(JobState::Failed { error })
    }

    /// Put a failed job back in the queue with elevated priority.
    ///
    /// Clears the error, keeps `attempts`.
    pub fn requeue_for_retry(&mut self) -> DomainResult<()> {
        self.transition(JobState::Queued)?;
        self.priority = RETRY_PRIORITY;
        Ok(())
    }
}

fn payload_with_format(payload: &JsonValue, format: FormatTag) -> JsonValue {
    match payload {
        JsonValue::Object(map) => {
            let mut map = map.clone();
            map.insert("format".to_string(), JsonValue::String(format.to_string()));
            JsonValue::Object(map)
        }
        JsonValue::Null => serde_json::json!({ "format": format.as_str() }),
        other => serde_json::json!({ "input": other, "format": format.as_str() }),
    }
}

/// Job counts per status for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub draft: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus) {
        self.add(status, 1);
    }

    pub fn add(&mut self, status: JobStatus, n: usize) {
        match status {
            JobStatus::Draft => self.draft += n,
            JobStatus::Queued => self.queued += n,
            JobStatus::Processing => self.processing += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
        }
    }
}
