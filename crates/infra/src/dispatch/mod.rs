//! Signalling the external image worker that jobs are waiting.
//!
//! Dispatch is fire-and-forget: a failed signal never rolls back the state
//! change that caused it. Callers turn failures into a [`DispatchWarning`]
//! and the jobs stay queued until the next trigger.

mod http;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use creatives_core::OwnerId;

use crate::error::DispatchWarning;

pub use http::HttpDispatcher;

/// Body of a worker trigger: "this owner has `job_count` jobs at `priority`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSignal {
    pub owner_id: OwnerId,
    pub priority: i16,
    pub job_count: usize,
}

#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error("worker trigger unreachable: {0}")]
    Transport(String),

    #[error("worker trigger rejected signal: HTTP {status}")]
    Rejected { status: u16 },

    #[error("dispatch failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn notify_jobs_pending(&self, signal: &DispatchSignal) -> Result<(), DispatchFailure>;
}

#[async_trait]
impl<D> JobDispatcher for Arc<D>
where
    D: JobDispatcher + ?Sized,
{
    async fn notify_jobs_pending(&self, signal: &DispatchSignal) -> Result<(), DispatchFailure> {
        (**self).notify_jobs_pending(signal).await
    }
}

/// Send a signal, downgrading failure to a logged warning.
pub async fn signal_pending<D>(dispatcher: &D, signal: DispatchSignal) -> Option<DispatchWarning>
where
    D: JobDispatcher + ?Sized,
{
    match dispatcher.notify_jobs_pending(&signal).await {
        Ok(()) => None,
        Err(err) => {
            warn!(
                owner_id = %signal.owner_id,
                priority = signal.priority,
                job_count = signal.job_count,
                error = %err,
                "failed to signal image worker; jobs stay queued"
            );
            Some(DispatchWarning::new(err.to_string()))
        }
    }
}

/// Dispatcher used when no worker trigger is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

#[async_trait]
impl JobDispatcher for NoopDispatcher {
    async fn notify_jobs_pending(&self, signal: &DispatchSignal) -> Result<(), DispatchFailure> {
        debug!(
            owner_id = %signal.owner_id,
            job_count = signal.job_count,
            "no worker trigger configured; skipping dispatch"
        );
        Ok(())
    }
}

/// Dispatcher that records every signal; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    signals: Mutex<Vec<DispatchSignal>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Signals accepted so far (failed attempts are not recorded).
    pub fn signals(&self) -> Vec<DispatchSignal> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn notify_jobs_pending(&self, signal: &DispatchSignal) -> Result<(), DispatchFailure> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchFailure::Transport("connection refused".to_string()));
        }
        self.signals
            .lock()
            .map_err(|_| DispatchFailure::Other("recorder lock poisoned".to_string()))?
            .push(*signal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> DispatchSignal {
        DispatchSignal {
            owner_id: OwnerId::new(),
            priority: 0,
            job_count: 3,
        }
    }

    #[tokio::test]
    async fn successful_signal_has_no_warning() {
        let dispatcher = RecordingDispatcher::new();
        assert_eq!(signal_pending(&dispatcher, signal()).await, None);
        assert_eq!(dispatcher.signals().len(), 1);
    }

    #[tokio::test]
    async fn failed_signal_becomes_warning() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.set_failing(true);

        let warning = signal_pending(&dispatcher, signal()).await;
        assert!(warning.is_some_and(|w| w.message.contains("connection refused")));
        assert!(dispatcher.signals().is_empty());
    }

    #[test]
    fn signal_serializes_as_trigger_body() {
        let s = signal();
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["job_count"], 3);
        assert_eq!(json["priority"], 0);
        assert_eq!(json["owner_id"], s.owner_id.to_string());
    }
}
