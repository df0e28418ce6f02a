//! Sweep that repairs drift between stored request statuses and their jobs.

use serde::Serialize;
use tracing::{info, instrument, warn};

use creatives_core::{OwnerId, RequestId, RequestStatus, StatusHistogram};
use creatives_events::StatusEvent;

use super::ServiceDeps;
use crate::error::OrchestratorError;
use crate::requests::Request;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    pub request_id: RequestId,
    pub old_status: RequestStatus,
    pub new_status: RequestStatus,
    pub breakdown: StatusHistogram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub request_id: RequestId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub corrected_count: usize,
    pub corrections: Vec<Correction>,
    pub failures: Vec<ScanFailure>,
}

#[derive(Clone)]
pub struct ConsistencyScanner {
    deps: ServiceDeps,
}

impl ConsistencyScanner {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Recompute every request of `owner_id` and fix mismatches.
    ///
    /// A failure on one request is recorded and the sweep moves on.
    /// Requests without jobs are skipped. Running it twice in a row
    /// reports no corrections the second time.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn scan_and_fix(
        &self,
        owner_id: OwnerId,
    ) -> Result<ScanReport, OrchestratorError> {
        let requests = self.deps.requests.list_for_owner(owner_id).await?;
        let mut report = ScanReport {
            scanned: requests.len(),
            ..ScanReport::default()
        };

        for request in requests {
            let request_id = request.id;
            match self.check(owner_id, request).await {
                Ok(Some(correction)) => report.corrections.push(correction),
                Ok(None) => {}
                Err(message) => {
                    warn!(request_id = %request_id, error = %message, "consistency check failed");
                    report.failures.push(ScanFailure {
                        request_id,
                        message,
                    });
                }
            }
        }

        report.corrected_count = report.corrections.len();
        if report.corrected_count > 0 || !report.failures.is_empty() {
            info!(
                scanned = report.scanned,
                corrected = report.corrected_count,
                failures = report.failures.len(),
                "consistency scan finished"
            );
        }
        Ok(report)
    }

    async fn check(&self, owner_id: OwnerId, request: Request) -> Result<Option<Correction>, String> {
        let jobs = self
            .deps
            .jobs
            .list_for_request(owner_id, request.id)
            .await
            .map_err(|e| e.to_string())?;

        let breakdown: StatusHistogram = jobs.iter().map(|j| j.status()).collect();
        let Some(expected) = breakdown.aggregate() else {
            return Ok(None);
        };
        if expected == request.status {
            return Ok(None);
        }

        self.deps
            .requests
            .update_status(owner_id, request.id, expected)
            .await
            .map_err(|e| e.to_string())?;
        self.deps.notifier.notify(StatusEvent::request_status_changed(
            owner_id,
            request.id,
            request.status,
            expected,
        ));

        info!(
            request_id = %request.id,
            from = %request.status,
            to = %expected,
            "corrected request status"
        );
        Ok(Some(Correction {
            request_id: request.id,
            old_status: request.status,
            new_status: expected,
            breakdown,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::testing::Harness;
    use creatives_core::JobStatus;

    #[tokio::test]
    async fn flipped_job_is_corrected_to_partial() {
        let h = Harness::new();
        let created = h.create(&["1:1", "16:9", "9:16"]).await;
        for job in &created.jobs {
            h.services
                .lifecycle
                .complete(h.owner, job.id, "renders/out.png")
                .await
                .unwrap();
        }
        assert_eq!(h.request_status(created.request.id).await, RequestStatus::Completed);

        // Flip one job behind the aggregator's back.
        h.set_job_status(created.jobs[1].id, JobStatus::Failed).await;

        let report = h.services.scanner.scan_and_fix(h.owner).await.unwrap();
        assert_eq!(report.corrected_count, 1);
        let correction = &report.corrections[0];
        assert_eq!(correction.request_id, created.request.id);
        assert_eq!(correction.old_status, RequestStatus::Completed);
        assert_eq!(correction.new_status, RequestStatus::Partial);
        assert_eq!(
            serde_json::to_value(correction.breakdown).unwrap(),
            serde_json::json!({"completed": 2, "failed": 1})
        );
        assert_eq!(h.request_status(created.request.id).await, RequestStatus::Partial);

        let second = h.services.scanner.scan_and_fix(h.owner).await.unwrap();
        assert_eq!(second.corrected_count, 0);
        assert!(second.corrections.is_empty());
    }

    #[tokio::test]
    async fn drifted_status_converges_to_recompute_value() {
        let h = Harness::new();
        let a = h.create(&["1:1"]).await;
        let b = h.create(&["16:9", "4:3"]).await;
        h.requests.force_status(a.request.id, RequestStatus::Failed).unwrap();
        h.requests.force_status(b.request.id, RequestStatus::Completed).unwrap();

        let report = h.services.scanner.scan_and_fix(h.owner).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.corrected_count, 2);
        assert_eq!(h.request_status(a.request.id).await, RequestStatus::Processing);
        assert_eq!(h.request_status(b.request.id).await, RequestStatus::Processing);
    }

    #[tokio::test]
    async fn one_failing_request_does_not_stop_the_sweep() {
        let h = Harness::new();
        let broken = h.create(&["1:1"]).await;
        let healthy = h.create(&["16:9"]).await;
        h.requests.force_status(broken.request.id, RequestStatus::Failed).unwrap();
        h.requests.force_status(healthy.request.id, RequestStatus::Failed).unwrap();
        h.jobs.fail_reads_for_request(broken.request.id);

        let report = h.services.scanner.scan_and_fix(h.owner).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].request_id, broken.request.id);
        assert_eq!(report.corrected_count, 1);
        assert_eq!(report.corrections[0].request_id, healthy.request.id);
    }

    #[tokio::test]
    async fn requests_without_jobs_are_skipped() {
        let h = Harness::new();
        let created = h.create(&["1:1"]).await;
        h.remove_job(created.jobs[0].id).await;
        h.requests.force_status(created.request.id, RequestStatus::Failed).unwrap();

        let report = h.services.scanner.scan_and_fix(h.owner).await.unwrap();
        assert_eq!(report.corrected_count, 0);
        assert!(report.failures.is_empty());
        assert_eq!(h.request_status(created.request.id).await, RequestStatus::Failed);
    }
}
