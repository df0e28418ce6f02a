//! Job and request statuses, and the rule that derives one from the other.
//!
//! A request never stores an independent opinion about its progress: its
//! status is always `StatusHistogram::aggregate` of its children's statuses.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Lifecycle status of a single-format job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet submitted for rendering
    Draft,
    /// Waiting for the image worker to pick it up
    Queued,
    /// Picked up by the image worker
    Processing,
    /// Rendered; a result reference is attached
    Completed,
    /// Rendering failed; an error message is attached
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Draft,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a request may be deleted while a child is in this status.
    pub fn is_deletable(&self) -> bool {
        matches!(self, JobStatus::Draft | JobStatus::Failed)
    }

    /// Job state machine.
    ///
    /// `Failed -> Queued` is the retry edge; `Queued -> Completed` covers
    /// workers that never report the processing step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Draft, Queued)
                | (Queued, Processing)
                | (Queued, Completed)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Queued)
        )
    }

    fn index(&self) -> usize {
        match self {
            JobStatus::Draft => 0,
            JobStatus::Queued => 1,
            JobStatus::Processing => 2,
            JobStatus::Completed => 3,
            JobStatus::Failed => 4,
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| crate::DomainError::validation(format!("unknown job status '{s}'")))
    }
}

/// Aggregate status of a creative request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    /// Every job finished, with at least one success and at least one failure
    Partial,
    Failed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Pending,
        RequestStatus::Processing,
        RequestStatus::Completed,
        RequestStatus::Partial,
        RequestStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Partial => "partial",
            RequestStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| crate::DomainError::validation(format!("unknown request status '{s}'")))
    }
}

/// Count of child jobs per status.
///
/// Serializes as a map of the non-zero buckets, e.g. `{"completed": 2, "failed": 1}`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatusHistogram {
    counts: [usize; 5],
}

impl StatusHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = JobStatus>,
    {
        let mut histogram = Self::new();
        for status in statuses {
            histogram.add(status);
        }
        histogram
    }

    pub fn add(&mut self, status: JobStatus) {
        self.counts[status.index()] += 1;
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.counts[status.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-zero buckets in status order.
    pub fn breakdown(&self) -> Vec<(JobStatus, usize)> {
        JobStatus::ALL
            .into_iter()
            .map(|s| (s, self.count(s)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Derive the request status from the children, first matching rule wins:
    ///
    /// 1. all failed → `Failed`
    /// 2. all completed → `Completed`
    /// 3. at least one completed and all finished → `Partial`
    /// 4. any queued or processing → `Processing`
    /// 5. otherwise → `Pending`
    ///
    /// Returns `None` for an empty histogram; a request without jobs has no
    /// meaningful status.
    pub fn aggregate(&self) -> Option<RequestStatus> {
        let total = self.total();
        if total == 0 {
            return None;
        }

        let completed = self.count(JobStatus::Completed);
        let failed = self.count(JobStatus::Failed);
        let in_flight = self.count(JobStatus::Queued) + self.count(JobStatus::Processing);

        let status = if failed == total {
            RequestStatus::Failed
        } else if completed == total {
            RequestStatus::Completed
        } else if completed > 0 && completed + failed == total {
            RequestStatus::Partial
        } else if in_flight > 0 {
            RequestStatus::Processing
        } else {
            RequestStatus::Pending
        };

        Some(status)
    }
}

impl FromIterator<JobStatus> for StatusHistogram {
    fn from_iter<T: IntoIterator<Item = JobStatus>>(iter: T) -> Self {
        Self::from_statuses(iter)
    }
}

impl Serialize for StatusHistogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let buckets = self.breakdown();
        let mut map = serializer.serialize_map(Some(buckets.len()))?;
        for (status, n) in buckets {
            map.serialize_entry(status.as_str(), &n)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use super::JobStatus::*;

    fn agg(statuses: &[JobStatus]) -> Option<RequestStatus> {
        StatusHistogram::from_statuses(statuses.iter().copied()).aggregate()
    }

    #[test]
    fn rule_table() {
        assert_eq!(agg(&[Failed, Failed]), Some(RequestStatus::Failed));
        assert_eq!(agg(&[Completed, Completed]), Some(RequestStatus::Completed));
        assert_eq!(agg(&[Completed, Failed]), Some(RequestStatus::Partial));
        assert_eq!(agg(&[Completed, Processing]), Some(RequestStatus::Processing));
        assert_eq!(agg(&[Queued, Queued]), Some(RequestStatus::Processing));
        assert_eq!(agg(&[Queued]), Some(RequestStatus::Processing));
        assert_eq!(agg(&[Draft]), Some(RequestStatus::Pending));
    }

    #[test]
    fn lingering_queued_job_keeps_request_processing() {
        assert_eq!(
            agg(&[Completed, Failed, Queued]),
            Some(RequestStatus::Processing)
        );
    }

    #[test]
    fn draft_with_failure_is_pending() {
        assert_eq!(agg(&[Draft, Failed]), Some(RequestStatus::Pending));
    }

    #[test]
    fn empty_histogram_has_no_status() {
        assert_eq!(agg(&[]), None);
    }

    #[test]
    fn transitions_follow_state_machine() {
        assert!(Draft.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Queued));

        assert!(!Completed.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Draft.can_transition_to(Completed));
    }

    #[test]
    fn histogram_serializes_non_zero_buckets() {
        let h = StatusHistogram::from_statuses([Completed, Completed, Failed]);
        assert_eq!(
            serde_json::to_value(h).unwrap(),
            serde_json::json!({"completed": 2, "failed": 1})
        );
    }

    #[test]
    fn statuses_parse_from_wire_names() {
        assert_eq!("processing".parse::<JobStatus>().unwrap(), Processing);
        assert_eq!("partial".parse::<RequestStatus>().unwrap(), RequestStatus::Partial);
        assert!("running".parse::<JobStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = JobStatus> {
        prop::sample::select(JobStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: aggregation depends only on the multiset, not the order.
        #[test]
        fn aggregation_is_order_independent(
            statuses in prop::collection::vec(any_status(), 1..12)
        ) {
            let forward = agg(&statuses);
            let mut reversed = statuses.clone();
            reversed.reverse();
            let mut sorted = statuses.clone();
            sorted.sort();

            prop_assert_eq!(forward, agg(&reversed));
            prop_assert_eq!(forward, agg(&sorted));
        }

        /// Property: the rule is total and consistent with its definition.
        #[test]
        fn aggregation_matches_definition(
            statuses in prop::collection::vec(any_status(), 1..12)
        ) {
            let status = agg(&statuses).unwrap();
            let all = |s: JobStatus| statuses.iter().all(|x| *x == s);
            let finished = statuses.iter().all(|x| x.is_terminal());
            let any_completed = statuses.contains(&Completed);

            match status {
                RequestStatus::Failed => prop_assert!(all(Failed)),
                RequestStatus::Completed => prop_assert!(all(Completed)),
                RequestStatus::Partial => {
                    prop_assert!(finished && any_completed);
                    prop_assert!(statuses.contains(&Failed));
                }
                RequestStatus::Processing => {
                    prop_assert!(statuses.iter().any(|x| matches!(x, Queued | Processing)));
                }
                RequestStatus::Pending => {
                    prop_assert!(!statuses.iter().any(|x| matches!(x, Queued | Processing)));
                    prop_assert!(!all(Failed));
                }
            }
        }
    }
}
