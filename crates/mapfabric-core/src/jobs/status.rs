//! Job status state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a job as stored in the per-job broker record.
///
/// Transitions are `queued -> running -> (succeed | failed)`; the two
/// terminal states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Enqueued, not yet claimed by a worker
    Queued,

    /// Claimed by a worker and executing
    Running,

    /// Finished successfully
    Succeed,

    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Wire representation stored in the `status` record field
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeed => "succeed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the wire representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeed" => Some(JobStatus::Succeed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Check if the status is terminal (won't change)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_strings() {
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Succeed.to_string(), "succeed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("completed"), None);
    }

    #[test]
    fn test_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
