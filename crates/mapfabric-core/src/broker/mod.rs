//! Redis broker adapter
//!
//! The broker carries the whole coordination protocol:
//! - FIFO queue under the literal key `jobs` (append-right, blocking
//!   pop-left)
//! - one hash record per job id holding status, timestamps and terminal
//!   metadata
//! - pub/sub fan-out on `notifications:{id}`, exactly one terminal message
//!   per job
//!
//! Grouped writes (enqueue + record init, status transitions, terminal
//! publish) go through atomic MULTI/EXEC pipelines so readers on other
//! connections never observe a half-applied transition.

pub mod connection;
pub mod record;

pub use connection::RedisBroker;

/// Queue key the dispatcher appends to and workers pop from
pub const JOBS_QUEUE: &str = "jobs";

/// Payload published on the notification channel when a job fails; the
/// error detail lives in the per-job record instead.
pub const FAILURE_SENTINEL: &[u8] = b"0";

/// Notification channel for a job id
pub fn notification_channel(id: &str) -> String {
    format!("notifications:{id}")
}

/// Broker result type alias
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    ConnectionError(String),

    #[error("Operation failed: {0}")]
    OperationError(String),
}
