//! MapFabric core: a distributed job-processing fabric for geospatial
//! rendering and query tasks
//!
//! Clients wrap typed jobs in a self-describing envelope and submit them
//! through the [`Dispatcher`]; a Redis broker provides the FIFO queue and
//! the per-job pub/sub rendezvous; [`Worker`] processes consume envelopes
//! and drive each through the `queued -> running -> (succeed | failed)`
//! state machine, executing them via the [`JobExecutor`] capability.
//!
//! ## Architecture
//!
//! - `jobs` — the closed union of job kinds, envelope codec, status state
//!   machine and the executor seam
//! - `broker` — the Redis adapter: queue, per-job records, notifications
//! - `dispatcher` — client side: submit and await with timeout/cancellation
//! - `worker` — consumer side: pop, execute, publish, back off, shut down
//!
//! The rendering engine itself lives behind [`JobExecutor`]; this crate
//! holds no global state and reads no environment variables.

pub mod broker;
pub mod dispatcher;
pub mod jobs;
pub mod worker;

// Re-export commonly used types
pub use broker::{BrokerError, BrokerResult, RedisBroker};
pub use dispatcher::Dispatcher;
pub use jobs::{
    DispatchError, DispatchResult, ExecutionError, ExecutionResult, Job, JobEnvelope, JobExecutor,
    JobKind, JobResult, JobStatus,
};
pub use worker::{Worker, WorkerConfig};

/// Current version of mapfabric
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
