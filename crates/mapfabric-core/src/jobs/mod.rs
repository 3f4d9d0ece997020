//! Typed jobs and their wire codec
//!
//! This module defines the closed union of job kinds, the `{id, type, job}`
//! envelope they travel in, the per-job status state machine, and the
//! `JobExecutor` seam the worker drives jobs through:
//! - Four job kinds: `GetMap`, `GetFeatureInfo`, `GetFeature`, `Legend`
//! - Self-describing JSON envelope with a textual discriminator probe
//! - Decode-time payload validation (positional styles, pixel coordinates,
//!   alias lengths)
//! - `JobResult` transport codec for the notification channel

pub mod envelope;
pub mod job;
pub mod layers;
pub mod status;

// Re-export main types
pub use envelope::{JobEnvelope, JobKind};
pub use job::{
    DatasetRef, FeatureQuery, GetFeatureInfoJob, GetFeatureJob, GetMapJob, Job, JobResult,
    LegendJob, WmsFeatureInfoParams, WmsMapParams,
};
pub use layers::{
    BBox, Crs, Custom, DataSource, Field, GdalSource, NamedStyle, OgrSource, PostgresSource,
    Raster, Vector, VectorTileSource, WfsSource, WmsSource, WmtsSource,
};
pub use status::JobStatus;

/// Job dispatch result type
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure modes of the submission/decode/completion cycle.
///
/// Every terminal `submit` call either returns a [`JobResult`] or exactly
/// one of these kinds with a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Unsupported job kind: {0}")]
    UnsupportedJobKind(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Job timed out")]
    JobTimeout,

    #[error("Job cancelled")]
    JobCancelled,

    #[error("Job failed: {0}")]
    JobFailed(String),
}

impl From<crate::broker::BrokerError> for DispatchError {
    fn from(err: crate::broker::BrokerError) -> Self {
        DispatchError::BrokerUnavailable(err.to_string())
    }
}

/// Error raised by a [`JobExecutor`]; its display form is recorded verbatim
/// in the per-job record's `error` field.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Execution result type
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Capability that turns a decoded job into a [`JobResult`].
///
/// Implementations map each kind to a fixed result media type: `GetMap` and
/// `Legend` to image bytes in the requested format, `GetFeatureInfo` to
/// `application/json`, `GetFeature` to the engine's feature-collection
/// encoding. Calls are sequential on one instance; there is no concurrency
/// requirement beyond `Send + Sync`.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn process(&self, job: &Job) -> ExecutionResult<JobResult>;
}
