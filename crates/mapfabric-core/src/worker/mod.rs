//! Worker loop: consume envelopes in FIFO order, drive each to a terminal
//! state exactly once
//!
//! One worker process runs one cooperative loop; parallelism comes from
//! running N worker processes against the same queue. The pop is
//! destructive, so an envelope is delivered to at most one worker; a
//! worker that dies between pop and publish leaves the submitter to its
//! timeout.

pub mod backoff;

pub use backoff::ExponentialBackoff;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::RedisBroker;
use crate::jobs::{DispatchError, JobEnvelope, JobExecutor};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Broker URL
    pub redis_url: String,

    /// Upper bound on one blocking pop; the shutdown flag is re-checked at
    /// this cadence
    pub pop_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            pop_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }
}

/// Long-lived job consumer
pub struct Worker {
    config: WorkerConfig,

    executor: Arc<dyn JobExecutor>,

    /// Cooperative shutdown flag, checked between iterations; an executing
    /// job always finishes and publishes before the loop exits
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(config: WorkerConfig, executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            config,
            executor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that requests a graceful shutdown when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown.
    ///
    /// Connectivity is established with a 1-second retry loop; transient
    /// pop errors back off exponentially from 10 ms. Per-job failures
    /// never stop the loop.
    pub async fn run(&self) {
        let broker =
            match RedisBroker::connect_with_retry(&self.config.redis_url, &self.shutdown).await {
                Some(broker) => broker,
                None => {
                    info!("Shutdown requested before broker connection was established");
                    return;
                }
            };

        let mut backoff = ExponentialBackoff::default();

        while !self.shutdown.is_cancelled() {
            debug!("Waiting for jobs");
            match broker.pop_job(self.config.pop_timeout).await {
                Ok(Some(payload)) => {
                    backoff.reset();
                    self.process_envelope(&broker, &payload).await;
                }
                Ok(None) => {
                    // pop timed out, loop around to re-check the flag
                }
                Err(e) => {
                    error!("Error popping job: {}", e);
                    let delay = backoff.next_delay();
                    warn!("Retrying in {:?}...", delay);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    /// Drive one popped envelope through the status state machine
    async fn process_envelope(&self, broker: &RedisBroker, payload: &[u8]) {
        let envelope = match JobEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(DispatchError::UnsupportedJobKind(kind)) => {
                // a foreign producer put something unknown on our queue;
                // not requeued, this cannot become valid by retrying
                error!("Unsupported job kind `{}`, discarding envelope", kind);
                return;
            }
            Err(err) => {
                match JobEnvelope::peek_id(payload) {
                    Some(id) => {
                        warn!("Undecodable envelope, failing job: id={}, error={}", id, err);
                        if let Err(e) = broker.mark_failed(&id, &err.to_string()).await {
                            error!("Could not record decode failure: id={}, error={}", id, e);
                        }
                    }
                    None => error!("Dropping undecodable envelope: {}", err),
                }
                return;
            }
        };

        let id = &envelope.id;
        debug!("Job received: id={}, type={}", id, envelope.kind());

        if let Err(e) = broker.mark_running(id).await {
            error!("Could not transition job to running: id={}, error={}", id, e);
            return;
        }

        let started = Instant::now();
        match self.executor.process(&envelope.job).await {
            Ok(result) => {
                let duration = started.elapsed().as_secs_f64();
                debug!("Duration of job execution: id={}, seconds={}", id, duration);
                match result.encode() {
                    Ok(blob) => {
                        if let Err(e) = broker
                            .mark_succeed(id, &result.content_type, duration, &blob)
                            .await
                        {
                            error!("Could not publish job result: id={}, error={}", id, e);
                        }
                    }
                    Err(err) => {
                        error!("Could not encode job result: id={}, error={}", id, err);
                        if let Err(e) = broker.mark_failed(id, &err.to_string()).await {
                            error!("Could not record job failure: id={}, error={}", id, e);
                        }
                    }
                }
            }
            Err(err) => {
                error!("Job execution failed: id={}, error={}", id, err);
                if let Err(e) = broker.mark_failed(id, &err.to_string()).await {
                    error!("Could not record job failure: id={}, error={}", id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ExecutionResult, Job, JobResult, JobStatus, LegendJob};

    const TEST_URL: &str = "redis://127.0.0.1:6379/11";

    // Mock executor for testing
    struct MockExecutor;

    #[async_trait::async_trait]
    impl JobExecutor for MockExecutor {
        async fn process(&self, _job: &Job) -> ExecutionResult<JobResult> {
            Ok(JobResult::new("image/png", vec![1, 2, 3]))
        }
    }

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl JobExecutor for FailingExecutor {
        async fn process(&self, _job: &Job) -> ExecutionResult<JobResult> {
            Err("boom".into())
        }
    }

    fn worker(executor: Arc<dyn JobExecutor>) -> Worker {
        Worker::new(WorkerConfig::new(TEST_URL), executor)
    }

    fn legend_payload(id: &str) -> Vec<u8> {
        JobEnvelope::with_id(id, Job::Legend(LegendJob { svg_paths: vec![] }))
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_envelope_success() {
        // Requires a local broker; skipped silently otherwise
        if let Ok(broker) = RedisBroker::connect(TEST_URL).await {
            let worker = worker(Arc::new(MockExecutor));
            let id = uuid::Uuid::new_v4().to_string();

            worker.process_envelope(&broker, &legend_payload(&id)).await;

            let record = broker.record(&id).await.unwrap();
            assert_eq!(record.get("status").map(String::as_str), Some("succeed"));
            assert_eq!(
                record.get("content_type").map(String::as_str),
                Some("image/png")
            );
            assert!(record.contains_key("duration"));
            broker.delete_record(&id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_process_envelope_execution_failure() {
        if let Ok(broker) = RedisBroker::connect(TEST_URL).await {
            let worker = worker(Arc::new(FailingExecutor));
            let id = uuid::Uuid::new_v4().to_string();

            worker.process_envelope(&broker, &legend_payload(&id)).await;

            let record = broker.record(&id).await.unwrap();
            assert_eq!(record.get("status").map(String::as_str), Some("failed"));
            assert_eq!(record.get("error").map(String::as_str), Some("boom"));
            assert!(!record.contains_key("duration"));
            broker.delete_record(&id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_is_discarded() {
        if let Ok(broker) = RedisBroker::connect(TEST_URL).await {
            let worker = worker(Arc::new(MockExecutor));
            let payload = br#"{"id": "discard-me", "type": "NotAJob", "job": {}}"#;

            worker.process_envelope(&broker, payload).await;

            // no record is created for a discarded envelope
            assert_eq!(broker.status("discard-me").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_undecodable_envelope_fails_its_job() {
        if let Ok(broker) = RedisBroker::connect(TEST_URL).await {
            let worker = worker(Arc::new(MockExecutor));
            let id = uuid::Uuid::new_v4().to_string();
            let payload =
                format!(r#"{{"id": "{id}", "type": "Legend", "job": {{"bogus": true}}}}"#);

            worker.process_envelope(&broker, payload.as_bytes()).await;

            assert_eq!(broker.status(&id).await.unwrap(), Some(JobStatus::Failed));
            assert!(broker.error_text(&id).await.unwrap().is_some());
            broker.delete_record(&id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        // connect target refuses immediately; run must return, not spin
        let worker = Worker::new(
            WorkerConfig::new("redis://127.0.0.1:1/0"),
            Arc::new(MockExecutor),
        );
        worker.shutdown_token().cancel();
        tokio::time::timeout(Duration::from_secs(5), worker.run())
            .await
            .expect("run should exit once the shutdown token is cancelled");
    }
}
