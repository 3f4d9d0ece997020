//! Dispatcher client: submit a job, await its terminal outcome
//!
//! `submit` hides the broker from callers entirely: it allocates the job
//! id, enqueues the envelope together with the record initialization in
//! one atomic pipeline, subscribes to the job's notification channel and
//! waits — bounded by the caller's timeout — for exactly one terminal
//! message. Every exit path (result, failure, timeout, cancellation, or
//! the future being dropped mid-wait) removes the per-job record so the
//! broker never accumulates state.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{notification_channel, RedisBroker};
use crate::jobs::{DispatchError, DispatchResult, Job, JobEnvelope, JobResult, JobStatus};

/// Client side of the job fabric
#[derive(Clone)]
pub struct Dispatcher {
    broker: RedisBroker,
}

impl Dispatcher {
    pub fn new(broker: RedisBroker) -> Self {
        Self { broker }
    }

    /// Connect a dispatcher to the broker at `url`
    pub async fn connect(url: &str) -> DispatchResult<Self> {
        Ok(Self::new(RedisBroker::connect(url).await?))
    }

    pub fn broker(&self) -> &RedisBroker {
        &self.broker
    }

    /// Submit `job` and wait at most `timeout` for its result.
    ///
    /// Returns the [`JobResult`] published by the worker, or exactly one of
    /// the [`DispatchError`] kinds.
    pub async fn submit(&self, job: Job, timeout: Duration) -> DispatchResult<JobResult> {
        self.submit_with_cancellation(job, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`Self::submit`], additionally aborting with
    /// [`DispatchError::JobCancelled`] when `cancel` fires while waiting.
    pub async fn submit_with_cancellation(
        &self,
        job: Job,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DispatchResult<JobResult> {
        let envelope = JobEnvelope::new(job);
        let payload = envelope.encode()?;
        let id = envelope.id;

        self.broker.enqueue(&id, &payload).await?;
        info!("Job pushed: id={}, type={}", id, envelope.job.kind());

        // Cleans up the record if this future is dropped before one of the
        // explicit exit paths below runs.
        let mut guard = RecordGuard::new(self.broker.clone(), id.clone());

        let mut pubsub = self.broker.subscribe(&notification_channel(&id)).await?;

        // A worker may have driven the job to a terminal state between the
        // enqueue and the subscription. A terminal `failed` is recoverable
        // from the record; a terminal `succeed` is not (the result blob
        // travels only on the channel), so that case runs into the timeout.
        if self.broker.status(&id).await? == Some(JobStatus::Failed) {
            return Err(self.conclude_failed(&id, &mut guard).await?);
        }

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);
        let mut messages = pubsub.on_message();

        loop {
            tokio::select! {
                biased;

                _ = &mut sleep => {
                    info!("Job timed out: id={}", id);
                    self.delete_record_logged(&id).await;
                    guard.disarm();
                    return Err(DispatchError::JobTimeout);
                }

                _ = cancel.cancelled() => {
                    info!("Job cancelled while waiting: id={}", id);
                    self.delete_record_logged(&id).await;
                    guard.disarm();
                    return Err(DispatchError::JobCancelled);
                }

                message = messages.next() => {
                    let message = match message {
                        Some(message) => message,
                        None => {
                            self.delete_record_logged(&id).await;
                            guard.disarm();
                            return Err(DispatchError::BrokerUnavailable(
                                "notification subscription closed".to_string(),
                            ));
                        }
                    };
                    match self.broker.status(&id).await? {
                        Some(JobStatus::Succeed) => {
                            let data: Vec<u8> = message
                                .get_payload()
                                .map_err(|e| DispatchError::BrokerUnavailable(e.to_string()))?;
                            let result = JobResult::decode(&data)?;
                            debug!(
                                "Job succeeded: id={}, content_type={}, bytes={}",
                                id,
                                result.content_type,
                                result.data.len()
                            );
                            // delete out of band, the caller has its result
                            let broker = self.broker.clone();
                            let record_id = id.clone();
                            tokio::spawn(async move {
                                if let Err(e) = broker.delete_record(&record_id).await {
                                    warn!("Could not delete job record: id={}, error={}", record_id, e);
                                }
                            });
                            guard.disarm();
                            return Ok(result);
                        }
                        Some(JobStatus::Failed) => {
                            return Err(self.conclude_failed(&id, &mut guard).await?);
                        }
                        status => {
                            // spurious wake-up, keep waiting for the terminal message
                            debug!("Ignoring notification in status {:?}: id={}", status, id);
                        }
                    }
                }
            }
        }
    }

    async fn conclude_failed(
        &self,
        id: &str,
        guard: &mut RecordGuard,
    ) -> DispatchResult<DispatchError> {
        let error = self
            .broker
            .error_text(id)
            .await?
            .unwrap_or_else(|| "job failed without error detail".to_string());
        warn!("Job failed: id={}, error={}", id, error);
        self.delete_record_logged(id).await;
        guard.disarm();
        Ok(DispatchError::JobFailed(error))
    }

    async fn delete_record_logged(&self, id: &str) {
        if let Err(e) = self.broker.delete_record(id).await {
            warn!("Could not delete job record: id={}, error={}", id, e);
        }
    }
}

/// Deletes the per-job record when dropped while still armed, covering
/// callers that drop the `submit` future mid-wait.
struct RecordGuard {
    broker: RedisBroker,
    id: String,
    armed: bool,
}

impl RecordGuard {
    fn new(broker: RedisBroker, id: String) -> Self {
        Self {
            broker,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let broker = self.broker.clone();
            let id = std::mem::take(&mut self.id);
            handle.spawn(async move {
                if let Err(e) = broker.delete_record(&id).await {
                    warn!("Could not delete job record: id={}, error={}", id, e);
                }
            });
        }
    }
}
