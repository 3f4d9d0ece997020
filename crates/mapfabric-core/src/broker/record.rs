//! Per-job record operations and the notification rendezvous
//!
//! The record is a hash keyed by the job id:
//!
//! | field                | written                                  |
//! |----------------------|------------------------------------------|
//! | `status`             | every transition                         |
//! | `timestamp`          | every transition (rolling, ISO-8601)     |
//! | `timestamp.<status>` | when that status is entered              |
//! | `duration`           | on success, seconds between run and done |
//! | `content_type`       | on success                               |
//! | `error`              | on failure                               |

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use redis::AsyncCommands;
use tracing::debug;

use crate::broker::{
    notification_channel, BrokerError, BrokerResult, RedisBroker, FAILURE_SENTINEL, JOBS_QUEUE,
};
use crate::jobs::JobStatus;

fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl RedisBroker {
    /// Append an encoded envelope to the queue and initialize its record
    /// with `status=queued`, in one atomic pipeline.
    pub async fn enqueue(&self, id: &str, payload: &[u8]) -> BrokerResult<()> {
        let now = iso_timestamp();
        let status = JobStatus::Queued;
        let mut conn = self.manager();
        redis::pipe()
            .atomic()
            .rpush(JOBS_QUEUE, payload)
            .ignore()
            .hset(id, "status", status.as_str())
            .ignore()
            .hset(id, format!("timestamp.{status}"), &now)
            .ignore()
            .hset(id, "timestamp", &now)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))?;
        debug!("Job enqueued: id={}", id);
        Ok(())
    }

    /// Transition the record to `running`
    pub async fn mark_running(&self, id: &str) -> BrokerResult<()> {
        let now = iso_timestamp();
        let status = JobStatus::Running;
        let mut conn = self.manager();
        redis::pipe()
            .atomic()
            .hset(id, "status", status.as_str())
            .ignore()
            .hset(id, format!("timestamp.{status}"), &now)
            .ignore()
            .hset(id, "timestamp", &now)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))
    }

    /// Transition the record to `succeed` and publish the encoded result.
    ///
    /// Record writes are queued before the publish inside one MULTI/EXEC,
    /// so a notified subscriber always reads a terminal status.
    pub async fn mark_succeed(
        &self,
        id: &str,
        content_type: &str,
        duration_secs: f64,
        payload: &[u8],
    ) -> BrokerResult<()> {
        let now = iso_timestamp();
        let status = JobStatus::Succeed;
        let mut conn = self.manager();
        redis::pipe()
            .atomic()
            .hset(id, "status", status.as_str())
            .ignore()
            .hset(id, "content_type", content_type)
            .ignore()
            .hset(id, "duration", duration_secs.to_string())
            .ignore()
            .hset(id, format!("timestamp.{status}"), &now)
            .ignore()
            .hset(id, "timestamp", &now)
            .ignore()
            .publish(notification_channel(id), payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))
    }

    /// Transition the record to `failed`, record the error text and publish
    /// the failure sentinel.
    pub async fn mark_failed(&self, id: &str, error: &str) -> BrokerResult<()> {
        let now = iso_timestamp();
        let status = JobStatus::Failed;
        let mut conn = self.manager();
        redis::pipe()
            .atomic()
            .hset(id, "status", status.as_str())
            .ignore()
            .hset(id, "error", error)
            .ignore()
            .hset(id, format!("timestamp.{status}"), &now)
            .ignore()
            .hset(id, "timestamp", &now)
            .ignore()
            .publish(notification_channel(id), FAILURE_SENTINEL)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))
    }

    /// Current status of a job, `None` when the record is gone or holds an
    /// unknown value
    pub async fn status(&self, id: &str) -> BrokerResult<Option<JobStatus>> {
        let mut conn = self.manager();
        let raw: Option<String> = conn
            .hget(id, "status")
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))?;
        Ok(raw.as_deref().and_then(JobStatus::from_str))
    }

    /// Error detail of a failed job
    pub async fn error_text(&self, id: &str) -> BrokerResult<Option<String>> {
        let mut conn = self.manager();
        conn.hget(id, "error")
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))
    }

    /// Full record contents, mainly for inspection and tests
    pub async fn record(&self, id: &str) -> BrokerResult<HashMap<String, String>> {
        let mut conn = self.manager();
        conn.hgetall(id)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))
    }

    /// Delete the per-job record; returns whether anything was deleted
    pub async fn delete_record(&self, id: &str) -> BrokerResult<bool> {
        let mut conn = self.manager();
        let deleted: i64 = conn
            .del(id)
            .await
            .map_err(|e| BrokerError::OperationError(e.to_string()))?;
        debug!("Job record deleted: id={}, existed={}", id, deleted > 0);
        Ok(deleted > 0)
    }
}
