//! Contracts for the collaborators the orchestrator composes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::context::CallContext;
use crate::error::{CacheError, PublishError, StoreError};
use crate::models::{Student, StudentAnalytics, StudentLog};

/// System of record for logs, students and analytics snapshots.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn save_log(&self, ctx: &CallContext, log: &StudentLog) -> Result<(), StoreError>;

    /// Logs in `[from, to)`, most recent first.
    async fn logs_by_student(
        &self,
        ctx: &CallContext,
        student_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StudentLog>, StoreError>;

    async fn student_ids(&self, ctx: &CallContext) -> Result<Vec<i64>, StoreError>;

    async fn student_by_id(
        &self,
        ctx: &CallContext,
        id: i64,
    ) -> Result<Option<Student>, StoreError>;

    async fn latest_analytics(
        &self,
        ctx: &CallContext,
        student_id: i64,
    ) -> Result<Option<StudentAnalytics>, StoreError>;
}

/// Key-value store with expiry. Values are opaque strings.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    async fn get(&self, ctx: &CallContext, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(
        &self,
        ctx: &CallContext,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), CacheError>;
}

/// Fire-and-forget delivery of JSON payloads to named channels.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        ctx: &CallContext,
        channel: &str,
        payload: Value,
    ) -> Result<(), PublishError>;
}
