use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::context::CallContext;
use crate::error::{AnalyticsError, PublishError};
use crate::gateway::{CacheGateway, EventPublisher, StoreGateway};
use crate::models::{
    analytics_cache_key, AnalyticsView, AnalyzeStudentCommand, Student, StudentAnalytics,
    StudentLog, StudentLogRecorded, COMMANDS_CHANNEL, LOGS_CHANNEL, MAX_DIFFICULTY,
    MIN_DIFFICULTY,
};

pub const ANALYTICS_TTL: Duration = Duration::from_secs(5 * 60);

/// Coordinates cache, store and event publisher for analytics reads and log
/// writes. Holds no mutable state; clone freely across requests.
#[derive(Clone)]
pub struct AnalyticsOrchestrator {
    store: Arc<dyn StoreGateway>,
    cache: Arc<dyn CacheGateway>,
    publisher: Arc<dyn EventPublisher>,
}

impl AnalyticsOrchestrator {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        cache: Arc<dyn CacheGateway>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
        }
    }

    /// Persists a log, announces it on the logs channel and invalidates the
    /// student's cached analytics.
    ///
    /// `EventPublish` means the log is already durable; callers must not
    /// treat it as a rollback.
    pub async fn submit_log(
        &self,
        ctx: &CallContext,
        mut log: StudentLog,
    ) -> Result<StudentLog, AnalyticsError> {
        if log.student_id == 0 {
            return Err(AnalyticsError::Validation(
                "student_id is required".to_string(),
            ));
        }
        if log.action_type.is_empty() {
            return Err(AnalyticsError::Validation(
                "action_type is required".to_string(),
            ));
        }
        if log.time_spent_sec < 0 {
            return Err(AnalyticsError::Validation(format!(
                "time_spent_sec must be non-negative, got {}",
                log.time_spent_sec
            )));
        }
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&log.difficulty) {
            return Err(AnalyticsError::Validation(format!(
                "difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {}",
                log.difficulty
            )));
        }

        if log.timestamp.is_none() {
            log.timestamp = Some(Utc::now());
        }

        self.store.save_log(ctx, &log).await?;

        let event = StudentLogRecorded::new(log.clone());
        let payload = serde_json::to_value(&event).map_err(|e| AnalyticsError::EventPublish {
            source: PublishError::Serialization(e.to_string()),
            persisted: true,
        })?;
        if let Err(err) = self.publisher.publish(ctx, LOGS_CHANNEL, payload).await {
            tracing::error!(
                student_id = log.student_id,
                error = %err,
                "log persisted but event publish failed"
            );
            return Err(AnalyticsError::EventPublish {
                source: err,
                persisted: true,
            });
        }

        let key = analytics_cache_key(log.student_id);
        if let Err(err) = self.cache.delete(ctx, &key).await {
            tracing::warn!(%key, error = %err, "failed to invalidate cached analytics");
        }

        tracing::debug!(
            student_id = log.student_id,
            action_type = %log.action_type,
            "student log recorded"
        );
        Ok(log)
    }

    /// Cache, then store, then trigger recomputation and return a pending
    /// placeholder. The placeholder is never cached or persisted.
    pub async fn get_analytics(
        &self,
        ctx: &CallContext,
        student_id: i64,
    ) -> Result<AnalyticsView, AnalyticsError> {
        let key = analytics_cache_key(student_id);

        match self.cache.get(ctx, &key).await {
            Ok(Some(raw)) => match serde_json::from_str::<StudentAnalytics>(&raw) {
                Ok(analytics) => {
                    tracing::debug!(student_id, "analytics served from cache");
                    return Ok(AnalyticsView::Computed(analytics));
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%key, error = %err, "cache unavailable, falling through to store");
            }
        }

        if let Some(analytics) = self.store.latest_analytics(ctx, student_id).await? {
            self.write_through(ctx, &key, &analytics).await;
            tracing::debug!(student_id, "analytics served from store");
            return Ok(AnalyticsView::Computed(analytics));
        }

        self.publish_analysis_command(ctx, student_id)
            .await
            .map_err(AnalyticsError::AnalysisTrigger)?;
        tracing::info!(student_id, "no analytics yet, analysis requested");
        Ok(AnalyticsView::Pending(StudentAnalytics::processing(student_id)))
    }

    /// Requests recomputation. Success means the command was accepted for
    /// delivery, not that analysis finished. Repeated calls enqueue repeated
    /// commands.
    pub async fn trigger_analysis(
        &self,
        ctx: &CallContext,
        student_id: i64,
    ) -> Result<(), AnalyticsError> {
        self.publish_analysis_command(ctx, student_id)
            .await
            .map_err(|source| AnalyticsError::EventPublish {
                source,
                persisted: false,
            })
    }

    pub async fn list_student_logs(
        &self,
        ctx: &CallContext,
        student_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StudentLog>, AnalyticsError> {
        Ok(self.store.logs_by_student(ctx, student_id, from, to).await?)
    }

    pub async fn list_students(&self, ctx: &CallContext) -> Result<Vec<i64>, AnalyticsError> {
        Ok(self.store.student_ids(ctx).await?)
    }

    pub async fn student_by_id(
        &self,
        ctx: &CallContext,
        id: i64,
    ) -> Result<Option<Student>, AnalyticsError> {
        Ok(self.store.student_by_id(ctx, id).await?)
    }

    async fn publish_analysis_command(
        &self,
        ctx: &CallContext,
        student_id: i64,
    ) -> Result<(), PublishError> {
        let command = AnalyzeStudentCommand::new(student_id);
        let payload = serde_json::to_value(&command)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;
        self.publisher.publish(ctx, COMMANDS_CHANNEL, payload).await
    }

    async fn write_through(&self, ctx: &CallContext, key: &str, analytics: &StudentAnalytics) {
        let encoded = match serde_json::to_string(analytics) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(%key, error = %err, "failed to encode analytics for cache");
                return;
            }
        };
        if let Err(err) = self.cache.set(ctx, key, encoded, ANALYTICS_TTL).await {
            tracing::warn!(%key, error = %err, "failed to cache analytics");
        }
    }
}
