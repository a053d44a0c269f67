//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::context::CallContext;
use crate::error::{CacheError, PublishError, StoreError};
use crate::gateway::{CacheGateway, EventPublisher, StoreGateway};
use crate::models::{Student, StudentAnalytics, StudentLog};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct InMemoryStore {
    logs: Mutex<Vec<StudentLog>>,
    students: Mutex<HashMap<i64, Student>>,
    analytics: Mutex<Vec<StudentAnalytics>>,
    analytics_lookups: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: StudentLog) {
        lock(&self.logs).push(log);
    }

    pub fn put_student(&self, student: Student) {
        lock(&self.students).insert(student.id, student);
    }

    /// Stands in for the analysis worker writing a computed snapshot.
    pub fn put_analytics(&self, analytics: StudentAnalytics) {
        lock(&self.analytics).push(analytics);
    }

    pub fn saved_logs(&self) -> Vec<StudentLog> {
        lock(&self.logs).clone()
    }

    pub fn analytics_for(&self, student_id: i64) -> Vec<StudentAnalytics> {
        lock(&self.analytics)
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect()
    }

    pub fn analytics_lookups(&self) -> usize {
        self.analytics_lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreGateway for InMemoryStore {
    async fn save_log(&self, _ctx: &CallContext, log: &StudentLog) -> Result<(), StoreError> {
        self.check()?;
        self.push_log(log.clone());
        Ok(())
    }

    async fn logs_by_student(
        &self,
        _ctx: &CallContext,
        student_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StudentLog>, StoreError> {
        self.check()?;
        let mut logs: Vec<StudentLog> = lock(&self.logs)
            .iter()
            .filter(|log| log.student_id == student_id)
            .filter(|log| matches!(log.timestamp, Some(ts) if ts >= from && ts < to))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }

    async fn student_ids(&self, _ctx: &CallContext) -> Result<Vec<i64>, StoreError> {
        self.check()?;
        let mut ids: Vec<i64> = lock(&self.logs).iter().map(|log| log.student_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn student_by_id(
        &self,
        _ctx: &CallContext,
        id: i64,
    ) -> Result<Option<Student>, StoreError> {
        self.check()?;
        Ok(lock(&self.students).get(&id).cloned())
    }

    async fn latest_analytics(
        &self,
        _ctx: &CallContext,
        student_id: i64,
    ) -> Result<Option<StudentAnalytics>, StoreError> {
        self.analytics_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(lock(&self.analytics)
            .iter()
            .filter(|a| a.student_id == student_id)
            .max_by_key(|a| a.analyzed_at)
            .cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    Get(String),
    Set {
        key: String,
        value: String,
        ttl: Duration,
    },
    Delete(String),
}

/// Expiry is recorded but not enforced.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<CacheCall>>,
    failing: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seeds an entry without recording a call.
    pub fn insert(&self, key: &str, value: String) {
        lock(&self.entries).insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: CacheCall) -> Result<(), CacheError> {
        lock(&self.calls).push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("in-memory cache offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheGateway for InMemoryCache {
    async fn get(&self, _ctx: &CallContext, key: &str) -> Result<Option<String>, CacheError> {
        self.record(CacheCall::Get(key.to_string()))?;
        Ok(self.value(key))
    }

    async fn set(
        &self,
        _ctx: &CallContext,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.record(CacheCall::Set {
            key: key.to_string(),
            value: value.clone(),
            ttl,
        })?;
        self.insert(key, value);
        Ok(())
    }

    async fn delete(&self, _ctx: &CallContext, key: &str) -> Result<(), CacheError> {
        self.record(CacheCall::Delete(key.to_string()))?;
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        _ctx: &CallContext,
        channel: &str,
        payload: Value,
    ) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Connection("in-memory channel closed".to_string()));
        }
        lock(&self.published).push((channel.to_string(), payload));
        Ok(())
    }
}
