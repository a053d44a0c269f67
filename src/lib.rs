//! Student activity analytics: log intake, cached analytics lookups and
//! asynchronous recompute triggering over Postgres, Redis and pub/sub.

pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod import;
#[cfg(test)]
pub(crate) mod memory;
pub mod models;
pub mod orchestrator;

pub use context::CallContext;
pub use error::AnalyticsError;
pub use models::{AnalyticsView, Student, StudentAnalytics, StudentLog};
pub use orchestrator::AnalyticsOrchestrator;
