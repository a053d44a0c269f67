use std::io::Read;

use chrono::{DateTime, Utc};

use crate::context::CallContext;
use crate::error::AnalyticsError;
use crate::models::{StudentLog, MIN_DIFFICULTY};
use crate::orchestrator::AnalyticsOrchestrator;

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    student_id: i64,
    action_type: String,
    #[serde(default)]
    material_id: String,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    time_spent_sec: i32,
    #[serde(default)]
    difficulty: Option<i32>,
    #[serde(default)]
    attempts: i32,
    #[serde(default)]
    selected_distractor: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl From<CsvRow> for StudentLog {
    fn from(row: CsvRow) -> Self {
        Self {
            material_id: row.material_id,
            correct: row.correct,
            time_spent_sec: row.time_spent_sec,
            difficulty: row.difficulty.unwrap_or(MIN_DIFFICULTY),
            attempts: row.attempts,
            selected_distractor: row.selected_distractor.filter(|d| !d.is_empty()),
            timestamp: row.timestamp,
            ..StudentLog::new(row.student_id, row.action_type)
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub recorded: usize,
    pub rejected: usize,
    pub unannounced: usize,
}

/// Submits each CSV row through the orchestrator. Invalid rows are counted
/// and skipped; rows persisted without an event still count as recorded.
pub async fn import_csv<R: Read>(
    orchestrator: &AnalyticsOrchestrator,
    ctx: &CallContext,
    reader: R,
) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        match orchestrator.submit_log(ctx, row.into()).await {
            Ok(_) => summary.recorded += 1,
            Err(AnalyticsError::Validation(reason)) => {
                tracing::warn!(row = line + 1, %reason, "skipping invalid log row");
                summary.rejected += 1;
            }
            Err(err) if err.is_partial_success() => {
                summary.recorded += 1;
                summary.unannounced += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{InMemoryCache, InMemoryPublisher, InMemoryStore};

    const SAMPLE: &str = "\
student_id,action_type,material_id,correct,time_spent_sec,difficulty,attempts,selected_distractor,timestamp
7,test_answer,algebra-101,true,42,3,1,,2026-02-01T10:00:00Z
0,test_answer,algebra-101,false,30,3,2,B,
9,view_material,geometry-204,false,300,,0,,
";

    #[tokio::test]
    async fn imports_valid_rows_and_counts_rejects() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        let orchestrator = AnalyticsOrchestrator::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            publisher.clone(),
        );

        let summary = import_csv(&orchestrator, &CallContext::background(), SAMPLE.as_bytes())
            .await
            .unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                recorded: 2,
                rejected: 1,
                unannounced: 0,
            }
        );
        let saved = store.saved_logs();
        assert_eq!(saved[0].selected_distractor, None);
        assert_eq!(saved[1].difficulty, 1);
        assert!(saved[1].timestamp.is_some());
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn persisted_rows_without_events_are_reported() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        publisher.set_failing(true);
        let orchestrator = AnalyticsOrchestrator::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            publisher,
        );

        let summary = import_csv(&orchestrator, &CallContext::background(), SAMPLE.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.recorded, 2);
        assert_eq!(summary.unannounced, 2);
        assert_eq!(store.saved_logs().len(), 2);
    }
}
