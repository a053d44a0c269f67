use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LOGS_CHANNEL: &str = "student-logs";
pub const COMMANDS_CHANNEL: &str = "analysis-commands";
pub const PROCESSING_CLUSTER: &str = "processing";
pub const PROCESSING_MESSAGE: &str = "Analysis in progress, please check back shortly.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded action by a student. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentLog {
    #[serde(default)]
    pub student_id: i64,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub material_id: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub time_spent_sec: i32,
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,
    #[serde(default)]
    pub time_spent_on_mat: i32,
    #[serde(default)]
    pub time_spent_on_question: i32,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub selected_distractor: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

pub const MIN_DIFFICULTY: i32 = 1;
pub const MAX_DIFFICULTY: i32 = 5;

fn default_difficulty() -> i32 {
    MIN_DIFFICULTY
}

impl StudentLog {
    pub fn new(student_id: i64, action_type: impl Into<String>) -> Self {
        Self {
            student_id,
            action_type: action_type.into(),
            material_id: String::new(),
            correct: false,
            time_spent_sec: 0,
            difficulty: MIN_DIFFICULTY,
            time_spent_on_mat: 0,
            time_spent_on_question: 0,
            attempts: 0,
            selected_distractor: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnalytics {
    pub student_id: i64,
    pub cluster_group: String,
    pub engagement_score: i32,
    pub avg_time_per_task: f64,
    pub success_rate: f64,
    #[serde(default)]
    pub topic_efficiency: HashMap<String, f64>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl StudentAnalytics {
    /// Synthetic record returned while the analysis pipeline has nothing yet.
    pub fn processing(student_id: i64) -> Self {
        Self {
            student_id,
            cluster_group: PROCESSING_CLUSTER.to_string(),
            engagement_score: 0,
            avg_time_per_task: 0.0,
            success_rate: 0.0,
            topic_efficiency: HashMap::new(),
            recommendations: vec![PROCESSING_MESSAGE.to_string()],
            analyzed_at: Utc::now(),
        }
    }
}

/// Result of an analytics lookup. Only `Computed` values are ever cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyticsView {
    Computed(StudentAnalytics),
    Pending(StudentAnalytics),
}

impl AnalyticsView {
    pub fn analytics(&self) -> &StudentAnalytics {
        match self {
            Self::Computed(analytics) | Self::Pending(analytics) => analytics,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn into_inner(self) -> StudentAnalytics {
        match self {
            Self::Computed(analytics) | Self::Pending(analytics) => analytics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentLogRecorded {
    #[serde(rename = "type")]
    pub kind: String,
    pub event_id: Uuid,
    pub student_id: i64,
    pub log_data: StudentLog,
    pub timestamp: i64,
}

impl StudentLogRecorded {
    pub fn new(log: StudentLog) -> Self {
        Self {
            kind: "student_log".to_string(),
            event_id: Uuid::new_v4(),
            student_id: log.student_id,
            log_data: log,
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeStudentCommand {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    pub event_id: Uuid,
    pub student_id: i64,
    pub timestamp: i64,
}

impl AnalyzeStudentCommand {
    pub fn new(student_id: i64) -> Self {
        Self {
            kind: "analysis_command".to_string(),
            command: "analyze_student".to_string(),
            event_id: Uuid::new_v4(),
            student_id,
            timestamp: Utc::now().timestamp(),
        }
    }
}

pub fn analytics_cache_key(student_id: i64) -> String {
    format!("analytics:{student_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_uses_analytics_namespace() {
        assert_eq!(analytics_cache_key(42), "analytics:42");
    }

    #[test]
    fn analytics_survive_cache_serialization() {
        let analytics = StudentAnalytics {
            student_id: 42,
            cluster_group: "high_performer".to_string(),
            engagement_score: 87,
            avg_time_per_task: 41.5,
            success_rate: 0.82,
            topic_efficiency: HashMap::from([
                ("algebra".to_string(), 0.91),
                ("geometry".to_string(), 0.64),
            ]),
            recommendations: vec![
                "Try the advanced geometry set".to_string(),
                "Review triangle proofs".to_string(),
            ],
            analyzed_at: Utc::now(),
        };

        let encoded = serde_json::to_string(&analytics).unwrap();
        let decoded: StudentAnalytics = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, analytics);
    }

    #[test]
    fn missing_difficulty_matches_constructor() {
        let log: StudentLog =
            serde_json::from_str(r#"{"student_id":7,"action_type":"test_answer"}"#).unwrap();
        assert_eq!(log.difficulty, StudentLog::new(7, "test_answer").difficulty);
        assert_eq!(log.difficulty, MIN_DIFFICULTY);
    }

    #[test]
    fn view_serializes_with_status_tag() {
        let view = AnalyticsView::Pending(StudentAnalytics::processing(3));
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["cluster_group"], PROCESSING_CLUSTER);
        assert_eq!(value["student_id"], 3);
    }

    #[test]
    fn log_event_is_tagged_and_carries_student() {
        let event = StudentLogRecorded::new(StudentLog::new(7, "view_material"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "student_log");
        assert_eq!(value["student_id"], 7);
        assert_eq!(value["log_data"]["action_type"], "view_material");
    }
}
