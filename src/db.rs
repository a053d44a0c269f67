use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::context::{CallContext, DEFAULT_CALL_BUDGET};
use crate::error::StoreError;
use crate::gateway::StoreGateway;
use crate::models::{Student, StudentAnalytics, StudentLog};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SEED_LOG_INSERT: &str = r#"
    INSERT INTO student_logs
    (student_id, action_type, material_id, correct, time_spent_sec, difficulty,
     attempts, selected_distractor, logged_at, source_key)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (source_key) DO NOTHING
    "#;

// Only the first snapshot is seeded; later ones come from the analysis worker.
const SEED_ANALYTICS_INSERT: &str = r#"
    INSERT INTO student_analytics
    (student_id, cluster_group, engagement_score, avg_time_per_task, success_rate,
     topic_efficiency, recommendations, analyzed_at)
    SELECT $1, $2, $3, $4, $5, $6, $7, $8
    WHERE NOT EXISTS (SELECT 1 FROM student_analytics WHERE student_id = $1)
    "#;

struct SeedLog {
    source_key: &'static str,
    student: usize,
    action_type: &'static str,
    material_id: &'static str,
    correct: bool,
    time_spent_sec: i32,
    difficulty: i32,
    attempts: i32,
    selected_distractor: Option<&'static str>,
    days_ago: i64,
}

fn seed_logs() -> Vec<SeedLog> {
    vec![
        SeedLog {
            source_key: "seed-log-001",
            student: 0,
            action_type: "view_material",
            material_id: "algebra-101",
            correct: false,
            time_spent_sec: 340,
            difficulty: 2,
            attempts: 1,
            selected_distractor: None,
            days_ago: 3,
        },
        SeedLog {
            source_key: "seed-log-002",
            student: 0,
            action_type: "test_answer",
            material_id: "algebra-101",
            correct: true,
            time_spent_sec: 45,
            difficulty: 2,
            attempts: 1,
            selected_distractor: None,
            days_ago: 3,
        },
        SeedLog {
            source_key: "seed-log-003",
            student: 1,
            action_type: "test_answer",
            material_id: "geometry-204",
            correct: false,
            time_spent_sec: 120,
            difficulty: 4,
            attempts: 2,
            selected_distractor: Some("B"),
            days_ago: 1,
        },
        SeedLog {
            source_key: "seed-log-004",
            student: 2,
            action_type: "watch_video",
            material_id: "fractions-intro",
            correct: false,
            time_spent_sec: 610,
            difficulty: 1,
            attempts: 1,
            selected_distractor: None,
            days_ago: 6,
        },
    ]
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("Avery Lee", "avery.lee@example.edu", "student"),
        ("Jules Moreno", "jules.moreno@example.edu", "student"),
        ("Kiara Patel", "kiara.patel@example.edu", "student"),
        ("Dana Whitfield", "dana.whitfield@example.edu", "teacher"),
    ];

    let mut ids = Vec::new();
    for (name, email, role) in students {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO students (name, email, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name, role = EXCLUDED.role, updated_at = now()
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(role)
        .fetch_one(pool)
        .await?
        .get("id");
        ids.push(id);
    }

    let now = Utc::now();
    for seed in seed_logs() {
        sqlx::query(SEED_LOG_INSERT)
            .bind(ids[seed.student])
            .bind(seed.action_type)
            .bind(seed.material_id)
            .bind(seed.correct)
            .bind(seed.time_spent_sec)
            .bind(seed.difficulty)
            .bind(seed.attempts)
            .bind(seed.selected_distractor)
            .bind(now - ChronoDuration::days(seed.days_ago))
            .bind(seed.source_key)
            .execute(pool)
            .await?;
    }

    let efficiency = HashMap::from([("algebra".to_string(), 0.88)]);
    sqlx::query(SEED_ANALYTICS_INSERT)
        .bind(ids[0])
        .bind("high_performer")
        .bind(82)
        .bind(192.5)
        .bind(0.5)
        .bind(Json(efficiency))
        .bind(Json(vec!["Move on to algebra-102".to_string()]))
        .bind(now - ChronoDuration::days(1))
        .execute(pool)
        .await
        .context("failed to seed analytics snapshot")?;

    Ok(())
}

pub struct PgStore {
    pool: PgPool,
    call_budget: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            call_budget: DEFAULT_CALL_BUDGET,
        }
    }

    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget = budget;
        self
    }
}

fn log_from_row(row: &PgRow) -> Result<StudentLog, StoreError> {
    Ok(StudentLog {
        student_id: row.try_get("student_id")?,
        action_type: row.try_get("action_type")?,
        material_id: row.try_get("material_id")?,
        correct: row.try_get("correct")?,
        time_spent_sec: row.try_get("time_spent_sec")?,
        difficulty: row.try_get("difficulty")?,
        time_spent_on_mat: row.try_get("time_spent_on_mat")?,
        time_spent_on_question: row.try_get("time_spent_on_question")?,
        attempts: row.try_get("attempts")?,
        selected_distractor: row.try_get("selected_distractor")?,
        timestamp: Some(row.try_get("logged_at")?),
    })
}

fn analytics_from_row(row: &PgRow) -> Result<StudentAnalytics, StoreError> {
    let Json(topic_efficiency): Json<HashMap<String, f64>> = row
        .try_get("topic_efficiency")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let Json(recommendations): Json<Vec<String>> = row
        .try_get("recommendations")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(StudentAnalytics {
        student_id: row.try_get("student_id")?,
        cluster_group: row.try_get("cluster_group")?,
        engagement_score: row.try_get("engagement_score")?,
        avg_time_per_task: row.try_get("avg_time_per_task")?,
        success_rate: row.try_get("success_rate")?,
        topic_efficiency,
        recommendations,
        analyzed_at: row.try_get("analyzed_at")?,
    })
}

#[async_trait]
impl StoreGateway for PgStore {
    async fn save_log(&self, ctx: &CallContext, log: &StudentLog) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO student_logs
            (student_id, action_type, material_id, correct, time_spent_sec, difficulty,
             time_spent_on_mat, time_spent_on_question, attempts, selected_distractor, logged_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(log.student_id)
        .bind(&log.action_type)
        .bind(&log.material_id)
        .bind(log.correct)
        .bind(log.time_spent_sec)
        .bind(log.difficulty)
        .bind(log.time_spent_on_mat)
        .bind(log.time_spent_on_question)
        .bind(log.attempts)
        .bind(log.selected_distractor.as_deref())
        .bind(log.timestamp.unwrap_or_else(Utc::now))
        .execute(&self.pool);

        ctx.run(self.call_budget, query)
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    async fn logs_by_student(
        &self,
        ctx: &CallContext,
        student_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StudentLog>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT student_id, action_type, material_id, correct, time_spent_sec, difficulty,
                   time_spent_on_mat, time_spent_on_question, attempts, selected_distractor,
                   logged_at
            FROM student_logs
            WHERE student_id = $1 AND logged_at >= $2 AND logged_at < $3
            ORDER BY logged_at DESC
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool);

        let rows = ctx
            .run(self.call_budget, query)
            .await
            .map_err(|_| StoreError::Timeout)??;
        rows.iter().map(log_from_row).collect()
    }

    async fn student_ids(&self, ctx: &CallContext) -> Result<Vec<i64>, StoreError> {
        let query = sqlx::query("SELECT DISTINCT student_id FROM student_logs ORDER BY student_id")
            .fetch_all(&self.pool);

        let rows = ctx
            .run(self.call_budget, query)
            .await
            .map_err(|_| StoreError::Timeout)??;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("student_id")?);
        }
        Ok(ids)
    }

    async fn student_by_id(
        &self,
        ctx: &CallContext,
        id: i64,
    ) -> Result<Option<Student>, StoreError> {
        let query = sqlx::query(
            "SELECT id, name, email, role, created_at, updated_at FROM students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool);

        let row = ctx
            .run(self.call_budget, query)
            .await
            .map_err(|_| StoreError::Timeout)??;
        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Student {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn latest_analytics(
        &self,
        ctx: &CallContext,
        student_id: i64,
    ) -> Result<Option<StudentAnalytics>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT student_id, cluster_group, engagement_score, avg_time_per_task, success_rate,
                   topic_efficiency, recommendations, analyzed_at
            FROM student_analytics
            WHERE student_id = $1
            ORDER BY analyzed_at DESC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool);

        let row = ctx
            .run(self.call_budget, query)
            .await
            .map_err(|_| StoreError::Timeout)??;
        row.as_ref().map(analytics_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn seed_logs_have_unique_source_keys() {
        let logs = seed_logs();
        let keys: HashSet<_> = logs.iter().map(|log| log.source_key).collect();
        assert_eq!(keys.len(), logs.len());
    }

    #[test]
    fn seed_logs_reference_seeded_students() {
        for log in seed_logs() {
            assert!(log.student < 4);
            assert!((1..=5).contains(&log.difficulty));
            assert!(log.time_spent_sec >= 0);
        }
    }

    #[test]
    fn seed_inserts_skip_existing_rows() {
        assert!(SEED_LOG_INSERT.contains("ON CONFLICT (source_key) DO NOTHING"));
        assert!(SEED_ANALYTICS_INSERT.contains("WHERE NOT EXISTS"));
    }
}
