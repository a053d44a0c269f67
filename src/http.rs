//! HTTP transport over the analytics orchestrator.
//!
//! Parses requests, resolves default log ranges and maps orchestrator
//! errors to status codes. No orchestration logic lives here.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::CallContext;
use crate::error::AnalyticsError;
use crate::models::StudentLog;
use crate::orchestrator::AnalyticsOrchestrator;

#[derive(Clone)]
pub struct AppState {
    orchestrator: AnalyticsOrchestrator,
    call_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: AnalyticsOrchestrator, call_timeout: Duration) -> Self {
        Self {
            orchestrator,
            call_timeout,
        }
    }

    fn ctx(&self) -> CallContext {
        CallContext::with_timeout(self.call_timeout)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/log", post(submit_log))
        .route("/api/analytics/{student_id}", get(get_analytics))
        .route("/api/analysis/trigger", post(trigger_analysis))
        .route("/api/students", get(list_students))
        .route("/api/students/{student_id}/logs", get(list_student_logs))
        .route("/api/students/{student_id}/profile", get(get_student))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<bool>,
}

#[derive(Debug)]
enum ApiError {
    BadRequest {
        message: &'static str,
        details: Option<String>,
    },
    NotFound(&'static str),
    Analytics {
        context: &'static str,
        error: AnalyticsError,
        persisted: bool,
    },
}

impl ApiError {
    fn bad_request(message: &'static str) -> Self {
        Self::BadRequest {
            message,
            details: None,
        }
    }

    fn analytics(context: &'static str, error: AnalyticsError) -> Self {
        Self::Analytics {
            context,
            error,
            persisted: false,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest {
            message: "Invalid request body",
            details: Some(rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest { message, details } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message.to_string(),
                    details,
                    persisted: None,
                },
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: message.to_string(),
                    details: None,
                    persisted: None,
                },
            ),
            Self::Analytics {
                context,
                error,
                persisted,
            } => {
                let status = match &error {
                    AnalyticsError::Validation(_) => StatusCode::BAD_REQUEST,
                    AnalyticsError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    AnalyticsError::EventPublish { .. } | AnalyticsError::AnalysisTrigger(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                if status.is_server_error() {
                    tracing::error!(error = %error, "{context}");
                }
                (
                    status,
                    ErrorBody {
                        error: context.to_string(),
                        details: Some(error.to_string()),
                        persisted: persisted.then_some(true),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn parse_student_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request("Invalid student ID"))
}

fn parse_bound(
    raw: Option<&str>,
    message: &'static str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| ApiError::BadRequest {
                message,
                details: Some(e.to_string()),
            }),
    }
}

/// Missing `from` defaults to one month before now, missing `to` to now.
pub fn resolve_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = from.unwrap_or_else(|| {
        now.checked_sub_months(Months::new(1))
            .unwrap_or(now - chrono::Duration::days(30))
    });
    (from, to.unwrap_or(now))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn submit_log(
    State(state): State<AppState>,
    payload: Result<Json<StudentLog>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(log) = payload?;
    let stored = state
        .orchestrator
        .submit_log(&state.ctx(), log)
        .await
        .map_err(|error| {
            let persisted = error.is_partial_success();
            ApiError::Analytics {
                context: "Failed to process log",
                error,
                persisted,
            }
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Log processed successfully",
        "student_id": stored.student_id,
        "timestamp": stored.timestamp,
    })))
}

async fn get_analytics(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = parse_student_id(&student_id)?;
    let view = state
        .orchestrator
        .get_analytics(&state.ctx(), student_id)
        .await
        .map_err(|e| ApiError::analytics("Failed to get analytics", e))?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    student_id: i64,
}

async fn trigger_analysis(
    State(state): State<AppState>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = payload?;
    state
        .orchestrator
        .trigger_analysis(&state.ctx(), request.student_id)
        .await
        .map_err(|e| ApiError::analytics("Failed to trigger analysis", e))?;

    Ok(Json(json!({
        "success": true,
        "student_id": request.student_id,
        "message": "Analysis triggered successfully",
    })))
}

#[derive(Debug, Default, Deserialize)]
struct LogRangeParams {
    from: Option<String>,
    to: Option<String>,
}

async fn list_student_logs(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Query(params): Query<LogRangeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student_id = parse_student_id(&student_id)?;
    let from = parse_bound(params.from.as_deref(), "Invalid from date format")?;
    let to = parse_bound(params.to.as_deref(), "Invalid to date format")?;
    let (from, to) = resolve_range(from, to, Utc::now());

    let logs = state
        .orchestrator
        .list_student_logs(&state.ctx(), student_id, from, to)
        .await
        .map_err(|e| ApiError::analytics("Failed to get logs", e))?;

    Ok(Json(json!({
        "student_id": student_id,
        "count": logs.len(),
        "logs": logs,
    })))
}

async fn list_students(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let students = state
        .orchestrator
        .list_students(&state.ctx())
        .await
        .map_err(|e| ApiError::analytics("Failed to get students", e))?;

    Ok(Json(json!({
        "count": students.len(),
        "students": students,
    })))
}

async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = parse_student_id(&student_id)?;
    let student = state
        .orchestrator
        .student_by_id(&state.ctx(), student_id)
        .await
        .map_err(|e| ApiError::analytics("Failed to get student", e))?
        .ok_or(ApiError::NotFound("Student not found"))?;
    Ok(Json(student))
}
