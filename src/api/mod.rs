//! HTTP transport surface.
//!
//! Endpoints:
//! - POST /api/analyze  - run the analysis pipeline for an utterance
//! - POST /api/execute  - execute approved SQL for a pending session
//! - GET  /api/health   - liveness and version
//! - GET  /api/history/:session_id - pending-turn snapshot
//!
//! Pipeline outcomes are HTTP 200 with a discriminating `kind` field;
//! `session_missing` is 404. 4xx/5xx otherwise mean malformed input or
//! internal failures.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::orchestrator::{AnalyzeOutcome, ExecuteOutcome, Orchestrator};
use crate::store::QueryRow;

// ============================================================================
// Application state
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub utterance: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzeResponse {
    Sql {
        session_id: Uuid,
        sql: String,
        warnings: Vec<String>,
        plan: Vec<String>,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Description {
        text: String,
    },
    Error {
        stage: String,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub session_id: Uuid,
    pub approved_sql: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecuteResponse {
    Result {
        rows: Vec<QueryRow>,
        row_count: usize,
        truncated: bool,
        interpretation: String,
    },
    ExecError {
        engine_error: String,
        debug_suggestion: Option<String>,
    },
    SessionMissing {},
    Error {
        stage: String,
        message: String,
    },
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub utterance: String,
    pub plan: Vec<String>,
    pub generated_sql: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub error: String,
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/execute", post(execute))
        .route("/api/health", get(health))
        .route("/api/history/:session_id", get(history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<AnalyzeResponse> {
    let outcome = state
        .orchestrator
        .analyze(&request.utterance, request.session_id)
        .await;
    Json(match outcome {
        AnalyzeOutcome::NeedsSqlApproval {
            session_id,
            sql,
            warnings,
            plan,
        } => AnalyzeResponse::Sql {
            session_id,
            sql,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
            plan,
        },
        AnalyzeOutcome::Suggestions { suggestions } => AnalyzeResponse::Suggestions { suggestions },
        AnalyzeOutcome::Description { text } => AnalyzeResponse::Description { text },
        AnalyzeOutcome::Failed { stage, reason } => AnalyzeResponse::Error {
            stage: stage.to_string(),
            message: reason,
        },
    })
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let outcome = state
        .orchestrator
        .execute(request.session_id, &request.approved_sql)
        .await;
    match outcome {
        ExecuteOutcome::Success {
            rows,
            interpretation,
            row_count,
            truncated,
        } => (
            StatusCode::OK,
            Json(ExecuteResponse::Result {
                rows,
                row_count,
                truncated,
                interpretation,
            }),
        ),
        ExecuteOutcome::ExecutionFailed {
            engine_error,
            debug_suggestion,
        } => (
            StatusCode::OK,
            Json(ExecuteResponse::ExecError {
                engine_error,
                debug_suggestion,
            }),
        ),
        ExecuteOutcome::SessionMissing => {
            (StatusCode::NOT_FOUND, Json(ExecuteResponse::SessionMissing {}))
        }
        ExecuteOutcome::Failed { stage, reason } => (
            StatusCode::OK,
            Json(ExecuteResponse::Error {
                stage: stage.to_string(),
                message: reason,
            }),
        ),
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<NotFoundResponse>)> {
    match state.orchestrator.sessions().peek(session_id).await {
        Some(session) => Ok(Json(HistoryResponse {
            session_id: session.id,
            utterance: session.utterance,
            plan: session.plan,
            generated_sql: session.sql,
            created_at: session.created_at,
        })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(NotFoundResponse {
                error: format!("no pending session with id {session_id}"),
            }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SqlWarning;

    #[test]
    fn test_analyze_response_kinds() {
        let response = AnalyzeResponse::Sql {
            session_id: Uuid::nil(),
            sql: "SELECT 1".into(),
            warnings: vec![SqlWarning::MissingFrom.to_string()],
            plan: vec!["step".into()],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "sql");
        assert_eq!(json["warnings"][0], "missing-from");

        let json = serde_json::to_value(AnalyzeResponse::Error {
            stage: "plan".into(),
            message: "nope".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["stage"], "plan");
    }

    #[test]
    fn test_execute_response_kinds() {
        let json = serde_json::to_value(ExecuteResponse::SessionMissing {}).unwrap();
        assert_eq!(json["kind"], "session_missing");

        let json = serde_json::to_value(ExecuteResponse::ExecError {
            engine_error: "syntax error".into(),
            debug_suggestion: None,
        })
        .unwrap();
        assert_eq!(json["kind"], "exec_error");
        assert!(json["debug_suggestion"].is_null());
    }
}
