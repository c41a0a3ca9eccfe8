//! Ratify API
//!
//! HTTP routes over the [`ApprovalController`]. Each request gets its own
//! cancellation token, a child of the server's shutdown token, so in-flight
//! operations stop at their next adapter boundary when the server shuts down.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ratify_orchestrator::response::{
  CompleteResponse, ConflictCheckResponse, ErrorResponse, PendingTasksResponse, SubmitResponse,
};
use ratify_orchestrator::{ApprovalController, OrchestrationError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
  pub controller: Arc<ApprovalController>,
  /// Cancelled when the server is shutting down.
  pub shutdown: CancellationToken,
}

impl AppState {
  pub fn new(controller: ApprovalController, shutdown: CancellationToken) -> Self {
    Self {
      controller: Arc::new(controller),
      shutdown,
    }
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/drafts/:draft_id/submit", post(submit))
    .route("/drafts/:draft_id/conflict", get(check_conflict))
    .route("/drafts/:draft_id/resubmit", post(resubmit))
    .route("/tasks", get(pending_tasks))
    .route("/tasks/:task_id/complete", post(complete))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Serve until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
  let shutdown = state.shutdown.clone();
  if let Ok(addr) = listener.local_addr() {
    info!(%addr, "listening");
  }

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

#[derive(Debug)]
pub enum ApiError {
  Orchestration(OrchestrationError),
  /// The request body or query string could not be read.
  Malformed(String),
}

impl From<OrchestrationError> for ApiError {
  fn from(err: OrchestrationError) -> Self {
    ApiError::Orchestration(err)
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::Malformed(rejection.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    ApiError::Malformed(rejection.body_text())
  }
}

/// HTTP status for an error code.
pub fn status_for(code: &str) -> StatusCode {
  match code {
    "validation_error" => StatusCode::BAD_REQUEST,
    "not_found" => StatusCode::NOT_FOUND,
    "invalid_state" => StatusCode::CONFLICT,
    "adapter_error" => StatusCode::BAD_GATEWAY,
    "adapter_timeout" => StatusCode::GATEWAY_TIMEOUT,
    "cancelled" => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = match self {
      ApiError::Orchestration(err) => ErrorResponse::from(&err),
      ApiError::Malformed(message) => ErrorResponse {
        success: false,
        error: "validation_error",
        message,
      },
    };
    (status_for(body.error), Json(body)).into_response()
  }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
  status: &'static str,
}

async fn health() -> Json<HealthResponse> {
  Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
  #[serde(default)]
  user_id: String,
}

async fn submit(
  State(state): State<AppState>,
  Path(draft_id): Path<String>,
  body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
  let Json(request) = body?;
  let cancel = state.shutdown.child_token();
  let submission = state
    .controller
    .submit_for_approval(&draft_id, &request.user_id, &cancel)
    .await?;
  Ok(Json(submission.into()))
}

async fn resubmit(
  State(state): State<AppState>,
  Path(draft_id): Path<String>,
  body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
  let Json(request) = body?;
  let cancel = state.shutdown.child_token();
  let submission = state
    .controller
    .resubmit_with_updated_version(&draft_id, &request.user_id, &cancel)
    .await?;
  Ok(Json(submission.into()))
}

async fn check_conflict(
  State(state): State<AppState>,
  Path(draft_id): Path<String>,
) -> Result<Json<ConflictCheckResponse>, ApiError> {
  let cancel = state.shutdown.child_token();
  let result = state
    .controller
    .check_version_conflict(&draft_id, &cancel)
    .await?;
  Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
  #[serde(default)]
  principal: String,
}

async fn pending_tasks(
  State(state): State<AppState>,
  query: Result<Query<PendingQuery>, QueryRejection>,
) -> Result<Json<PendingTasksResponse>, ApiError> {
  let Query(query) = query?;
  let cancel = state.shutdown.child_token();
  let tasks = state
    .controller
    .get_pending_tasks(&query.principal, &cancel)
    .await?;
  Ok(Json(tasks.into()))
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
  approved: bool,
  comments: Option<String>,
  #[serde(default)]
  principal: String,
}

async fn complete(
  State(state): State<AppState>,
  Path(task_id): Path<String>,
  body: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
  let Json(request) = body?;
  let cancel = state.shutdown.child_token();
  let outcome = state
    .controller
    .complete_approval_task(
      &task_id,
      request.approved,
      request.comments.as_deref(),
      &request.principal,
      &cancel,
    )
    .await?;

  let response = CompleteResponse::from(outcome);
  let status = if response.is_conflict() {
    StatusCode::CONFLICT
  } else {
    StatusCode::OK
  };
  Ok((status, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use axum::body::{Body, to_bytes};
  use axum::http::Request;
  use chrono::Utc;
  use ratify_draft_store::InMemoryDraftStore;
  use ratify_orchestrator::{Adapters, ControllerConfig};
  use ratify_registry::InMemoryResourceRegistry;
  use ratify_types::{Draft, DraftStatus, Fingerprint};
  use ratify_workflow_engine::InMemoryWorkflowEngine;
  use serde_json::{Value, json};
  use tower::ServiceExt;

  use super::*;

  struct Fixture {
    app: Router,
    registry: Arc<InMemoryResourceRegistry>,
    engine: Arc<InMemoryWorkflowEngine>,
  }

  fn fixture() -> Fixture {
    let drafts = Arc::new(InMemoryDraftStore::new());
    let registry = Arc::new(InMemoryResourceRegistry::new());
    let engine = Arc::new(InMemoryWorkflowEngine::new(["alice"]));

    registry.put("plan-1", json!({ "name": "Silver HMO" }), Fingerprint::new("v1"));
    let now = Utc::now();
    drafts.insert(Draft {
      draft_id: "d1".to_string(),
      name: "Silver HMO".to_string(),
      resource_id: Some("plan-1".to_string()),
      content: json!({ "name": "Silver HMO", "copay": 20 }),
      created_by: "carol".to_string(),
      updated_by: "carol".to_string(),
      status: DraftStatus::Draft,
      process_instance_id: None,
      base_version: None,
      created_at: now,
      updated_at: now,
    });

    let controller = ApprovalController::new(
      Adapters {
        drafts,
        registry: registry.clone(),
        engine: engine.clone(),
        completer: engine.clone(),
      },
      ControllerConfig {
        process_key: "benefit-plan-approval".to_string(),
        adapter_timeout: Duration::from_secs(5),
      },
    );

    Fixture {
      app: router(AppState::new(controller, CancellationToken::new())),
      registry,
      engine,
    }
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(body) => {
        request = request.header("content-type", "application/json");
        Body::from(body.to_string())
      }
      None => Body::empty(),
    };

    let response = app
      .clone()
      .oneshot(request.body(body).unwrap())
      .await
      .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn test_health() {
    let f = fixture();
    let (status, body) = call(&f.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
  }

  #[tokio::test]
  async fn test_submit_and_approve() {
    let f = fixture();

    let (status, body) = call(
      &f.app,
      "POST",
      "/drafts/d1/submit",
      Some(json!({ "userId": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["baseVersion"], json!("v1"));

    let (status, body) = call(&f.app, "GET", "/tasks?principal=alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["draftId"], json!("d1"));
    assert_eq!(tasks[0]["draftSummary"]["status"], json!("submitted"));
    let task_id = tasks[0]["taskId"].as_str().unwrap().to_string();

    let (status, body) = call(
      &f.app,
      "POST",
      &format!("/tasks/{}/complete", task_id),
      Some(json!({ "approved": true, "principal": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("approved"));
    assert_eq!(body["resourceId"], json!("plan-1"));
    assert_ne!(body["baseVersion"], json!("v1"));
  }

  #[tokio::test]
  async fn test_conflict_is_reported_with_409() {
    let f = fixture();
    let (_, body) = call(
      &f.app,
      "POST",
      "/drafts/d1/submit",
      Some(json!({ "userId": "carol" })),
    )
    .await;
    let pid = body["processInstanceId"].as_str().unwrap().to_string();
    f.registry.put("plan-1", json!({ "name": "edited" }), Fingerprint::new("v2"));

    let (status, body) = call(&f.app, "GET", "/drafts/d1/conflict", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasConflict"], json!(true));
    assert_eq!(body["conflictType"], json!("MODIFIED"));

    let task_id = f.engine.open_tasks(&pid)[0].clone();
    let (status, body) = call(
      &f.app,
      "POST",
      &format!("/tasks/{}/complete", task_id),
      Some(json!({ "approved": true, "principal": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("version_conflict"));
    assert_eq!(body["currentVersion"], json!("v2"));
    assert_eq!(f.registry.write_attempts(), 0);

    let (status, body) = call(
      &f.app,
      "POST",
      "/drafts/d1/resubmit",
      Some(json!({ "userId": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["baseVersion"], json!("v2"));
  }

  #[tokio::test]
  async fn test_error_statuses() {
    let f = fixture();

    let (status, body) = call(
      &f.app,
      "POST",
      "/drafts/missing/submit",
      Some(json!({ "userId": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
    assert_eq!(body["success"], json!(false));

    let (status, body) = call(&f.app, "POST", "/drafts/d1/submit", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, body) = call(&f.app, "GET", "/tasks", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, body) = call(
      &f.app,
      "POST",
      "/tasks/nope/complete",
      Some(json!({ "principal": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, body) = call(
      &f.app,
      "POST",
      "/drafts/d1/resubmit",
      Some(json!({ "userId": "carol" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("invalid_state"));
  }

  #[test]
  fn test_status_mapping() {
    assert_eq!(status_for("adapter_error"), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for("adapter_timeout"), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(status_for("cancelled"), StatusCode::SERVICE_UNAVAILABLE);
  }
}
