//! Tests for CamundaWorkflowEngine against a mock engine.

use ratify_types::{TaskFilter, Variables};
use ratify_workflow_engine::{CamundaWorkflowEngine, Error, TaskCompleter, WorkflowEngine};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(server: &MockServer) -> CamundaWorkflowEngine {
  CamundaWorkflowEngine::new(reqwest::Client::new(), format!("{}/engine-rest", server.uri()))
}

#[tokio::test]
async fn test_start_process_sends_typed_variables() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/engine-rest/process-definition/key/benefit-plan-approval/start"))
    .and(body_partial_json(json!({
      "businessKey": "d1",
      "variables": { "draftId": { "value": "d1", "type": "String" } }
    })))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "proc-1" })))
    .expect(1)
    .mount(&server)
    .await;

  let mut variables = Variables::new();
  variables.insert("draftId".to_string(), json!("d1"));

  let pid = engine(&server)
    .start_process("benefit-plan-approval", variables)
    .await
    .unwrap();
  assert_eq!(pid, "proc-1");
}

#[tokio::test]
async fn test_list_tasks_merges_assigned_and_claimable() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/engine-rest/task"))
    .and(query_param("assignee", "bob"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
      { "id": "t1", "name": "Review", "assignee": "bob",
        "created": "2024-01-23T13:42:42.000+0200", "processInstanceId": "p1" }
    ])))
    .mount(&server)
    .await;
  Mock::given(method("GET"))
    .and(path("/engine-rest/task"))
    .and(query_param("candidateUser", "bob"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
      { "id": "t1", "name": "Review", "assignee": "bob",
        "created": "2024-01-23T13:42:42.000+0200", "processInstanceId": "p1" },
      { "id": "t2", "name": "Review", "assignee": null,
        "created": "2024-01-24T09:00:00.000+0000", "processInstanceId": "p2" }
    ])))
    .mount(&server)
    .await;

  let tasks = engine(&server)
    .list_tasks(&TaskFilter::for_principal("bob"))
    .await
    .unwrap();

  assert_eq!(tasks.len(), 2);
  assert_eq!(tasks[0].assignee.as_deref(), Some("bob"));
  assert_eq!(tasks[1].task_id, "t2");
  assert_eq!(tasks[1].candidate_users, vec!["bob".to_string()]);
}

#[tokio::test]
async fn test_get_task_variables_decodes() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/engine-rest/task/t1/variables"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "draftId": { "value": "d1", "type": "String", "valueInfo": {} }
    })))
    .mount(&server)
    .await;

  let variables = engine(&server).get_task_variables("t1").await.unwrap();
  assert_eq!(variables["draftId"], json!("d1"));
}

#[tokio::test]
async fn test_missing_task_is_not_found() {
  let server = MockServer::start().await;
  Mock::given(method("GET"))
    .and(path("/engine-rest/task/gone"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let result = engine(&server).get_task("gone").await;
  assert!(matches!(result, Err(Error::NotFound(id)) if id == "gone"));
}

#[tokio::test]
async fn test_complete_missing_task_is_already_completed() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/engine-rest/task/t1/complete"))
    .respond_with(ResponseTemplate::new(500).set_body_json(json!({
      "type": "RestException",
      "message": "Cannot find task with id t1: task is null"
    })))
    .mount(&server)
    .await;

  let result = engine(&server).complete_task("t1", Variables::new()).await;
  assert!(matches!(result, Err(Error::AlreadyCompleted(_))));
}

#[tokio::test]
async fn test_complete_task_succeeds_on_no_content() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/engine-rest/task/t1/complete"))
    .and(body_partial_json(json!({
      "variables": { "approved": { "value": false, "type": "Boolean" } }
    })))
    .respond_with(ResponseTemplate::new(204))
    .expect(1)
    .mount(&server)
    .await;

  let mut variables = Variables::new();
  variables.insert("approved".to_string(), json!(false));
  engine(&server).complete_task("t1", variables).await.unwrap();
}

#[tokio::test]
async fn test_cancel_process() {
  let server = MockServer::start().await;
  Mock::given(method("DELETE"))
    .and(path("/engine-rest/process-instance/p1"))
    .and(query_param("deleteReason", "rebased"))
    .respond_with(ResponseTemplate::new(204))
    .mount(&server)
    .await;
  Mock::given(method("DELETE"))
    .and(path("/engine-rest/process-instance/p2"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&server)
    .await;

  let engine = engine(&server);
  engine.cancel_process("p1", "rebased").await.unwrap();
  assert!(matches!(
    engine.cancel_process("p2", "rebased").await,
    Err(Error::NotFound(_))
  ));
}
