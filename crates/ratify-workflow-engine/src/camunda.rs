use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratify_types::{Task, TaskFilter, Variables};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::variables::{decode, encode};
use crate::{Error, TaskCompleter, WorkflowEngine};

/// Task representation returned by the Camunda REST API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CamundaTask {
  id: String,
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  assignee: Option<String>,
  created: String,
  process_instance_id: String,
}

#[derive(Debug, Deserialize)]
struct ProcessInstance {
  id: String,
}

/// Workflow engine backed by the Camunda 7 REST API.
pub struct CamundaWorkflowEngine {
  client: Client,
  base_url: String,
}

impl CamundaWorkflowEngine {
  /// Create a client for the engine at `base_url`, e.g. `http://host:8080/engine-rest`.
  pub fn new(client: Client, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }

  async fn query_tasks(&self, param: &str, principal: &str) -> Result<Vec<CamundaTask>, Error> {
    let response = self
      .client
      .get(self.url("task"))
      .query(&[(param, principal)])
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(unexpected(response).await);
    }

    Ok(response.json().await?)
  }
}

/// Parse Camunda's timestamp format (`2024-01-23T13:42:42.000+0200`).
fn parse_created(raw: &str) -> Result<DateTime<Utc>, Error> {
  DateTime::parse_from_rfc3339(raw)
    .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::InvalidResponse {
      message: format!("invalid task timestamp '{}': {}", raw, e),
    })
}

fn into_task(raw: CamundaTask, candidate: Option<&str>) -> Result<Task, Error> {
  let candidate_users = match (&raw.assignee, candidate) {
    (None, Some(principal)) => vec![principal.to_string()],
    _ => Vec::new(),
  };

  Ok(Task {
    created: parse_created(&raw.created)?,
    task_id: raw.id,
    name: raw.name.unwrap_or_default(),
    process_instance_id: raw.process_instance_id,
    assignee: raw.assignee,
    candidate_users,
  })
}

/// Camunda reports some missing-entity cases as 400/500 with a message.
fn mentions_missing(body: &str) -> bool {
  let lower = body.to_lowercase();
  lower.contains("cannot find task") || lower.contains("does not exist") || lower.contains("no matching")
}

async fn unexpected(response: Response) -> Error {
  let status = response.status().as_u16();
  let body = response.text().await.unwrap_or_default();
  Error::UnexpectedStatus { status, body }
}

#[async_trait]
impl WorkflowEngine for CamundaWorkflowEngine {
  async fn start_process(&self, process_key: &str, variables: Variables) -> Result<String, Error> {
    let url = self.url(&format!("process-definition/key/{}/start", process_key));
    debug!(url = %url, "engine_start_process");

    let mut body = json!({ "variables": encode(&variables) });
    if let Some(Value::String(draft_id)) = variables.get("draftId") {
      body["businessKey"] = Value::String(draft_id.clone());
    }

    let response = self.client.post(&url).json(&body).send().await?;
    if !response.status().is_success() {
      return Err(unexpected(response).await);
    }

    let instance: ProcessInstance = response.json().await?;
    Ok(instance.id)
  }

  async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, Error> {
    let assigned = self.query_tasks("assignee", &filter.principal).await?;
    let claimable = self.query_tasks("candidateUser", &filter.principal).await?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(assigned.len() + claimable.len());
    for raw in assigned {
      if seen.insert(raw.id.clone()) {
        tasks.push(into_task(raw, None)?);
      }
    }
    for raw in claimable {
      if seen.insert(raw.id.clone()) {
        tasks.push(into_task(raw, Some(&filter.principal))?);
      }
    }

    Ok(tasks)
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, Error> {
    let response = self.client.get(self.url(&format!("task/{}", task_id))).send().await?;

    match response.status() {
      StatusCode::NOT_FOUND => Err(Error::NotFound(task_id.to_string())),
      status if status.is_success() => into_task(response.json().await?, None),
      _ => Err(unexpected(response).await),
    }
  }

  async fn get_task_variables(&self, task_id: &str) -> Result<Variables, Error> {
    let response = self
      .client
      .get(self.url(&format!("task/{}/variables", task_id)))
      .send()
      .await?;

    let status = response.status();
    if status.is_success() {
      let typed: Map<String, Value> = response.json().await?;
      return Ok(decode(typed));
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND || mentions_missing(&body) {
      return Err(Error::NotFound(task_id.to_string()));
    }
    Err(Error::UnexpectedStatus {
      status: status.as_u16(),
      body,
    })
  }

  async fn cancel_process(&self, process_instance_id: &str, reason: &str) -> Result<(), Error> {
    let response = self
      .client
      .delete(self.url(&format!("process-instance/{}", process_instance_id)))
      .query(&[("skipCustomListeners", "true"), ("deleteReason", reason)])
      .send()
      .await?;

    match response.status() {
      StatusCode::NOT_FOUND => Err(Error::NotFound(process_instance_id.to_string())),
      status if status.is_success() => Ok(()),
      _ => Err(unexpected(response).await),
    }
  }
}

#[async_trait]
impl TaskCompleter for CamundaWorkflowEngine {
  async fn complete_task(&self, task_id: &str, variables: Variables) -> Result<(), Error> {
    let url = self.url(&format!("task/{}/complete", task_id));
    debug!(url = %url, "engine_complete_task");

    let response = self
      .client
      .post(&url)
      .json(&json!({ "variables": encode(&variables) }))
      .send()
      .await?;

    let status = response.status();
    if status.is_success() {
      return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND || mentions_missing(&body) {
      return Err(Error::AlreadyCompleted(task_id.to_string()));
    }
    Err(Error::UnexpectedStatus {
      status: status.as_u16(),
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn test_parse_created_camunda_offset() {
    let parsed = parse_created("2024-01-23T13:42:42.000+0200").unwrap();
    assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 23, 11, 42, 42).unwrap());
  }

  #[test]
  fn test_parse_created_rfc3339() {
    let parsed = parse_created("2024-01-23T11:42:42Z").unwrap();
    assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 23, 11, 42, 42).unwrap());
  }

  #[test]
  fn test_mentions_missing() {
    assert!(mentions_missing("Cannot find task with id abc"));
    assert!(mentions_missing("Task with id abc does not exist"));
    assert!(!mentions_missing("database unavailable"));
  }
}
