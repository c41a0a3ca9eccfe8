//! Wire shapes for operation results.
//!
//! Every response carries a `success` flag. Failures carry a stable `error`
//! code and a human-readable `message`.

use ratify_types::{ConflictResult, ConflictType, DraftStatus, Fingerprint};
use serde::Serialize;

use crate::controller::{CompletionOutcome, PendingTask, Submission};
use crate::error::OrchestrationError;

/// Error code reported for a detected version conflict.
pub const VERSION_CONFLICT: &str = "version_conflict";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
  pub success: bool,
  pub process_instance_id: String,
  pub base_version: Option<Fingerprint>,
}

impl From<Submission> for SubmitResponse {
  fn from(submission: Submission) -> Self {
    Self {
      success: true,
      process_instance_id: submission.process_instance_id,
      base_version: submission.base_version,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingTasksResponse {
  pub success: bool,
  pub tasks: Vec<PendingTask>,
}

impl From<Vec<PendingTask>> for PendingTasksResponse {
  fn from(tasks: Vec<PendingTask>) -> Self {
    Self {
      success: true,
      tasks,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompleteResponse {
  #[serde(rename_all = "camelCase")]
  Completed {
    success: bool,
    status: DraftStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_version: Option<Fingerprint>,
  },
  #[serde(rename_all = "camelCase")]
  Conflict {
    success: bool,
    error: &'static str,
    conflict_type: ConflictType,
    base_version: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_version: Option<Fingerprint>,
  },
}

impl CompleteResponse {
  pub fn is_conflict(&self) -> bool {
    matches!(self, CompleteResponse::Conflict { .. })
  }
}

impl From<CompletionOutcome> for CompleteResponse {
  fn from(outcome: CompletionOutcome) -> Self {
    match outcome {
      CompletionOutcome::Completed(decision) => CompleteResponse::Completed {
        success: true,
        status: decision.status,
        resource_id: decision.resource_id,
        base_version: decision.base_version,
      },
      CompletionOutcome::Conflict(conflict) => CompleteResponse::Conflict {
        success: false,
        error: VERSION_CONFLICT,
        conflict_type: conflict.conflict_type,
        base_version: conflict.base_version,
        current_version: conflict.current_version,
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictCheckResponse {
  pub success: bool,
  #[serde(flatten)]
  pub result: ConflictResult,
}

impl From<ConflictResult> for ConflictCheckResponse {
  fn from(result: ConflictResult) -> Self {
    Self {
      success: true,
      result,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
  pub success: bool,
  pub error: &'static str,
  pub message: String,
}

impl From<&OrchestrationError> for ErrorResponse {
  fn from(err: &OrchestrationError) -> Self {
    Self {
      success: false,
      error: err.code(),
      message: err.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::controller::Decision;

  #[test]
  fn test_conflict_response_shape() {
    let outcome = CompletionOutcome::Conflict(ConflictResult::modified(
      Fingerprint::new("v1"),
      Fingerprint::new("v2"),
    ));
    let response = CompleteResponse::from(outcome);
    assert!(response.is_conflict());
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({
        "success": false,
        "error": "version_conflict",
        "conflictType": "MODIFIED",
        "baseVersion": "v1",
        "currentVersion": "v2"
      })
    );
  }

  #[test]
  fn test_deleted_conflict_omits_current_version() {
    let outcome = CompletionOutcome::Conflict(ConflictResult::deleted(Some(Fingerprint::new("v1"))));
    let value = serde_json::to_value(CompleteResponse::from(outcome)).unwrap();
    assert_eq!(value["conflictType"], "DELETED");
    assert!(value.get("currentVersion").is_none());
  }

  #[test]
  fn test_completed_response_shape() {
    let outcome = CompletionOutcome::Completed(Decision {
      status: DraftStatus::Approved,
      resource_id: Some("plan-1".to_string()),
      base_version: Some(Fingerprint::new("v2")),
    });
    assert_eq!(
      serde_json::to_value(CompleteResponse::from(outcome)).unwrap(),
      json!({
        "success": true,
        "status": "approved",
        "resourceId": "plan-1",
        "baseVersion": "v2"
      })
    );
  }

  #[test]
  fn test_conflict_check_flattens_result() {
    let response = ConflictCheckResponse::from(ConflictResult::none(None));
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({
        "success": true,
        "hasConflict": false,
        "conflictType": "NONE",
        "baseVersion": null
      })
    );
  }

  #[test]
  fn test_error_response_carries_code() {
    let err = OrchestrationError::TaskNotFound("t-1".to_string());
    let response = ErrorResponse::from(&err);
    assert_eq!(response.error, "not_found");
    assert_eq!(response.message, "task not found: t-1");
    assert!(!response.success);
  }
}
