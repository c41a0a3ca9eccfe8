use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process variables attached to a process instance or a task completion.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// A user task as reported by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub task_id: String,
  pub name: String,
  pub process_instance_id: String,
  pub assignee: Option<String>,
  /// Principals allowed to claim the task when it is unassigned.
  #[serde(default)]
  pub candidate_users: Vec<String>,
  pub created: DateTime<Utc>,
}

impl Task {
  /// Whether `principal` is the assignee or may claim the task.
  pub fn is_visible_to(&self, principal: &str) -> bool {
    match &self.assignee {
      Some(assignee) => assignee == principal,
      None => self.candidate_users.iter().any(|u| u == principal),
    }
  }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
  /// Return tasks assigned to, or claimable by, this principal.
  pub principal: String,
}

impl TaskFilter {
  pub fn for_principal(principal: impl Into<String>) -> Self {
    Self {
      principal: principal.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(assignee: Option<&str>, candidates: &[&str]) -> Task {
    Task {
      task_id: "t1".to_string(),
      name: "Review".to_string(),
      process_instance_id: "p1".to_string(),
      assignee: assignee.map(str::to_string),
      candidate_users: candidates.iter().map(|c| c.to_string()).collect(),
      created: Utc::now(),
    }
  }

  #[test]
  fn test_assigned_task_only_visible_to_assignee() {
    let t = task(Some("alice"), &["bob"]);
    assert!(t.is_visible_to("alice"));
    assert!(!t.is_visible_to("bob"));
  }

  #[test]
  fn test_unassigned_task_visible_to_candidates() {
    let t = task(None, &["bob", "carol"]);
    assert!(t.is_visible_to("carol"));
    assert!(!t.is_visible_to("alice"));
  }
}
