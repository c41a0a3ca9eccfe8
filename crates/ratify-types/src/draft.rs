use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Lifecycle status of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
  Draft,
  Submitted,
  Approved,
  Rejected,
}

impl DraftStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DraftStatus::Draft => "draft",
      DraftStatus::Submitted => "submitted",
      DraftStatus::Approved => "approved",
      DraftStatus::Rejected => "rejected",
    }
  }

  /// Parse the storage representation produced by [`DraftStatus::as_str`].
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "draft" => Some(DraftStatus::Draft),
      "submitted" => Some(DraftStatus::Submitted),
      "approved" => Some(DraftStatus::Approved),
      "rejected" => Some(DraftStatus::Rejected),
      _ => None,
    }
  }
}

/// An unapproved candidate record awaiting promotion to the resource registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
  pub draft_id: String,
  pub name: String,
  /// Null until the draft is first published.
  pub resource_id: Option<String>,
  pub content: serde_json::Value,
  pub created_by: String,
  pub updated_by: String,
  pub status: DraftStatus,
  pub process_instance_id: Option<String>,
  /// Resource revision the draft content was last known to be compatible with.
  pub base_version: Option<Fingerprint>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Draft {
  /// Whether an approval process is still running for this draft.
  pub fn has_outstanding_process(&self) -> bool {
    self.status == DraftStatus::Submitted && self.process_instance_id.is_some()
  }

  pub fn summary(&self) -> DraftSummary {
    DraftSummary {
      name: self.name.clone(),
      resource_id: self.resource_id.clone(),
      status: self.status,
    }
  }

  /// Apply a partial update in place.
  pub fn apply(&mut self, update: &DraftUpdate) {
    if update.detach_resource {
      self.resource_id = None;
      self.base_version = None;
    }
    if let Some(status) = update.status {
      self.status = status;
    }
    if let Some(process_instance_id) = &update.process_instance_id {
      self.process_instance_id = Some(process_instance_id.clone());
    }
    if let Some(base_version) = &update.base_version {
      self.base_version = Some(base_version.clone());
    }
    if let Some(resource_id) = &update.resource_id {
      self.resource_id = Some(resource_id.clone());
    }
    if let Some(content) = &update.content {
      self.content = content.clone();
    }
    if let Some(updated_by) = &update.updated_by {
      self.updated_by = updated_by.clone();
    }
  }
}

/// Fields shown to approvers next to a pending task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
  pub name: String,
  pub resource_id: Option<String>,
  pub status: DraftStatus,
}

/// Input for creating a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDraft {
  pub name: String,
  /// Set when the draft edits an already-published resource.
  #[serde(default)]
  pub resource_id: Option<String>,
  pub content: serde_json::Value,
  pub created_by: String,
}

/// Partial update of a draft. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
  pub status: Option<DraftStatus>,
  pub process_instance_id: Option<String>,
  pub base_version: Option<Fingerprint>,
  pub resource_id: Option<String>,
  pub content: Option<serde_json::Value>,
  pub updated_by: Option<String>,
  /// Clear `resource_id` and `base_version` before applying the other fields.
  #[serde(default)]
  pub detach_resource: bool,
}
