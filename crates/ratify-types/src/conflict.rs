use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Classification of the divergence between a draft's base and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
  None,
  Modified,
  Deleted,
}

/// Outcome of comparing a draft's `base_version` with the registry.
///
/// Build these through [`ConflictResult::none`], [`ConflictResult::modified`]
/// and [`ConflictResult::deleted`] so `has_conflict` always agrees with
/// `conflict_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResult {
  pub has_conflict: bool,
  pub conflict_type: ConflictType,
  pub base_version: Option<Fingerprint>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub current_version: Option<Fingerprint>,
}

impl ConflictResult {
  pub fn none(base_version: Option<Fingerprint>) -> Self {
    Self {
      has_conflict: false,
      conflict_type: ConflictType::None,
      current_version: base_version.clone(),
      base_version,
    }
  }

  pub fn modified(base_version: Fingerprint, current_version: Fingerprint) -> Self {
    Self {
      has_conflict: true,
      conflict_type: ConflictType::Modified,
      base_version: Some(base_version),
      current_version: Some(current_version),
    }
  }

  /// The resource no longer exists; there is no current version.
  pub fn deleted(base_version: Option<Fingerprint>) -> Self {
    Self {
      has_conflict: true,
      conflict_type: ConflictType::Deleted,
      base_version,
      current_version: None,
    }
  }
}
