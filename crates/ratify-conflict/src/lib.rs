//! Ratify Conflict
//!
//! Detects whether the published resource a draft was based on has diverged
//! since the draft recorded its `base_version`.
//!
//! Detection performs at most one registry read and never writes anything,
//! so it can be repeated freely: with unchanged external state, repeated
//! calls return identical results.

use std::sync::Arc;

use ratify_registry::{Error, ResourceRegistry};
use ratify_types::{ConflictResult, Draft, Fingerprint};
use tracing::debug;

/// Classify a base fingerprint against the registry's current one.
///
/// `current` is `None` when the registry reports the resource absent.
/// Fingerprints are compared for equality only.
pub fn classify(base: &Fingerprint, current: Option<Fingerprint>) -> ConflictResult {
  match current {
    None => ConflictResult::deleted(Some(base.clone())),
    Some(current) if &current == base => ConflictResult::none(Some(current)),
    Some(current) => ConflictResult::modified(base.clone(), current),
  }
}

/// Compares drafts against the resource registry.
pub struct ConflictDetector<R: ?Sized> {
  registry: Arc<R>,
}

impl<R: ?Sized> Clone for ConflictDetector<R> {
  fn clone(&self) -> Self {
    Self {
      registry: self.registry.clone(),
    }
  }
}

impl<R: ResourceRegistry + ?Sized> ConflictDetector<R> {
  pub fn new(registry: Arc<R>) -> Self {
    Self { registry }
  }

  /// Detect divergence for a draft.
  ///
  /// Drafts without a resource, or without a recorded base version, have
  /// nothing to diverge from and always yield no conflict. Registry failures
  /// are returned as errors, never as "no conflict".
  pub async fn detect(&self, draft: &Draft) -> Result<ConflictResult, Error> {
    let (Some(resource_id), Some(base)) = (&draft.resource_id, &draft.base_version) else {
      return Ok(ConflictResult::none(draft.base_version.clone()));
    };

    let current = self.registry.current_fingerprint(resource_id).await?;
    let result = classify(base, current);

    debug!(
      draft_id = %draft.draft_id,
      resource_id = %resource_id,
      conflict_type = ?result.conflict_type,
      "conflict_checked"
    );

    Ok(result)
  }
}
