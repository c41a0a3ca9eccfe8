use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use ratify_types::{Draft, DraftStatus, DraftUpdate, NewDraft};

use crate::{DraftStore, Error, new_draft_id};

/// In-memory draft store.
///
/// Suitable for tests or a single coordinator process.
#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
  drafts: RwLock<HashMap<String, Draft>>,
}

impl InMemoryDraftStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a draft as-is, replacing any draft with the same ID.
  pub fn insert(&self, draft: Draft) {
    let mut drafts = self.drafts.write().unwrap_or_else(PoisonError::into_inner);
    drafts.insert(draft.draft_id.clone(), draft);
  }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
  async fn get(&self, draft_id: &str) -> Result<Draft, Error> {
    let drafts = self.drafts.read().unwrap_or_else(PoisonError::into_inner);
    drafts
      .get(draft_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(draft_id.to_string()))
  }

  async fn create(&self, draft: NewDraft) -> Result<String, Error> {
    let now = Utc::now();
    let draft_id = new_draft_id();
    self.insert(Draft {
      draft_id: draft_id.clone(),
      name: draft.name,
      resource_id: draft.resource_id,
      content: draft.content,
      updated_by: draft.created_by.clone(),
      created_by: draft.created_by,
      status: DraftStatus::Draft,
      process_instance_id: None,
      base_version: None,
      created_at: now,
      updated_at: now,
    });
    Ok(draft_id)
  }

  async fn update(&self, draft_id: &str, update: &DraftUpdate) -> Result<Draft, Error> {
    let mut drafts = self.drafts.write().unwrap_or_else(PoisonError::into_inner);
    let draft = drafts
      .get_mut(draft_id)
      .ok_or_else(|| Error::NotFound(draft_id.to_string()))?;
    draft.apply(update);
    draft.updated_at = Utc::now();
    Ok(draft.clone())
  }

  async fn delete(&self, draft_id: &str) -> Result<(), Error> {
    let mut drafts = self.drafts.write().unwrap_or_else(PoisonError::into_inner);
    drafts
      .remove(draft_id)
      .map(|_| ())
      .ok_or_else(|| Error::NotFound(draft_id.to_string()))
  }
}
