//! Ratify Draft Store
//!
//! This crate provides the draft repository trait and its implementations.
//! The draft repository owns unapproved edits; the approval controller only
//! reads drafts and requests partial updates to them.
//!
//! Implementations:
//! - [`InMemoryDraftStore`] for tests and single-process use
//! - [`SqliteDraftStore`] persisted through sqlx
//!
//! Callers are expected to be the only writer of a given draft at a time.
//! [`DraftStore::update`] applies a partial update in a single statement so a
//! concurrent writer can never observe a half-applied update.

mod memory;
mod sqlite;

pub use memory::InMemoryDraftStore;
pub use sqlite::SqliteDraftStore;

use async_trait::async_trait;
use ratify_types::{Draft, DraftUpdate, NewDraft};

/// Error type for draft storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested draft was not found.
  #[error("draft not found: {0}")]
  NotFound(String),

  /// A stored row could not be decoded into a draft.
  #[error("corrupt draft '{draft_id}': {message}")]
  Corrupt { draft_id: String, message: String },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for drafts.
#[async_trait]
pub trait DraftStore: Send + Sync {
  /// Get a draft by ID.
  async fn get(&self, draft_id: &str) -> Result<Draft, Error>;

  /// Create a new draft in `draft` status and return its ID.
  async fn create(&self, draft: NewDraft) -> Result<String, Error>;

  /// Apply a partial update and return the updated draft.
  async fn update(&self, draft_id: &str, update: &DraftUpdate) -> Result<Draft, Error>;

  /// Delete a draft.
  async fn delete(&self, draft_id: &str) -> Result<(), Error>;
}

/// Generate a fresh draft ID.
pub(crate) fn new_draft_id() -> String {
  uuid::Uuid::new_v4().to_string()
}
