//! Ratify Registry
//!
//! This crate provides the resource registry trait and implementations. The
//! resource registry holds the authoritative, published record and stamps
//! every write with a new [`Fingerprint`].
//!
//! Absence is meaningful: a resource that does not exist is reported as
//! [`Error::NotFound`], never as some sentinel fingerprint.

mod fhir;
mod memory;

pub use fhir::FhirResourceRegistry;
pub use memory::InMemoryResourceRegistry;

use async_trait::async_trait;
use ratify_types::{Fingerprint, Resource};

/// Error type for resource registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested resource does not exist.
  #[error("resource not found: {0}")]
  NotFound(String),

  /// An optimistic update was rejected because the resource moved on.
  #[error("resource '{resource_id}' is no longer at version {expected}")]
  FingerprintMismatch {
    resource_id: String,
    expected: Fingerprint,
  },

  /// The registry answered with a status we do not handle.
  #[error("registry returned {status}: {body}")]
  UnexpectedStatus { status: u16, body: String },

  /// The registry answered with a body we could not interpret.
  #[error("invalid registry response: {message}")]
  InvalidResponse { message: String },

  /// The request never completed.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

/// A resource revision produced by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
  pub resource_id: String,
  pub fingerprint: Fingerprint,
}

/// Storage trait for published resources.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
  /// Get the current revision of a resource.
  async fn get(&self, resource_id: &str) -> Result<Resource, Error>;

  /// Create a new resource.
  async fn create(&self, content: &serde_json::Value) -> Result<Revision, Error>;

  /// Replace a resource's content, provided it is still at `expected`.
  async fn update(
    &self,
    resource_id: &str,
    content: &serde_json::Value,
    expected: &Fingerprint,
  ) -> Result<Revision, Error>;

  /// The current fingerprint of a resource, or `None` if it does not exist.
  async fn current_fingerprint(&self, resource_id: &str) -> Result<Option<Fingerprint>, Error> {
    match self.get(resource_id).await {
      Ok(resource) => Ok(Some(resource.fingerprint)),
      Err(Error::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }
}
