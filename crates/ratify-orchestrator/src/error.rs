//! Orchestration error types.

use std::fmt;

/// Boxed adapter failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The external system an adapter call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
  DraftStore,
  ResourceRegistry,
  WorkflowEngine,
}

impl fmt::Display for Adapter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Adapter::DraftStore => "draft_store",
      Adapter::ResourceRegistry => "resource_registry",
      Adapter::WorkflowEngine => "workflow_engine",
    })
  }
}

/// Errors returned by the approval controller.
///
/// A detected version conflict is not an error; it is reported as
/// [`CompletionOutcome::Conflict`](crate::CompletionOutcome::Conflict).
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
  /// Malformed input, rejected before any adapter call.
  #[error("invalid request: {message}")]
  Validation { message: String },

  #[error("draft not found: {0}")]
  DraftNotFound(String),

  /// The task does not exist or is no longer open.
  #[error("task not found: {0}")]
  TaskNotFound(String),

  #[error("task '{0}' carries no draft reference")]
  DraftReferenceMissing(String),

  #[error("resource not found: {0}")]
  ResourceNotFound(String),

  /// The draft or task is in a state the operation cannot start from.
  #[error("invalid state: {message}")]
  InvalidState { message: String },

  /// A downstream adapter failed.
  #[error("{adapter} failed: {source}")]
  Adapter {
    adapter: Adapter,
    #[source]
    source: BoxError,
  },

  /// A downstream adapter did not answer within the configured bound.
  #[error("{adapter} timed out")]
  Timeout { adapter: Adapter },

  /// The caller cancelled the operation.
  #[error("operation cancelled")]
  Cancelled,
}

impl OrchestrationError {
  /// Stable machine-readable code callers can branch on.
  pub fn code(&self) -> &'static str {
    match self {
      OrchestrationError::Validation { .. } => "validation_error",
      OrchestrationError::DraftNotFound(_)
      | OrchestrationError::TaskNotFound(_)
      | OrchestrationError::DraftReferenceMissing(_)
      | OrchestrationError::ResourceNotFound(_) => "not_found",
      OrchestrationError::InvalidState { .. } => "invalid_state",
      OrchestrationError::Adapter { .. } => "adapter_error",
      OrchestrationError::Timeout { .. } => "adapter_timeout",
      OrchestrationError::Cancelled => "cancelled",
    }
  }

  pub(crate) fn adapter(adapter: Adapter, source: impl std::error::Error + Send + Sync + 'static) -> Self {
    OrchestrationError::Adapter {
      adapter,
      source: Box::new(source),
    }
  }

  pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
    OrchestrationError::InvalidState {
      message: message.into(),
    }
  }

  pub(crate) fn validation(message: impl Into<String>) -> Self {
    OrchestrationError::Validation {
      message: message.into(),
    }
  }
}
