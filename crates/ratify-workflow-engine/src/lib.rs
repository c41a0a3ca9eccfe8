//! Ratify Workflow Engine
//!
//! This crate provides narrow capability traits over an external workflow
//! engine, plus an in-memory engine for tests and a Camunda-style REST client.
//!
//! The engine is the source of truth for task state. In particular, whether a
//! task has already been completed is decided by the engine: completing a
//! task that is no longer open fails with [`Error::AlreadyCompleted`] (or
//! [`Error::NotFound`] when the engine cannot tell the two apart) and the
//! caller never tracks completion itself.

mod camunda;
mod memory;
mod variables;

pub use camunda::CamundaWorkflowEngine;
pub use memory::{Completion, InMemoryWorkflowEngine};

use async_trait::async_trait;
use ratify_types::{Task, TaskFilter, Variables};

/// Error type for workflow engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The task or process instance does not exist (or is no longer open).
  #[error("not found: {0}")]
  NotFound(String),

  /// The task was completed by someone else first.
  #[error("task already completed: {0}")]
  AlreadyCompleted(String),

  /// The engine answered with a status we do not handle.
  #[error("workflow engine returned {status}: {body}")]
  UnexpectedStatus { status: u16, body: String },

  /// The engine answered with a body we could not interpret.
  #[error("invalid workflow engine response: {message}")]
  InvalidResponse { message: String },

  /// The request never completed.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
}

/// Process and task operations of a workflow engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
  /// Start a process instance and return its ID.
  async fn start_process(&self, process_key: &str, variables: Variables) -> Result<String, Error>;

  /// List open tasks matching the filter.
  async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, Error>;

  /// Get an open task by ID.
  async fn get_task(&self, task_id: &str) -> Result<Task, Error>;

  /// Get the variables visible to an open task.
  async fn get_task_variables(&self, task_id: &str) -> Result<Variables, Error>;

  /// Cancel a running process instance together with its open tasks.
  async fn cancel_process(&self, process_instance_id: &str, reason: &str) -> Result<(), Error>;
}

/// Completes tasks with a decision payload.
///
/// Implementations must reject a completion for a task that is no longer
/// open instead of silently accepting it twice.
#[async_trait]
pub trait TaskCompleter: Send + Sync {
  async fn complete_task(&self, task_id: &str, variables: Variables) -> Result<(), Error>;
}
