use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use ratify_types::{Task, TaskFilter, Variables};

use crate::{Error, TaskCompleter, WorkflowEngine};

/// A recorded task completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
  pub task_id: String,
  pub process_instance_id: String,
  pub variables: Variables,
}

#[derive(Debug)]
struct OpenTask {
  task: Task,
  variables: Variables,
}

#[derive(Debug, Default)]
struct State {
  /// process_instance_id -> process key, for every process ever started.
  processes: HashMap<String, String>,
  open: HashMap<String, OpenTask>,
  completed: HashSet<String>,
  cancelled: HashSet<String>,
  completions: Vec<Completion>,
}

/// In-memory workflow engine.
///
/// Every started process gets a single review task, claimable by the
/// configured approvers. Completing the task ends the process.
#[derive(Debug)]
pub struct InMemoryWorkflowEngine {
  approvers: Vec<String>,
  task_name: String,
  state: Mutex<State>,
}

impl InMemoryWorkflowEngine {
  /// Create an engine whose review tasks can be claimed by `approvers`.
  pub fn new(approvers: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      approvers: approvers.into_iter().map(Into::into).collect(),
      task_name: "Review benefit plan".to_string(),
      state: Mutex::new(State::default()),
    }
  }

  fn state(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Assign an open task to a single principal.
  pub fn assign(&self, task_id: &str, assignee: &str) -> Result<(), Error> {
    let mut state = self.state();
    let open = state
      .open
      .get_mut(task_id)
      .ok_or_else(|| Error::NotFound(task_id.to_string()))?;
    open.task.assignee = Some(assignee.to_string());
    Ok(())
  }

  /// Every completion accepted so far, in order.
  pub fn completions(&self) -> Vec<Completion> {
    self.state().completions.clone()
  }

  /// Number of processes started so far.
  pub fn started_processes(&self) -> usize {
    self.state().processes.len()
  }

  /// IDs of open tasks belonging to a process instance.
  pub fn open_tasks(&self, process_instance_id: &str) -> Vec<String> {
    let state = self.state();
    let mut ids: Vec<String> = state
      .open
      .values()
      .filter(|o| o.task.process_instance_id == process_instance_id)
      .map(|o| o.task.task_id.clone())
      .collect();
    ids.sort();
    ids
  }

  /// Whether a process instance was cancelled.
  pub fn is_cancelled(&self, process_instance_id: &str) -> bool {
    self.state().cancelled.contains(process_instance_id)
  }
}

#[async_trait]
impl WorkflowEngine for InMemoryWorkflowEngine {
  async fn start_process(&self, process_key: &str, variables: Variables) -> Result<String, Error> {
    let process_instance_id = uuid::Uuid::new_v4().to_string();
    let task_id = uuid::Uuid::new_v4().to_string();

    let task = Task {
      task_id: task_id.clone(),
      name: self.task_name.clone(),
      process_instance_id: process_instance_id.clone(),
      assignee: None,
      candidate_users: self.approvers.clone(),
      created: Utc::now(),
    };

    let mut state = self.state();
    state
      .processes
      .insert(process_instance_id.clone(), process_key.to_string());
    state.open.insert(task_id, OpenTask { task, variables });

    Ok(process_instance_id)
  }

  async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, Error> {
    let state = self.state();
    let mut tasks: Vec<Task> = state
      .open
      .values()
      .filter(|o| o.task.is_visible_to(&filter.principal))
      .map(|o| o.task.clone())
      .collect();
    tasks.sort_by(|a, b| a.created.cmp(&b.created));
    Ok(tasks)
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, Error> {
    let state = self.state();
    state
      .open
      .get(task_id)
      .map(|o| o.task.clone())
      .ok_or_else(|| Error::NotFound(task_id.to_string()))
  }

  async fn get_task_variables(&self, task_id: &str) -> Result<Variables, Error> {
    let state = self.state();
    state
      .open
      .get(task_id)
      .map(|o| o.variables.clone())
      .ok_or_else(|| Error::NotFound(task_id.to_string()))
  }

  async fn cancel_process(&self, process_instance_id: &str, _reason: &str) -> Result<(), Error> {
    let mut state = self.state();
    if !state.processes.contains_key(process_instance_id)
      || state.cancelled.contains(process_instance_id)
    {
      return Err(Error::NotFound(process_instance_id.to_string()));
    }

    state
      .open
      .retain(|_, o| o.task.process_instance_id != process_instance_id);
    state.cancelled.insert(process_instance_id.to_string());
    Ok(())
  }
}

#[async_trait]
impl TaskCompleter for InMemoryWorkflowEngine {
  async fn complete_task(&self, task_id: &str, variables: Variables) -> Result<(), Error> {
    let mut state = self.state();
    if state.completed.contains(task_id) {
      return Err(Error::AlreadyCompleted(task_id.to_string()));
    }

    let open = state
      .open
      .remove(task_id)
      .ok_or_else(|| Error::NotFound(task_id.to_string()))?;

    state.completed.insert(task_id.to_string());
    state.completions.push(Completion {
      task_id: task_id.to_string(),
      process_instance_id: open.task.process_instance_id,
      variables,
    });
    Ok(())
  }
}
