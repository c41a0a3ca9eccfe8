//! The approval controller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ratify_conflict::ConflictDetector;
use ratify_draft_store::DraftStore;
use ratify_registry::{ResourceRegistry, Revision};
use ratify_types::{
  ConflictResult, Draft, DraftStatus, DraftSummary, DraftUpdate, Fingerprint, TaskFilter, Variables,
};
use ratify_workflow_engine::{TaskCompleter, WorkflowEngine};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{Adapter, OrchestrationError};
use crate::guard::bounded;

/// Process variable carrying the draft reference.
pub const DRAFT_ID_VARIABLE: &str = "draftId";

/// Configuration for the approval controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
  /// Process definition started for each submission.
  pub process_key: String,
  /// Upper bound for every single adapter call.
  pub adapter_timeout: Duration,
}

/// The external systems the controller composes.
///
/// The workflow engine is split into two capabilities so task completion can
/// be supplied, and faked, independently of process and task queries.
#[derive(Clone)]
pub struct Adapters {
  pub drafts: Arc<dyn DraftStore>,
  pub registry: Arc<dyn ResourceRegistry>,
  pub engine: Arc<dyn WorkflowEngine>,
  pub completer: Arc<dyn TaskCompleter>,
}

/// Result of starting an approval process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
  pub process_instance_id: String,
  /// `None` for drafts that will create a new resource.
  pub base_version: Option<Fingerprint>,
}

/// A task awaiting a decision, enriched with its draft when one resolves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
  pub task_id: String,
  pub name: String,
  pub process_instance_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub draft_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub draft_summary: Option<DraftSummary>,
  pub created: DateTime<Utc>,
  pub assignee: Option<String>,
}

/// A decision that reached the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
  pub status: DraftStatus,
  pub resource_id: Option<String>,
  pub base_version: Option<Fingerprint>,
}

/// Outcome of completing an approval task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
  /// The decision was forwarded and the draft updated.
  Completed(Decision),
  /// The published resource diverged; nothing was forwarded or written and
  /// the task is still open.
  Conflict(ConflictResult),
}

/// Stateless approval orchestration.
///
/// Holds no state between calls: every operation re-reads what it needs from
/// the draft store, the resource registry and the workflow engine. Draft
/// writes always come last, after the engine or registry call they depend on
/// has succeeded, so a failed or cancelled call leaves the draft untouched.
#[derive(Clone)]
pub struct ApprovalController {
  adapters: Adapters,
  detector: ConflictDetector<dyn ResourceRegistry>,
  config: ControllerConfig,
}

impl ApprovalController {
  pub fn new(adapters: Adapters, config: ControllerConfig) -> Self {
    Self {
      detector: ConflictDetector::new(adapters.registry.clone()),
      adapters,
      config,
    }
  }

  /// Start approval for a draft.
  #[instrument(name = "submit_for_approval", skip(self, cancel))]
  pub async fn submit_for_approval(
    &self,
    draft_id: &str,
    user_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Submission, OrchestrationError> {
    require("draftId", draft_id)?;
    require("userId", user_id)?;

    let draft = self.load_draft(draft_id, cancel).await?;
    if draft.has_outstanding_process() {
      return Err(OrchestrationError::invalid_state(format!(
        "draft '{}' already has an outstanding approval process",
        draft_id
      )));
    }
    if draft.status != DraftStatus::Draft {
      return Err(OrchestrationError::invalid_state(format!(
        "cannot submit a draft in '{}' status",
        draft.status.as_str()
      )));
    }

    let submission = self.start_approval(&draft, user_id, false, cancel).await?;

    info!(
      draft_id = %draft_id,
      process_instance_id = %submission.process_instance_id,
      "approval_submitted"
    );
    Ok(submission)
  }

  /// List tasks assigned to or claimable by `principal`.
  ///
  /// Enrichment is best effort: a task whose draft cannot be resolved is
  /// still returned, just without a summary.
  #[instrument(name = "get_pending_tasks", skip(self, cancel))]
  pub async fn get_pending_tasks(
    &self,
    principal: &str,
    cancel: &CancellationToken,
  ) -> Result<Vec<PendingTask>, OrchestrationError> {
    require("principal", principal)?;

    let filter = TaskFilter::for_principal(principal);
    let tasks = self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self.adapters.engine.list_tasks(&filter),
      )
      .await?
      .map_err(|e| OrchestrationError::adapter(Adapter::WorkflowEngine, e))?;

    let enriched = futures::future::join_all(tasks.into_iter().map(|task| async move {
      let variables = match self
        .call(
          Adapter::WorkflowEngine,
          cancel,
          self.adapters.engine.get_task_variables(&task.task_id),
        )
        .await
      {
        Ok(Ok(variables)) => Some(variables),
        // Completed between listing and lookup.
        Ok(Err(ratify_workflow_engine::Error::NotFound(_))) => return Ok(None),
        Ok(Err(e)) => {
          warn!(task_id = %task.task_id, error = %e, "task_variables_unavailable");
          None
        }
        Err(OrchestrationError::Cancelled) => return Err(OrchestrationError::Cancelled),
        Err(e) => {
          warn!(task_id = %task.task_id, error = %e, "task_variables_unavailable");
          None
        }
      };

      let draft_id = variables.as_ref().and_then(draft_reference);
      let draft_summary = match &draft_id {
        Some(draft_id) => self.summarize(draft_id, cancel).await?,
        None => None,
      };

      Ok::<_, OrchestrationError>(Some(PendingTask {
        task_id: task.task_id,
        name: task.name,
        process_instance_id: task.process_instance_id,
        draft_id,
        draft_summary,
        created: task.created,
        assignee: task.assignee,
      }))
    }))
    .await;

    let mut pending = Vec::with_capacity(enriched.len());
    for task in enriched {
      if let Some(task) = task? {
        pending.push(task);
      }
    }
    Ok(pending)
  }

  /// Record a decision on an approval task.
  ///
  /// The published resource is re-validated immediately before anything is
  /// forwarded. On divergence the task is left open and the conflict is
  /// returned instead.
  #[instrument(name = "complete_approval_task", skip(self, comments, cancel))]
  pub async fn complete_approval_task(
    &self,
    task_id: &str,
    approved: bool,
    comments: Option<&str>,
    principal: &str,
    cancel: &CancellationToken,
  ) -> Result<CompletionOutcome, OrchestrationError> {
    require("taskId", task_id)?;
    require("principal", principal)?;

    let task = match self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self.adapters.engine.get_task(task_id),
      )
      .await?
    {
      Ok(task) => task,
      Err(ratify_workflow_engine::Error::NotFound(_)) => {
        return Err(OrchestrationError::TaskNotFound(task_id.to_string()));
      }
      Err(e) => return Err(OrchestrationError::adapter(Adapter::WorkflowEngine, e)),
    };

    let variables = match self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self.adapters.engine.get_task_variables(task_id),
      )
      .await?
    {
      Ok(variables) => variables,
      Err(ratify_workflow_engine::Error::NotFound(_)) => {
        return Err(OrchestrationError::TaskNotFound(task_id.to_string()));
      }
      Err(e) => return Err(OrchestrationError::adapter(Adapter::WorkflowEngine, e)),
    };

    let draft_id = draft_reference(&variables)
      .ok_or_else(|| OrchestrationError::DraftReferenceMissing(task_id.to_string()))?;
    let draft = self.load_draft(&draft_id, cancel).await?;

    if draft.status != DraftStatus::Submitted {
      return Err(OrchestrationError::invalid_state(format!(
        "draft '{}' is '{}', not awaiting approval",
        draft_id,
        draft.status.as_str()
      )));
    }
    if draft.process_instance_id.as_deref() != Some(task.process_instance_id.as_str()) {
      return Err(OrchestrationError::invalid_state(format!(
        "task '{}' belongs to a superseded approval process of draft '{}'",
        task_id, draft_id
      )));
    }

    let conflict = self.detect(&draft, cancel).await?;
    if conflict.has_conflict {
      warn!(
        draft_id = %draft_id,
        task_id = %task_id,
        conflict_type = ?conflict.conflict_type,
        "version_conflict_detected"
      );
      return Ok(CompletionOutcome::Conflict(conflict));
    }

    if approved {
      self
        .approve(&draft, task_id, comments, principal, cancel)
        .await
    } else {
      self.reject(&draft, task_id, comments, principal, cancel).await
    }
  }

  /// Compare a draft's base version with the registry, without side effects.
  #[instrument(name = "check_version_conflict", skip(self, cancel))]
  pub async fn check_version_conflict(
    &self,
    draft_id: &str,
    cancel: &CancellationToken,
  ) -> Result<ConflictResult, OrchestrationError> {
    require("draftId", draft_id)?;

    let draft = self.load_draft(draft_id, cancel).await?;
    self.detect(&draft, cancel).await
  }

  /// Rebase a rejected or conflicted draft onto the current resource and
  /// restart approval.
  ///
  /// No content merge is attempted. If the resource was deleted, the draft is
  /// detached from it and its approval will publish a new resource.
  #[instrument(name = "resubmit_with_updated_version", skip(self, cancel))]
  pub async fn resubmit_with_updated_version(
    &self,
    draft_id: &str,
    user_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Submission, OrchestrationError> {
    require("draftId", draft_id)?;
    require("userId", user_id)?;

    let draft = self.load_draft(draft_id, cancel).await?;
    match draft.status {
      DraftStatus::Rejected => {}
      DraftStatus::Submitted => {
        let conflict = self.detect(&draft, cancel).await?;
        if !conflict.has_conflict {
          return Err(OrchestrationError::invalid_state(format!(
            "draft '{}' is awaiting approval and has no version conflict",
            draft_id
          )));
        }
        if let Some(process_instance_id) = &draft.process_instance_id {
          self.cancel_stale_process(process_instance_id, cancel).await?;
        }
      }
      DraftStatus::Draft | DraftStatus::Approved => {
        return Err(OrchestrationError::invalid_state(format!(
          "cannot resubmit a draft in '{}' status",
          draft.status.as_str()
        )));
      }
    }

    let submission = self.start_approval(&draft, user_id, true, cancel).await?;

    info!(
      draft_id = %draft_id,
      process_instance_id = %submission.process_instance_id,
      base_version = ?submission.base_version,
      "draft_resubmitted"
    );
    Ok(submission)
  }

  /// Publish the draft, then forward the approval, then mark the draft.
  async fn approve(
    &self,
    draft: &Draft,
    task_id: &str,
    comments: Option<&str>,
    principal: &str,
    cancel: &CancellationToken,
  ) -> Result<CompletionOutcome, OrchestrationError> {
    let revision = match self.publish(draft, cancel).await? {
      Ok(revision) => revision,
      Err(conflict) => return Ok(CompletionOutcome::Conflict(conflict)),
    };

    info!(
      draft_id = %draft.draft_id,
      resource_id = %revision.resource_id,
      fingerprint = %revision.fingerprint,
      "resource_published"
    );

    let mut variables = decision_variables(true, comments, principal);
    variables.insert("resourceId".to_string(), json!(revision.resource_id));
    variables.insert(
      "publishedVersion".to_string(),
      json!(revision.fingerprint.as_str()),
    );

    if let Err(e) = self.complete_task(task_id, variables, cancel).await {
      error!(
        draft_id = %draft.draft_id,
        task_id = %task_id,
        resource_id = %revision.resource_id,
        error = %e,
        "task_completion_failed_after_publish"
      );
      return Err(e);
    }

    self
      .update_draft(
        &draft.draft_id,
        DraftUpdate {
          status: Some(DraftStatus::Approved),
          resource_id: Some(revision.resource_id.clone()),
          base_version: Some(revision.fingerprint.clone()),
          updated_by: Some(principal.to_string()),
          ..Default::default()
        },
        cancel,
      )
      .await?;

    info!(draft_id = %draft.draft_id, task_id = %task_id, "task_completed");
    Ok(CompletionOutcome::Completed(Decision {
      status: DraftStatus::Approved,
      resource_id: Some(revision.resource_id),
      base_version: Some(revision.fingerprint),
    }))
  }

  async fn reject(
    &self,
    draft: &Draft,
    task_id: &str,
    comments: Option<&str>,
    principal: &str,
    cancel: &CancellationToken,
  ) -> Result<CompletionOutcome, OrchestrationError> {
    self
      .complete_task(task_id, decision_variables(false, comments, principal), cancel)
      .await?;

    let updated = self
      .update_draft(
        &draft.draft_id,
        DraftUpdate {
          status: Some(DraftStatus::Rejected),
          updated_by: Some(principal.to_string()),
          ..Default::default()
        },
        cancel,
      )
      .await?;

    info!(draft_id = %draft.draft_id, task_id = %task_id, "task_completed");
    Ok(CompletionOutcome::Completed(Decision {
      status: DraftStatus::Rejected,
      resource_id: updated.resource_id,
      base_version: updated.base_version,
    }))
  }

  /// Write the draft's content to the registry.
  ///
  /// Returns `Ok(Err(conflict))` when the registry refuses the write because
  /// the resource moved on after detection.
  async fn publish(
    &self,
    draft: &Draft,
    cancel: &CancellationToken,
  ) -> Result<Result<Revision, ConflictResult>, OrchestrationError> {
    let registry = &self.adapters.registry;

    let Some(resource_id) = &draft.resource_id else {
      return self
        .call(Adapter::ResourceRegistry, cancel, registry.create(&draft.content))
        .await?
        .map(Ok)
        .map_err(|e| OrchestrationError::adapter(Adapter::ResourceRegistry, e));
    };

    let base_version = draft.base_version.as_ref().ok_or_else(|| {
      OrchestrationError::invalid_state(format!(
        "draft '{}' has no base version for resource '{}'",
        draft.draft_id, resource_id
      ))
    })?;

    match self
      .call(
        Adapter::ResourceRegistry,
        cancel,
        registry.update(resource_id, &draft.content, base_version),
      )
      .await?
    {
      Ok(revision) => Ok(Ok(revision)),
      Err(ratify_registry::Error::FingerprintMismatch { .. } | ratify_registry::Error::NotFound(_)) => {
        // Lost the race between detection and write; report what is there now.
        let conflict = self.detect(draft, cancel).await?;
        if conflict.has_conflict {
          warn!(
            draft_id = %draft.draft_id,
            conflict_type = ?conflict.conflict_type,
            "version_conflict_detected"
          );
          Ok(Err(conflict))
        } else {
          Err(OrchestrationError::invalid_state(format!(
            "registry rejected the write to '{}' but reports no divergence",
            resource_id
          )))
        }
      }
      Err(e) => Err(OrchestrationError::adapter(Adapter::ResourceRegistry, e)),
    }
  }

  /// Read the baseline, start the process, then record both on the draft.
  ///
  /// With `rebase`, a resource that no longer exists detaches the draft
  /// instead of failing.
  async fn start_approval(
    &self,
    draft: &Draft,
    user_id: &str,
    rebase: bool,
    cancel: &CancellationToken,
  ) -> Result<Submission, OrchestrationError> {
    let mut detach = false;
    let base_version = match &draft.resource_id {
      None => None,
      Some(resource_id) => {
        let current = self
          .call(
            Adapter::ResourceRegistry,
            cancel,
            self.adapters.registry.current_fingerprint(resource_id),
          )
          .await?
          .map_err(|e| OrchestrationError::adapter(Adapter::ResourceRegistry, e))?;

        match current {
          Some(fingerprint) => Some(fingerprint),
          None if rebase => {
            info!(draft_id = %draft.draft_id, resource_id = %resource_id, "resource_detached");
            detach = true;
            None
          }
          None => return Err(OrchestrationError::ResourceNotFound(resource_id.clone())),
        }
      }
    };

    let mut variables = Variables::new();
    variables.insert(DRAFT_ID_VARIABLE.to_string(), json!(draft.draft_id));
    variables.insert("draftName".to_string(), json!(draft.name));
    variables.insert("submittedBy".to_string(), json!(user_id));
    variables.insert(
      "baseVersion".to_string(),
      base_version
        .as_ref()
        .map_or(Value::Null, |v| json!(v.as_str())),
    );
    if let Some(resource_id) = draft.resource_id.as_ref().filter(|_| !detach) {
      variables.insert("resourceId".to_string(), json!(resource_id));
    }

    let process_instance_id = self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self
          .adapters
          .engine
          .start_process(&self.config.process_key, variables),
      )
      .await?
      .map_err(|e| OrchestrationError::adapter(Adapter::WorkflowEngine, e))?;

    let update = DraftUpdate {
      status: Some(DraftStatus::Submitted),
      process_instance_id: Some(process_instance_id.clone()),
      base_version: base_version.clone(),
      updated_by: Some(user_id.to_string()),
      detach_resource: detach,
      ..Default::default()
    };

    if let Err(e) = self.update_draft(&draft.draft_id, update, cancel).await {
      // Leave no process behind that the draft does not point at.
      self.abandon_process(&process_instance_id).await;
      return Err(e);
    }

    Ok(Submission {
      process_instance_id,
      base_version,
    })
  }

  /// Best-effort cancellation of a process the draft was never linked to.
  async fn abandon_process(&self, process_instance_id: &str) {
    let cancel = CancellationToken::new();
    let result = self
      .call(
        Adapter::WorkflowEngine,
        &cancel,
        self
          .adapters
          .engine
          .cancel_process(process_instance_id, "draft update failed"),
      )
      .await;

    if !matches!(result, Ok(Ok(()))) {
      error!(
        process_instance_id = %process_instance_id,
        "orphaned_process_instance"
      );
    }
  }

  async fn cancel_stale_process(
    &self,
    process_instance_id: &str,
    cancel: &CancellationToken,
  ) -> Result<(), OrchestrationError> {
    match self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self
          .adapters
          .engine
          .cancel_process(process_instance_id, "rebased after version conflict"),
      )
      .await?
    {
      Ok(()) => {
        info!(process_instance_id = %process_instance_id, "stale_process_cancelled");
        Ok(())
      }
      Err(ratify_workflow_engine::Error::NotFound(_)) => Ok(()),
      Err(e) => Err(OrchestrationError::adapter(Adapter::WorkflowEngine, e)),
    }
  }

  async fn complete_task(
    &self,
    task_id: &str,
    variables: Variables,
    cancel: &CancellationToken,
  ) -> Result<(), OrchestrationError> {
    match self
      .call(
        Adapter::WorkflowEngine,
        cancel,
        self.adapters.completer.complete_task(task_id, variables),
      )
      .await?
    {
      Ok(()) => Ok(()),
      Err(
        ratify_workflow_engine::Error::AlreadyCompleted(_) | ratify_workflow_engine::Error::NotFound(_),
      ) => Err(OrchestrationError::TaskNotFound(task_id.to_string())),
      Err(e) => Err(OrchestrationError::adapter(Adapter::WorkflowEngine, e)),
    }
  }

  async fn detect(
    &self,
    draft: &Draft,
    cancel: &CancellationToken,
  ) -> Result<ConflictResult, OrchestrationError> {
    self
      .call(Adapter::ResourceRegistry, cancel, self.detector.detect(draft))
      .await?
      .map_err(|e| OrchestrationError::adapter(Adapter::ResourceRegistry, e))
  }

  async fn load_draft(
    &self,
    draft_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Draft, OrchestrationError> {
    match self
      .call(Adapter::DraftStore, cancel, self.adapters.drafts.get(draft_id))
      .await?
    {
      Ok(draft) => Ok(draft),
      Err(ratify_draft_store::Error::NotFound(_)) => {
        Err(OrchestrationError::DraftNotFound(draft_id.to_string()))
      }
      Err(e) => Err(OrchestrationError::adapter(Adapter::DraftStore, e)),
    }
  }

  async fn update_draft(
    &self,
    draft_id: &str,
    update: DraftUpdate,
    cancel: &CancellationToken,
  ) -> Result<Draft, OrchestrationError> {
    match self
      .call(
        Adapter::DraftStore,
        cancel,
        self.adapters.drafts.update(draft_id, &update),
      )
      .await?
    {
      Ok(draft) => Ok(draft),
      Err(ratify_draft_store::Error::NotFound(_)) => {
        Err(OrchestrationError::DraftNotFound(draft_id.to_string()))
      }
      Err(e) => Err(OrchestrationError::adapter(Adapter::DraftStore, e)),
    }
  }

  /// Draft summary for a pending task, if the draft resolves.
  async fn summarize(
    &self,
    draft_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Option<DraftSummary>, OrchestrationError> {
    match self
      .call(Adapter::DraftStore, cancel, self.adapters.drafts.get(draft_id))
      .await
    {
      Ok(Ok(draft)) => Ok(Some(draft.summary())),
      Ok(Err(ratify_draft_store::Error::NotFound(_))) => Ok(None),
      Ok(Err(e)) => {
        warn!(draft_id = %draft_id, error = %e, "draft_summary_unavailable");
        Ok(None)
      }
      Err(OrchestrationError::Cancelled) => Err(OrchestrationError::Cancelled),
      Err(e) => {
        warn!(draft_id = %draft_id, error = %e, "draft_summary_unavailable");
        Ok(None)
      }
    }
  }

  async fn call<T, E>(
    &self,
    adapter: Adapter,
    cancel: &CancellationToken,
    call: impl std::future::Future<Output = Result<T, E>>,
  ) -> Result<Result<T, E>, OrchestrationError>
  where
    E: std::fmt::Display,
  {
    let result = bounded(adapter, self.config.adapter_timeout, cancel, call).await?;
    if let Err(e) = &result {
      warn!(adapter = %adapter, error = %e, "adapter_call_failed");
    }
    Ok(result)
  }
}

fn require(field: &str, value: &str) -> Result<(), OrchestrationError> {
  if value.trim().is_empty() {
    return Err(OrchestrationError::validation(format!(
      "'{}' must not be empty",
      field
    )));
  }
  Ok(())
}

fn draft_reference(variables: &Variables) -> Option<String> {
  variables
    .get(DRAFT_ID_VARIABLE)
    .and_then(Value::as_str)
    .filter(|id| !id.is_empty())
    .map(str::to_string)
}

fn decision_variables(approved: bool, comments: Option<&str>, principal: &str) -> Variables {
  let mut variables = Variables::new();
  variables.insert("approved".to_string(), json!(approved));
  variables.insert("comments".to_string(), json!(comments.unwrap_or_default()));
  variables.insert("completedBy".to_string(), json!(principal));
  variables
}
