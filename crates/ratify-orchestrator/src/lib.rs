//! Ratify Orchestrator
//!
//! This crate provides the [`ApprovalController`], which coordinates approval
//! of drafts across three external systems it does not own: the draft store,
//! the resource registry and the workflow engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ApprovalController                       │
//! │  - submit / pending / complete / check / resubmit           │
//! │  - every adapter call bounded by timeout + cancellation     │
//! │  - draft writes always last                                 │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌────────────────┐  ┌───────────────────┐  ┌─────────────────┐
//! │   DraftStore   │  │ ResourceRegistry  │  │ WorkflowEngine  │
//! │                │  │ (ConflictDetector)│  │ + TaskCompleter │
//! └────────────────┘  └───────────────────┘  └─────────────────┘
//! ```
//!
//! The controller keeps no state of its own. A version conflict is an
//! outcome, not an error: it comes back as [`CompletionOutcome::Conflict`]
//! or as a [`ConflictResult`](ratify_types::ConflictResult) with
//! `has_conflict` set.

mod controller;
mod error;
mod guard;
pub mod response;

pub use controller::{
  Adapters, ApprovalController, CompletionOutcome, ControllerConfig, DRAFT_ID_VARIABLE, Decision,
  PendingTask, Submission,
};
pub use error::{Adapter, BoxError, OrchestrationError};
