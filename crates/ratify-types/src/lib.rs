//! Ratify Types
//!
//! Data types shared by every ratify crate. The three systems of record each
//! own one of these shapes:
//! - the draft repository owns [`Draft`]
//! - the resource registry owns [`Resource`]
//! - the workflow engine owns [`Task`]
//!
//! [`ConflictResult`] is derived on demand and never stored anywhere.

mod conflict;
mod draft;
mod fingerprint;
mod resource;
mod task;

pub use conflict::{ConflictResult, ConflictType};
pub use draft::{Draft, DraftStatus, DraftSummary, DraftUpdate, NewDraft};
pub use fingerprint::Fingerprint;
pub use resource::Resource;
pub use task::{Task, TaskFilter, Variables};
