//! Mutation coordinator.
//!
//! # Responsibility
//! - Issue list/create/update/delete requests against the remote gateway.
//! - Apply confirmed results to the shared collection per `ApplyPolicy`.
//! - Drive edit-session submits (create vs update fallback).
//!
//! # Invariants
//! - Empty or whitespace-only text never reaches the gateway.
//! - A failed request leaves the collection and the edit session untouched.
//! - No automatic retry; failures are returned with the original input.
//! - Results arriving after teardown are dropped by the closed collection.

use crate::config::ApplyPolicy;
use crate::gateway::{GatewayError, Operation, RemoteGateway};
use crate::model::note::{is_submittable_text, Note, NoteId};
use crate::session::edit_session::{EditSession, SubmitPlan};
use crate::state::collection::{ApplyOutcome, SharedCollection};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Request failure surfaced at the coordinator boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Text was empty or whitespace-only; nothing was sent.
    EmptyText(Operation),
    ListFailed {
        cause: GatewayError,
    },
    CreateFailed {
        text: String,
        cause: GatewayError,
    },
    UpdateFailed {
        id: NoteId,
        text: String,
        cause: GatewayError,
    },
    DeleteFailed {
        id: NoteId,
        cause: GatewayError,
    },
}

impl MutationError {
    /// Operation that failed.
    pub fn operation(&self) -> Operation {
        match self {
            Self::EmptyText(operation) => *operation,
            Self::ListFailed { .. } => Operation::List,
            Self::CreateFailed { .. } => Operation::Create,
            Self::UpdateFailed { .. } => Operation::Update,
            Self::DeleteFailed { .. } => Operation::Delete,
        }
    }

    /// Gateway failure behind this error, if a request was sent.
    pub fn cause(&self) -> Option<&GatewayError> {
        match self {
            Self::EmptyText(_) => None,
            Self::ListFailed { cause }
            | Self::CreateFailed { cause, .. }
            | Self::UpdateFailed { cause, .. }
            | Self::DeleteFailed { cause, .. } => Some(cause),
        }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText(operation) => write!(f, "{operation} rejected: note text is empty"),
            Self::ListFailed { cause } => write!(f, "list failed: {cause}"),
            Self::CreateFailed { cause, .. } => write!(f, "create failed: {cause}"),
            Self::UpdateFailed { id, cause, .. } => write!(f, "update of {id} failed: {cause}"),
            Self::DeleteFailed { id, cause } => write!(f, "delete of {id} failed: {cause}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(Note),
    Updated(Note),
}

impl SubmitOutcome {
    pub fn note(&self) -> &Note {
        match self {
            Self::Created(note) | Self::Updated(note) => note,
        }
    }
}

/// Issues mutations and folds confirmed results into the collection.
pub struct MutationCoordinator<G: RemoteGateway> {
    gateway: Arc<G>,
    collection: SharedCollection,
    policy: ApplyPolicy,
}

impl<G: RemoteGateway> Clone for MutationCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            collection: self.collection.clone(),
            policy: self.policy,
        }
    }
}

impl<G: RemoteGateway> MutationCoordinator<G> {
    pub fn new(gateway: Arc<G>, collection: SharedCollection, policy: ApplyPolicy) -> Self {
        Self {
            gateway,
            collection,
            policy,
        }
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Loads the full store listing into the collection.
    ///
    /// Returns the number of visible notes after the install.
    pub async fn load_initial(&self) -> Result<usize, MutationError> {
        let started_at = Instant::now();
        let notes = match self.gateway.list().await {
            Ok(notes) => notes,
            Err(cause) => {
                log_failure(Operation::List, started_at, &cause);
                return Err(MutationError::ListFailed { cause });
            }
        };

        let fetched = notes.len();
        match self.collection.replace_all(notes) {
            Some(summary) => {
                info!(
                    "event=initial_load module=service status=ok duration_ms={} fetched={} installed={} skipped={} carried_over={}",
                    started_at.elapsed().as_millis(),
                    fetched,
                    summary.installed,
                    summary.skipped,
                    summary.carried_over
                );
                Ok(summary.installed)
            }
            None => {
                debug!("event=initial_load module=service status=skipped reason=closed");
                Ok(0)
            }
        }
    }

    /// Creates a note from `text`.
    pub async fn create(&self, text: &str) -> Result<Note, MutationError> {
        if !is_submittable_text(text) {
            return Err(MutationError::EmptyText(Operation::Create));
        }

        let started_at = Instant::now();
        match self.gateway.create(text).await {
            Ok(note) => {
                log_success(Operation::Create, started_at, &note);
                self.apply_upsert(Operation::Create, &note);
                Ok(note)
            }
            Err(cause) => {
                log_failure(Operation::Create, started_at, &cause);
                Err(MutationError::CreateFailed {
                    text: text.to_string(),
                    cause,
                })
            }
        }
    }

    /// Replaces the text of note `id`.
    pub async fn update(&self, id: &NoteId, text: &str) -> Result<Note, MutationError> {
        if !is_submittable_text(text) {
            return Err(MutationError::EmptyText(Operation::Update));
        }

        let started_at = Instant::now();
        match self.gateway.update(id, text).await {
            Ok(note) => {
                log_success(Operation::Update, started_at, &note);
                self.apply_upsert(Operation::Update, &note);
                Ok(note)
            }
            Err(cause) => {
                log_failure(Operation::Update, started_at, &cause);
                Err(MutationError::UpdateFailed {
                    id: id.clone(),
                    text: text.to_string(),
                    cause,
                })
            }
        }
    }

    /// Deletes note `id`.
    pub async fn delete(&self, id: &NoteId) -> Result<Note, MutationError> {
        let started_at = Instant::now();
        match self.gateway.delete(id).await {
            Ok(note) => {
                log_success(Operation::Delete, started_at, &note);
                if self.policy == ApplyPolicy::Immediate {
                    let outcome = self.collection.remove(&note.id, note.version);
                    log_local_apply(Operation::Delete, &note, outcome);
                }
                Ok(note)
            }
            Err(cause) => {
                log_failure(Operation::Delete, started_at, &cause);
                Err(MutationError::DeleteFailed {
                    id: id.clone(),
                    cause,
                })
            }
        }
    }

    /// Submits the session draft as a create or an update.
    ///
    /// The create/update decision re-checks the live collection, so a note
    /// deleted elsewhere since selection is re-created instead of updated.
    /// On success the session returns to idle; on failure it is untouched.
    pub async fn submit(&self, session: &mut EditSession) -> Result<SubmitOutcome, MutationError> {
        let outcome = match session.plan_submit(&self.collection) {
            SubmitPlan::Create { text } => SubmitOutcome::Created(self.create(&text).await?),
            SubmitPlan::Update { id, text } => {
                SubmitOutcome::Updated(self.update(&id, &text).await?)
            }
        };
        session.finish_submit();
        Ok(outcome)
    }

    fn apply_upsert(&self, operation: Operation, note: &Note) {
        if self.policy == ApplyPolicy::Immediate {
            let outcome = self.collection.upsert(note.clone());
            log_local_apply(operation, note, outcome);
        }
    }
}

fn log_success(operation: Operation, started_at: Instant, note: &Note) {
    info!(
        "event=mutation module=service op={} status=ok duration_ms={} id={} version={}",
        operation,
        started_at.elapsed().as_millis(),
        note.id,
        note.version
    );
}

fn log_failure(operation: Operation, started_at: Instant, cause: &GatewayError) {
    warn!(
        "event=mutation module=service op={} status=error duration_ms={} error={}",
        operation,
        started_at.elapsed().as_millis(),
        cause
    );
}

fn log_local_apply(operation: Operation, note: &Note, outcome: ApplyOutcome) {
    debug!(
        "event=local_apply module=service op={} id={} version={} outcome={}",
        operation,
        note.id,
        note.version,
        outcome.as_str()
    );
}

#[cfg(test)]
mod tests {
    use super::MutationError;
    use crate::gateway::{GatewayError, Operation};
    use crate::model::note::NoteId;
    use std::error::Error;

    #[test]
    fn error_reports_operation_and_source() {
        let err = MutationError::UpdateFailed {
            id: NoteId::new("1"),
            text: "draft".to_string(),
            cause: GatewayError::Unavailable("offline".to_string()),
        };
        assert_eq!(err.operation(), Operation::Update);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("update of 1 failed"));

        let empty = MutationError::EmptyText(Operation::Create);
        assert_eq!(empty.operation(), Operation::Create);
        assert!(empty.source().is_none());
    }
}
