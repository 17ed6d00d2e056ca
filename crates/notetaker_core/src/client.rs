//! Notes client lifecycle.
//!
//! # Responsibility
//! - Own one collection instance and inject it into the coordinator and the
//!   reconciler.
//! - Start up in a gap-free order: feeds first, then the full listing.
//! - Tear down feeds and close the collection together.
//!
//! # Invariants
//! - After `teardown` returns, nothing mutates the collection: feed tasks
//!   have exited and late mutation results hit a closed collection.

use crate::config::{ClientConfig, ConfigError};
use crate::gateway::RemoteGateway;
use crate::model::note::{Note, NoteId};
use crate::service::mutation_coordinator::{MutationCoordinator, MutationError, SubmitOutcome};
use crate::session::edit_session::EditSession;
use crate::state::collection::SharedCollection;
use crate::sync::reconciler::{ReconcilerHandle, SubscriptionError, SubscriptionReconciler};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Client startup failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    InvalidConfig(ConfigError),
    InitialLoad(MutationError),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(err) => write!(f, "invalid client config: {err}"),
            Self::InitialLoad(err) => write!(f, "initial load failed: {err}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::InitialLoad(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

/// One running note client: state, edit form, mutations and feeds.
pub struct NotesClient<G: RemoteGateway> {
    collection: SharedCollection,
    coordinator: MutationCoordinator<G>,
    session: EditSession,
    reconciler: Option<ReconcilerHandle>,
}

impl<G: RemoteGateway> NotesClient<G> {
    /// Subscribes to all feeds, then loads the initial listing.
    pub async fn start(gateway: Arc<G>, config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let collection = SharedCollection::new();
        // Why: feeds go live before the listing is requested, so an event
        // racing the listing is never lost. The collection's version rules
        // settle which copy wins.
        let reconciler = SubscriptionReconciler::start(
            Arc::clone(&gateway),
            collection.clone(),
            config.resubscribe,
        );
        let coordinator = MutationCoordinator::new(gateway, collection.clone(), config.apply_policy);

        if let Err(err) = coordinator.load_initial().await {
            warn!("event=client_start module=client status=error error={}", err);
            reconciler.shutdown().await;
            collection.close();
            return Err(ClientError::InitialLoad(err));
        }

        info!(
            "event=client_start module=client status=ok notes={}",
            collection.len()
        );
        Ok(Self {
            collection,
            coordinator,
            session: EditSession::new(),
            reconciler: Some(reconciler),
        })
    }

    /// Snapshot of the notes in display order.
    pub fn notes(&self) -> Vec<Note> {
        self.collection.list().collect()
    }

    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    pub fn coordinator(&self) -> &MutationCoordinator<G> {
        &self.coordinator
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    /// Loads note `id` into the edit form. Returns `false` if it is not shown.
    pub fn select_note(&mut self, id: &NoteId) -> bool {
        match self.collection.get(id) {
            Some(note) => {
                self.session.select_note(&note);
                true
            }
            None => false,
        }
    }

    pub fn change_draft(&mut self, text: impl Into<String>) {
        self.session.change_draft(text);
    }

    pub fn cancel_edit(&mut self) {
        self.session.cancel_edit();
    }

    /// Submits the edit form.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, MutationError> {
        self.coordinator.submit(&mut self.session).await
    }

    pub async fn delete(&self, id: &NoteId) -> Result<Note, MutationError> {
        self.coordinator.delete(id).await
    }

    /// Feed failures observed since start.
    pub fn feed_failures(&self) -> Vec<SubscriptionError> {
        self.reconciler
            .as_ref()
            .map(ReconcilerHandle::failures)
            .unwrap_or_default()
    }

    /// Cancels all feeds, waits for them, and closes the collection.
    pub async fn teardown(mut self) {
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.shutdown().await;
        }
        self.collection.close();
        info!("event=client_teardown module=client status=ok");
    }
}

impl<G: RemoteGateway> Drop for NotesClient<G> {
    fn drop(&mut self) {
        // Dropping the reconciler handle aborts feed tasks.
        self.reconciler.take();
        self.collection.close();
    }
}
