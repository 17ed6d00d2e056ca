//! Client-side reconciliation core for notetaker.
//! This crate is the single source of truth for note state invariants.

pub mod client;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod service;
pub mod session;
pub mod state;
pub mod sync;

pub use client::{ClientError, NotesClient};
pub use config::{ApplyPolicy, ClientConfig, ConfigError, LogConfig, ResubscribePolicy};
pub use gateway::memory::MemoryGateway;
pub use gateway::{
    EventKind, FeedItem, FeedSender, GatewayError, GatewayResult, Operation, RemoteGateway,
    Subscription,
};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget, LoggingError};
pub use model::note::{Note, NoteId, NoteValidationError};
pub use service::mutation_coordinator::{MutationCoordinator, MutationError, SubmitOutcome};
pub use session::edit_session::{EditMode, EditSession, SubmitPlan};
pub use state::collection::{
    ApplyOutcome, MergeSummary, NoteCollection, ReplaceSummary, SharedCollection, UNVERSIONED,
};
pub use sync::reconciler::{
    apply_event, ReconcilerHandle, SubscriptionError, SubscriptionReconciler,
    FAILURE_LOG_CAPACITY,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
