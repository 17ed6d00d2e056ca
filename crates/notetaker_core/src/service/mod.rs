//! Core use-case services.
//!
//! # Responsibility
//! - Turn user intents (submit, delete, initial load) into gateway requests.
//! - Keep request failures at this boundary as returned values.

pub mod mutation_coordinator;
