//! Domain model for reconciled note records.
//!
//! # Responsibility
//! - Define the note record shared by the collection, gateway and feeds.
//! - Keep identity (`NoteId`) and revision (`version`) explicit in the type.
//!
//! # Invariants
//! - Every note held by core has a non-empty `NoteId`.
//! - `version` never decreases for one id on the store side.

pub mod note;
