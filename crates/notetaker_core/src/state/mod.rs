//! In-memory note state shared by the UI, coordinator and reconciler.
//!
//! # Responsibility
//! - Own the ordered, duplicate-free note collection.
//! - Apply every upsert/remove/replace as one indivisible step.
//!
//! # Invariants
//! - At most one entry per `NoteId`.
//! - Deleted ids are remembered (tombstones) so late events cannot
//!   resurrect them.

pub mod collection;
