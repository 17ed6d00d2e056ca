//! Edit session state machine.
//!
//! # Responsibility
//! - Track whether the next submit creates a note or updates a selected one.
//! - Hold the draft text between keystrokes.
//!
//! # Invariants
//! - Mode changes only through `select_note`, `cancel_edit` and
//!   `finish_submit`.
//! - Whether the selected note still exists is decided at submit time
//!   against the live collection, never cached.
//! - Every successful submit (create or update) returns to `Idle` with an
//!   empty draft.

use crate::model::note::{Note, NoteId};
use crate::state::collection::SharedCollection;

/// Edit mode of the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditMode {
    /// Next submit creates a note.
    #[default]
    Idle,
    /// Next submit updates the note with this id.
    Editing(NoteId),
}

/// Mutation chosen for a submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitPlan {
    Create { text: String },
    Update { id: NoteId, text: String },
}

/// Form state: selected note and draft text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSession {
    mode: EditMode,
    draft: String,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn draft(&self) -> &str {
        self.draft.as_str()
    }

    /// Loads `note` into the form for editing.
    pub fn select_note(&mut self, note: &Note) {
        self.mode = EditMode::Editing(note.id.clone());
        self.draft = note.text.clone();
    }

    /// Records one keystroke worth of draft text.
    pub fn change_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Abandons the current edit and starts a new note.
    pub fn cancel_edit(&mut self) {
        self.reset();
    }

    /// Returns whether the selected note is still present in `collection`.
    pub fn has_existing_note(&self, collection: &SharedCollection) -> bool {
        match &self.mode {
            EditMode::Editing(id) => collection.contains(id),
            EditMode::Idle => false,
        }
    }

    /// Chooses create or update for the current draft.
    ///
    /// A selected note that disappeared from `collection` (deleted by
    /// another client) falls back to a create.
    pub fn plan_submit(&self, collection: &SharedCollection) -> SubmitPlan {
        let text = self.draft.clone();
        match &self.mode {
            EditMode::Editing(id) if collection.contains(id) => SubmitPlan::Update {
                id: id.clone(),
                text,
            },
            _ => SubmitPlan::Create { text },
        }
    }

    /// Applies the post-success transition: back to `Idle`, draft cleared.
    pub fn finish_submit(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.mode = EditMode::Idle;
        self.draft.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{EditMode, EditSession, SubmitPlan};
    use crate::model::note::{Note, NoteId};
    use crate::state::collection::SharedCollection;

    #[test]
    fn idle_session_plans_create() {
        let collection = SharedCollection::new();
        let mut session = EditSession::new();
        session.change_draft("buy milk");
        assert_eq!(
            session.plan_submit(&collection),
            SubmitPlan::Create {
                text: "buy milk".to_string()
            }
        );
    }

    #[test]
    fn select_loads_text_and_cancel_resets() {
        let mut session = EditSession::new();
        session.select_note(&Note::new("1", "hello"));
        assert_eq!(session.mode(), &EditMode::Editing(NoteId::new("1")));
        assert_eq!(session.draft(), "hello");

        session.cancel_edit();
        assert_eq!(session.mode(), &EditMode::Idle);
        assert_eq!(session.draft(), "");
    }

    #[test]
    fn change_draft_keeps_mode() {
        let mut session = EditSession::new();
        session.select_note(&Note::new("1", "hello"));
        session.change_draft("hello world");
        assert_eq!(session.mode(), &EditMode::Editing(NoteId::new("1")));
        assert_eq!(session.draft(), "hello world");
    }
}
