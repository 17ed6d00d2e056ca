//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record exchanged with the remote store.
//! - Provide ordering helpers used by reconciliation.
//!
//! # Invariants
//! - `id` is assigned by the remote store and never reused for another note.
//! - `version` is bumped by the store on every create/update/delete.
//! - Version `0` means "unversioned"; reconciliation then degrades to
//!   arrival order.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque note identifier assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Wraps a store-assigned identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Validation errors for note invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    /// Note id is empty or whitespace-only.
    EmptyId,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "note id cannot be empty"),
        }
    }
}

impl Error for NoteValidationError {}

/// One note as seen by the client.
///
/// Serialized with the backend field names: `id`, `note`, `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned stable identifier.
    pub id: NoteId,
    /// Note body.
    #[serde(rename = "note")]
    pub text: String,
    /// Store revision for this id. Missing on the wire means unversioned.
    #[serde(default)]
    pub version: u64,
}

impl Note {
    /// Creates an unversioned note.
    pub fn new(id: impl Into<NoteId>, text: impl Into<String>) -> Self {
        Self::with_version(id, text, 0)
    }

    /// Creates a note at an explicit store revision.
    pub fn with_version(id: impl Into<NoteId>, text: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            version,
        }
    }

    /// Checks the identity invariant held by the collection.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.id.is_empty() {
            return Err(NoteValidationError::EmptyId);
        }
        Ok(())
    }

    /// Returns whether `self` carries the same revision and body as `other`.
    pub fn same_content(&self, other: &Note) -> bool {
        self.version == other.version && self.text == other.text
    }
}

/// Returns whether `text` is acceptable as a note body.
pub fn is_submittable_text(text: &str) -> bool {
    !text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::{is_submittable_text, Note, NoteId, NoteValidationError};

    #[test]
    fn validate_rejects_blank_id() {
        let note = Note::new("  ", "body");
        assert_eq!(note.validate(), Err(NoteValidationError::EmptyId));
        assert!(Note::new("1", "body").validate().is_ok());
    }

    #[test]
    fn same_content_compares_version_and_text() {
        let base = Note::with_version("1", "a", 2);
        assert!(base.same_content(&Note::with_version("1", "a", 2)));
        assert!(!base.same_content(&Note::with_version("1", "a", 3)));
        assert!(!base.same_content(&Note::with_version("1", "b", 2)));
    }

    #[test]
    fn submittable_text_rejects_whitespace_only() {
        assert!(!is_submittable_text(""));
        assert!(!is_submittable_text(" \n\t"));
        assert!(is_submittable_text("buy milk"));
    }

    #[test]
    fn note_id_displays_raw_value() {
        assert_eq!(NoteId::new("abc").to_string(), "abc");
    }
}
