//! Ordered note collection with version-aware reconciliation.
//!
//! # Responsibility
//! - Merge local mutation results and feed events into one ordered list.
//! - Track the highest revision seen per id, including deletions.
//! - Refuse all writes once closed at teardown.
//!
//! # Invariants
//! - Ids are unique; new ids are appended, replaced ids keep their position.
//! - A note older than the highest revision seen for its id is ignored.
//! - A note at or below a tombstone revision is ignored (no resurrection).
//! - Version 0 means the order is unknown: an unversioned delete always
//!   removes, an unversioned upsert overwrites unless the id is tombstoned.
//! - Readers never observe a half-applied mutation.

use crate::model::note::{Note, NoteId};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Revision carried by events from feeds that do not version their notes.
pub const UNVERSIONED: u64 = 0;

/// Result of applying one mutation to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New id appended.
    Inserted,
    /// Existing id overwritten in place.
    Replaced,
    /// Same id, revision and body already present.
    Unchanged,
    /// Entry deleted and tombstoned.
    Removed,
    /// Delete for an id that was not present; tombstone still recorded.
    Absent,
    /// Older than what the collection has already seen for this id.
    Stale,
    /// Note failed validation and was not applied.
    Rejected,
    /// Collection was torn down; nothing applied.
    Closed,
}

impl ApplyOutcome {
    /// Returns whether the visible list changed.
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced | Self::Removed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Unchanged => "unchanged",
            Self::Removed => "removed",
            Self::Absent => "absent",
            Self::Stale => "stale",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        }
    }
}

/// Summary of one `replace_all` snapshot install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// Entries visible after the install.
    pub installed: usize,
    /// Snapshot entries dropped as stale, tombstoned, invalid or duplicated.
    pub skipped: usize,
    /// Entries observed before the snapshot and absent from it, kept at the end.
    pub carried_over: usize,
}

/// Summary of one `merge_listing` catch-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Listed entries that changed the visible list.
    pub changed: usize,
    /// Previously known entries the listing no longer has.
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Revision {
    version: u64,
    deleted: bool,
}

/// Ordered note collection. Not thread-safe; see [`SharedCollection`].
#[derive(Debug, Default)]
pub struct NoteCollection {
    notes: Vec<Note>,
    seen: HashMap<NoteId, Revision>,
    closed: bool,
    applied_events: u64,
}

impl NoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `note` or overwrites the entry with the same id.
    pub fn upsert(&mut self, note: Note) -> ApplyOutcome {
        if self.closed {
            return ApplyOutcome::Closed;
        }
        self.applied_events += 1;

        if note.validate().is_err() {
            return ApplyOutcome::Rejected;
        }
        if self.is_stale(&note.id, note.version) {
            debug!(
                "event=collection_apply module=state op=upsert outcome=stale id={} version={}",
                note.id, note.version
            );
            return ApplyOutcome::Stale;
        }

        let mut note = note;
        if note.version == UNVERSIONED {
            // Why: an unversioned write inherits the stored revision so later
            // versioned events keep comparing against what was already seen.
            if let Some(rev) = self.seen.get(&note.id) {
                note.version = rev.version;
            }
        }
        self.seen.insert(
            note.id.clone(),
            Revision {
                version: note.version,
                deleted: false,
            },
        );
        match self.position(&note.id) {
            Some(index) if self.notes[index].same_content(&note) => ApplyOutcome::Unchanged,
            Some(index) => {
                self.notes[index] = note;
                ApplyOutcome::Replaced
            }
            None => {
                self.notes.push(note);
                ApplyOutcome::Inserted
            }
        }
    }

    /// Deletes `id` and records a tombstone at `version`.
    ///
    /// A delete carrying an older revision than the present entry is stale:
    /// the entry was rewritten after the delete was issued. An unversioned
    /// delete is never stale.
    pub fn remove(&mut self, id: &NoteId, version: u64) -> ApplyOutcome {
        if self.closed {
            return ApplyOutcome::Closed;
        }
        self.applied_events += 1;

        let position = self.position(id);
        if let Some(index) = position {
            if version != UNVERSIONED && self.notes[index].version > version {
                debug!(
                    "event=collection_apply module=state op=remove outcome=stale id={} version={}",
                    id, version
                );
                return ApplyOutcome::Stale;
            }
        }

        // Why: the tombstone outlives the entry. Feeds are independent, so a
        // create for this id can still arrive after its delete.
        let tombstone = self
            .seen
            .get(id)
            .map_or(version, |rev| rev.version.max(version));
        self.seen.insert(
            id.clone(),
            Revision {
                version: tombstone,
                deleted: true,
            },
        );

        match position {
            Some(index) => {
                self.notes.remove(index);
                ApplyOutcome::Removed
            }
            None => ApplyOutcome::Absent,
        }
    }

    /// Installs a full listing as the collection contents.
    ///
    /// Anything the collection already observed wins over an older snapshot
    /// entry: newer revisions stay, tombstoned ids stay deleted, and entries
    /// missing from the snapshot are carried over after it.
    pub fn replace_all(&mut self, snapshot: Vec<Note>) -> Option<ReplaceSummary> {
        if self.closed {
            return None;
        }

        let mut summary = ReplaceSummary::default();
        let mut next: Vec<Note> = Vec::with_capacity(snapshot.len());
        let mut placed: HashMap<NoteId, usize> = HashMap::new();

        for note in snapshot {
            if note.validate().is_err() || self.is_tombstoned(&note.id, note.version) {
                summary.skipped += 1;
                continue;
            }
            let candidate = match self.position(&note.id) {
                Some(index) if self.notes[index].version > note.version => {
                    self.notes[index].clone()
                }
                _ => note,
            };
            match placed.get(&candidate.id) {
                Some(&slot) => {
                    summary.skipped += 1;
                    if candidate.version >= next[slot].version {
                        next[slot] = candidate;
                    }
                }
                None => {
                    placed.insert(candidate.id.clone(), next.len());
                    next.push(candidate);
                }
            }
        }

        let placed_ids: HashSet<&NoteId> = placed.keys().collect();
        let carried: Vec<Note> = self
            .notes
            .iter()
            .filter(|note| !placed_ids.contains(&note.id))
            .cloned()
            .collect();
        summary.carried_over = carried.len();
        next.extend(carried);

        for note in &next {
            let version = self
                .seen
                .get(&note.id)
                .map_or(note.version, |rev| rev.version.max(note.version));
            self.seen.insert(
                note.id.clone(),
                Revision {
                    version,
                    deleted: false,
                },
            );
        }
        summary.installed = next.len();
        self.notes = next;
        Some(summary)
    }

    /// Folds a fresh listing into the current contents, keeping their order.
    ///
    /// Listed entries go through [`NoteCollection::upsert`]. Ids in
    /// `known_before` that are still present but missing from the listing were
    /// deleted remotely and are removed; entries that showed up after
    /// `known_before` was taken are left alone.
    pub fn merge_listing(
        &mut self,
        known_before: &[NoteId],
        snapshot: Vec<Note>,
    ) -> Option<MergeSummary> {
        if self.closed {
            return None;
        }

        let mut summary = MergeSummary::default();
        let listed: HashSet<NoteId> = snapshot.iter().map(|note| note.id.clone()).collect();
        for note in snapshot {
            if self.upsert(note).changed() {
                summary.changed += 1;
            }
        }
        for id in known_before {
            if listed.contains(id) || !self.contains(id) {
                continue;
            }
            if self.remove(id, UNVERSIONED).changed() {
                summary.removed += 1;
            }
        }
        Some(summary)
    }

    /// Returns the ids currently visible, in list order.
    pub fn ids(&self) -> Vec<NoteId> {
        self.notes.iter().map(|note| note.id.clone()).collect()
    }

    /// Returns a finite iterator over a snapshot of the current order.
    pub fn list(&self) -> std::vec::IntoIter<Note> {
        self.notes.clone().into_iter()
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Marks the collection as torn down. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of upsert/remove attempts applied while open, any outcome.
    pub fn applied_events(&self) -> u64 {
        self.applied_events
    }

    fn position(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| &note.id == id)
    }

    fn is_tombstoned(&self, id: &NoteId, version: u64) -> bool {
        matches!(self.seen.get(id), Some(rev) if rev.deleted && version <= rev.version)
    }

    fn is_stale(&self, id: &NoteId, version: u64) -> bool {
        match self.seen.get(id) {
            Some(rev) if rev.deleted => version <= rev.version,
            Some(_) if version == UNVERSIONED => false,
            Some(rev) => version < rev.version,
            None => false,
        }
    }
}

/// Cloneable handle to one collection instance.
///
/// Every method takes the lock exactly once; the lock is never held across
/// an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedCollection {
    inner: Arc<Mutex<NoteCollection>>,
}

impl SharedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, note: Note) -> ApplyOutcome {
        self.lock().upsert(note)
    }

    pub fn remove(&self, id: &NoteId, version: u64) -> ApplyOutcome {
        self.lock().remove(id, version)
    }

    pub fn replace_all(&self, notes: Vec<Note>) -> Option<ReplaceSummary> {
        self.lock().replace_all(notes)
    }

    pub fn merge_listing(
        &self,
        known_before: &[NoteId],
        snapshot: Vec<Note>,
    ) -> Option<MergeSummary> {
        self.lock().merge_listing(known_before, snapshot)
    }

    pub fn ids(&self) -> Vec<NoteId> {
        self.lock().ids()
    }

    pub fn list(&self) -> std::vec::IntoIter<Note> {
        self.lock().list()
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.lock().contains(id)
    }

    pub fn get(&self, id: &NoteId) -> Option<Note> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn close(&self) {
        self.lock().close();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    pub fn applied_events(&self) -> u64 {
        self.lock().applied_events()
    }

    // Each operation finishes its write before unlocking, so a poisoned
    // guard still holds a consistent collection.
    fn lock(&self) -> MutexGuard<'_, NoteCollection> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplyOutcome, NoteCollection};
    use crate::model::note::{Note, NoteId};

    fn texts(collection: &NoteCollection) -> Vec<String> {
        collection.list().map(|note| note.text).collect()
    }

    #[test]
    fn upsert_keeps_position_of_existing_entry() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "a", 1));
        collection.upsert(Note::with_version("2", "b", 1));
        assert_eq!(
            collection.upsert(Note::with_version("1", "a2", 2)),
            ApplyOutcome::Replaced
        );
        assert_eq!(texts(&collection), vec!["a2", "b"]);
    }

    #[test]
    fn upsert_ignores_older_revision() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "new", 3));
        assert_eq!(
            collection.upsert(Note::with_version("1", "old", 2)),
            ApplyOutcome::Stale
        );
        assert_eq!(texts(&collection), vec!["new"]);
    }

    #[test]
    fn upsert_rejects_blank_id() {
        let mut collection = NoteCollection::new();
        assert_eq!(collection.upsert(Note::new("", "x")), ApplyOutcome::Rejected);
        assert!(collection.is_empty());
    }

    #[test]
    fn tombstone_blocks_unversioned_late_create() {
        let mut collection = NoteCollection::new();
        let id = NoteId::new("1");
        assert_eq!(collection.remove(&id, 0), ApplyOutcome::Absent);
        assert_eq!(collection.upsert(Note::new("1", "late")), ApplyOutcome::Stale);
        assert!(!collection.contains(&id));
    }

    #[test]
    fn newer_write_after_tombstone_is_applied() {
        let mut collection = NoteCollection::new();
        let id = NoteId::new("1");
        collection.remove(&id, 2);
        assert_eq!(
            collection.upsert(Note::with_version("1", "again", 3)),
            ApplyOutcome::Inserted
        );
    }

    #[test]
    fn remove_with_older_revision_keeps_newer_entry() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "v4", 4));
        assert_eq!(
            collection.remove(&NoteId::new("1"), 3),
            ApplyOutcome::Stale
        );
        assert_eq!(texts(&collection), vec!["v4"]);
    }

    #[test]
    fn unversioned_delete_removes_versioned_entry() {
        let mut collection = NoteCollection::new();
        let id = NoteId::new("1");
        collection.upsert(Note::with_version("1", "buy milk", 1));
        assert_eq!(collection.remove(&id, 0), ApplyOutcome::Removed);
        assert!(!collection.contains(&id));
        assert_eq!(
            collection.upsert(Note::with_version("1", "buy milk", 1)),
            ApplyOutcome::Stale
        );
        assert_eq!(
            collection.upsert(Note::new("1", "late")),
            ApplyOutcome::Stale
        );
    }

    #[test]
    fn unversioned_upsert_overwrites_versioned_entry() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "buy milk", 3));
        assert_eq!(
            collection.upsert(Note::new("1", "edited")),
            ApplyOutcome::Replaced
        );
        assert_eq!(texts(&collection), vec!["edited"]);
        assert_eq!(
            collection.upsert(Note::with_version("1", "older", 2)),
            ApplyOutcome::Stale
        );
        assert_eq!(
            collection.upsert(Note::with_version("1", "newer", 4)),
            ApplyOutcome::Replaced
        );
        assert_eq!(texts(&collection), vec!["newer"]);
    }

    #[test]
    fn merge_listing_drops_missing_known_entries_only() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "kept", 1));
        collection.upsert(Note::with_version("2", "gone", 1));
        let known = collection.ids();
        collection.upsert(Note::with_version("3", "fresh", 1));

        let summary = collection
            .merge_listing(
                &known,
                vec![
                    Note::with_version("1", "kept v2", 2),
                    Note::with_version("4", "missed", 1),
                ],
            )
            .expect("collection is open");
        assert_eq!(summary.changed, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(texts(&collection), vec!["kept v2", "fresh", "missed"]);
        assert_eq!(
            collection.upsert(Note::with_version("2", "gone", 1)),
            ApplyOutcome::Stale
        );
    }

    #[test]
    fn closed_collection_rejects_all_writes() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("1", "a", 1));
        collection.close();
        assert_eq!(
            collection.upsert(Note::with_version("2", "b", 1)),
            ApplyOutcome::Closed
        );
        assert_eq!(
            collection.remove(&NoteId::new("1"), 2),
            ApplyOutcome::Closed
        );
        assert!(collection.replace_all(Vec::new()).is_none());
        assert!(collection.merge_listing(&[], Vec::new()).is_none());
        assert_eq!(texts(&collection), vec!["a"]);
        assert_eq!(collection.applied_events(), 1);
    }

    #[test]
    fn replace_all_keeps_newer_local_revision_in_snapshot_position() {
        let mut collection = NoteCollection::new();
        collection.upsert(Note::with_version("2", "fresh", 5));
        let summary = collection
            .replace_all(vec![
                Note::with_version("1", "first", 1),
                Note::with_version("2", "old", 4),
            ])
            .expect("collection is open");
        assert_eq!(summary.installed, 2);
        assert_eq!(summary.carried_over, 0);
        assert_eq!(texts(&collection), vec!["first", "fresh"]);
    }
}
