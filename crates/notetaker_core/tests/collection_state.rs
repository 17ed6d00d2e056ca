use notetaker_core::{ApplyOutcome, Note, NoteCollection, NoteId, SharedCollection};
use std::collections::HashSet;
use std::thread;

fn entries(collection: &NoteCollection) -> Vec<(String, String)> {
    collection
        .list()
        .map(|note| (note.id.to_string(), note.text))
        .collect()
}

#[test]
fn delete_event_removes_existing_note() {
    let mut collection = NoteCollection::new();
    collection.upsert(Note::with_version("1", "buy milk", 1));

    assert_eq!(
        collection.remove(&NoteId::new("1"), 2),
        ApplyOutcome::Removed
    );
    assert!(collection.is_empty());
}

#[test]
fn duplicate_update_leaves_state_unchanged() {
    let mut collection = NoteCollection::new();
    collection.upsert(Note::with_version("1", "a", 1));

    assert_eq!(
        collection.upsert(Note::with_version("1", "b", 2)),
        ApplyOutcome::Replaced
    );
    assert_eq!(
        collection.upsert(Note::with_version("1", "b", 2)),
        ApplyOutcome::Unchanged
    );
    assert_eq!(entries(&collection), vec![("1".to_string(), "b".to_string())]);
}

#[test]
fn duplicate_create_yields_single_entry() {
    let mut collection = NoteCollection::new();
    assert_eq!(
        collection.upsert(Note::with_version("2", "x", 1)),
        ApplyOutcome::Inserted
    );
    assert_eq!(
        collection.upsert(Note::with_version("2", "x", 1)),
        ApplyOutcome::Unchanged
    );
    assert_eq!(collection.len(), 1);
}

#[test]
fn unversioned_duplicates_are_idempotent() {
    let mut collection = NoteCollection::new();
    collection.upsert(Note::new("1", "a"));
    collection.upsert(Note::new("1", "b"));
    collection.upsert(Note::new("1", "b"));
    assert_eq!(entries(&collection), vec![("1".to_string(), "b".to_string())]);
}

#[test]
fn delete_wins_in_every_arrival_order() {
    let create = || (true, Note::with_version("7", "created", 1));
    let update = || (true, Note::with_version("7", "edited", 2));
    let delete = || (false, Note::with_version("7", "", 3));
    let orders = [
        [create(), update(), delete()],
        [create(), delete(), update()],
        [update(), create(), delete()],
        [update(), delete(), create()],
        [delete(), create(), update()],
        [delete(), update(), create()],
    ];

    for order in orders {
        let mut collection = NoteCollection::new();
        for (is_upsert, note) in order {
            if is_upsert {
                collection.upsert(note);
            } else {
                collection.remove(&note.id, note.version);
            }
        }
        assert!(
            !collection.contains(&NoteId::new("7")),
            "deleted note resurrected"
        );
    }
}

#[test]
fn latest_update_wins_regardless_of_arrival_order() {
    let mut collection = NoteCollection::new();
    collection.upsert(Note::with_version("1", "v3", 3));
    collection.upsert(Note::with_version("1", "v1", 1));
    collection.upsert(Note::with_version("1", "v2", 2));
    assert_eq!(entries(&collection), vec![("1".to_string(), "v3".to_string())]);
}

#[test]
fn new_notes_append_in_arrival_order() {
    let mut collection = NoteCollection::new();
    collection.upsert(Note::with_version("a", "first", 1));
    collection.upsert(Note::with_version("b", "second", 1));
    collection.upsert(Note::with_version("c", "third", 1));
    let ids: Vec<String> = collection.list().map(|note| note.id.to_string()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn replace_all_skips_tombstoned_and_carries_raced_inserts() {
    let mut collection = NoteCollection::new();
    collection.remove(&NoteId::new("gone"), 2);
    collection.upsert(Note::with_version("raced", "arrived early", 1));

    let summary = collection
        .replace_all(vec![
            Note::with_version("keep", "kept", 1),
            Note::with_version("gone", "stale listing", 1),
        ])
        .unwrap();

    assert_eq!(summary.installed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.carried_over, 1);
    assert_eq!(
        entries(&collection),
        vec![
            ("keep".to_string(), "kept".to_string()),
            ("raced".to_string(), "arrived early".to_string()),
        ]
    );
}

#[test]
fn replace_all_deduplicates_snapshot_ids() {
    let mut collection = NoteCollection::new();
    let summary = collection
        .replace_all(vec![
            Note::with_version("1", "old", 1),
            Note::with_version("1", "new", 2),
            Note::new("", "no id"),
        ])
        .unwrap();
    assert_eq!(summary.installed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(entries(&collection), vec![("1".to_string(), "new".to_string())]);
}

#[test]
fn list_is_a_snapshot_unaffected_by_later_writes() {
    let collection = SharedCollection::new();
    collection.upsert(Note::with_version("1", "a", 1));
    let listed = collection.list();
    collection.upsert(Note::with_version("2", "b", 1));
    assert_eq!(listed.count(), 1);
    assert_eq!(collection.len(), 2);
}

#[test]
fn concurrent_writers_never_duplicate_ids() {
    let collection = SharedCollection::new();
    let writers: Vec<_> = (0..8)
        .map(|worker| {
            let collection = collection.clone();
            thread::spawn(move || {
                for round in 0..200_u64 {
                    let id = format!("note-{}", round % 10);
                    if worker % 3 == 0 && round % 7 == 0 {
                        collection.remove(&NoteId::new(id), round);
                    } else {
                        collection.upsert(Note::with_version(id, format!("w{worker}"), round));
                    }
                    let ids: Vec<NoteId> = collection.list().map(|note| note.id).collect();
                    let unique: HashSet<&NoteId> = ids.iter().collect();
                    assert_eq!(unique.len(), ids.len());
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    assert!(collection.len() <= 10);
}
