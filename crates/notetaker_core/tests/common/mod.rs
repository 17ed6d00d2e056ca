#![allow(dead_code)]

use notetaker_core::{EventKind, MemoryGateway, Note, SharedCollection};
use std::time::Duration;

/// Polls `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition should hold within the timeout");
}

/// Waits until the collection has processed `count` apply attempts.
pub async fn wait_for_applied(collection: &SharedCollection, count: u64) {
    wait_until(|| collection.applied_events() >= count).await;
}

pub fn live_feeds(gateway: &MemoryGateway) -> usize {
    EventKind::ALL
        .iter()
        .map(|kind| gateway.subscriber_count(*kind))
        .sum()
}

pub fn snapshot(collection: &SharedCollection) -> Vec<(String, String)> {
    collection
        .list()
        .map(|note: Note| (note.id.to_string(), note.text))
        .collect()
}
