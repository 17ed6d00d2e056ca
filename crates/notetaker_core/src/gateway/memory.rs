//! In-process remote store used by the CLI demo and tests.
//!
//! # Responsibility
//! - Implement `RemoteGateway` over an in-memory note list.
//! - Fan out every successful mutation to live feeds of the matching kind.
//! - Expose fault-injection hooks for failure-path testing.
//!
//! # Invariants
//! - Ids are UUID v4 strings and never reused.
//! - Every create/update/delete bumps the per-id version by one.
//! - Blank note text is rejected like a real store would.

use crate::gateway::{
    EventKind, FeedSender, GatewayError, GatewayResult, Operation, RemoteGateway, Subscription,
};
use crate::model::note::{is_submittable_text, Note, NoteId};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Default)]
struct StoreState {
    notes: Vec<Note>,
    feeds: HashMap<EventKind, Vec<FeedSender>>,
    pending_failures: HashMap<Operation, u32>,
    pending_subscribe_failures: HashMap<EventKind, u32>,
}

impl StoreState {
    fn take_failure(&mut self, operation: Operation) -> GatewayResult<()> {
        if take_one(&mut self.pending_failures, &operation) {
            return Err(GatewayError::Unavailable(format!(
                "injected {operation} failure"
            )));
        }
        Ok(())
    }

    fn check_text(operation: Operation, text: &str) -> GatewayResult<()> {
        if is_submittable_text(text) {
            return Ok(());
        }
        Err(GatewayError::Rejected(format!("{operation} with blank text")))
    }

    fn publish(&mut self, kind: EventKind, note: &Note) {
        if let Some(feeds) = self.feeds.get_mut(&kind) {
            feeds.retain(|feed| feed.deliver(note.clone()));
        }
    }

    fn position(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| &note.id == id)
    }
}

fn take_one<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, u32>, key: &K) -> bool {
    match counts.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

/// In-memory `RemoteGateway` implementation.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<StoreState>,
    latency: Option<Duration>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `notes`.
    pub fn with_notes(notes: Vec<Note>) -> Self {
        let gateway = Self::default();
        gateway.lock().notes = notes;
        gateway
    }

    /// Delays every request by `latency` before it touches the store.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next request of `operation` fail with `Unavailable`.
    pub fn fail_next(&self, operation: Operation) {
        *self.lock().pending_failures.entry(operation).or_insert(0) += 1;
    }

    /// Makes the next `times` subscribe calls for `kind` fail.
    pub fn fail_subscribe(&self, kind: EventKind, times: u32) {
        *self
            .lock()
            .pending_subscribe_failures
            .entry(kind)
            .or_insert(0) += times;
    }

    /// Terminates every live feed of `kind` without a cancel.
    pub fn sever_feed(&self, kind: EventKind) {
        let severed = self.lock().feeds.remove(&kind).map_or(0, |feeds| feeds.len());
        debug!(
            "event=feed_severed module=gateway kind={} count={}",
            kind, severed
        );
    }

    /// Ends every live feed of `kind` with `err` instead of a clean close.
    pub fn fail_feed(&self, kind: EventKind, err: GatewayError) {
        let feeds = self.lock().feeds.remove(&kind).unwrap_or_default();
        for feed in feeds {
            let delivered = feed.fail(err.clone());
            debug!(
                "event=feed_failed module=gateway kind={} delivered={} error={}",
                feed.kind(),
                delivered,
                err
            );
        }
    }

    /// Pushes a raw event to live feeds without touching stored notes.
    pub fn emit(&self, kind: EventKind, note: Note) {
        self.lock().publish(kind, &note);
    }

    /// Returns live (not cancelled) feeds of `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let mut state = self.lock();
        match state.feeds.get_mut(&kind) {
            Some(feeds) => {
                feeds.retain(|feed| !feed.is_closed());
                feeds.len()
            }
            None => 0,
        }
    }

    /// Returns the stored notes in insertion order.
    pub fn stored_notes(&self) -> Vec<Note> {
        self.lock().notes.clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteGateway for MemoryGateway {
    async fn list(&self) -> GatewayResult<Vec<Note>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.take_failure(Operation::List)?;
        Ok(state.notes.clone())
    }

    async fn create(&self, text: &str) -> GatewayResult<Note> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.take_failure(Operation::Create)?;
        StoreState::check_text(Operation::Create, text)?;

        let note = Note::with_version(Uuid::new_v4().to_string(), text, 1);
        state.notes.push(note.clone());
        state.publish(EventKind::Created, &note);
        Ok(note)
    }

    async fn update(&self, id: &NoteId, text: &str) -> GatewayResult<Note> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.take_failure(Operation::Update)?;
        StoreState::check_text(Operation::Update, text)?;

        let index = state
            .position(id)
            .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
        let note = {
            let stored = &mut state.notes[index];
            stored.text = text.to_string();
            stored.version += 1;
            stored.clone()
        };
        state.publish(EventKind::Updated, &note);
        Ok(note)
    }

    async fn delete(&self, id: &NoteId) -> GatewayResult<Note> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.take_failure(Operation::Delete)?;

        let index = state
            .position(id)
            .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
        let mut note = state.notes.remove(index);
        note.version += 1;
        state.publish(EventKind::Deleted, &note);
        Ok(note)
    }

    fn subscribe(&self, kind: EventKind) -> GatewayResult<Subscription> {
        let mut state = self.lock();
        if take_one(&mut state.pending_subscribe_failures, &kind) {
            return Err(GatewayError::Unavailable(format!(
                "injected `{kind}` subscribe failure"
            )));
        }
        let (sender, subscription) = Subscription::channel(kind);
        state.feeds.entry(kind).or_default().push(sender);
        Ok(subscription)
    }
}
