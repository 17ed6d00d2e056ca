//! Subscription reconciler.
//!
//! # Responsibility
//! - Run one task per feed kind and apply each event to the collection.
//! - Resubscribe feeds that error or terminate, with bounded backoff.
//! - Re-list the store after a resubscribe to recover events missed meanwhile.
//! - Cancel all feeds together and wait for their tasks on shutdown.
//!
//! # Invariants
//! - created/updated events upsert; deleted events remove with a tombstone.
//! - Duplicate and out-of-order events are absorbed by the collection's
//!   version rules, so the result does not depend on arrival order.
//! - Once `shutdown` returns, no feed task touches the collection again.
//! - Feeds are subscribed before `start` returns.
//! - At most `FAILURE_LOG_CAPACITY` failures are retained; the total is counted.

use crate::config::ResubscribePolicy;
use crate::gateway::{EventKind, GatewayError, GatewayResult, RemoteGateway, Subscription};
use crate::model::note::Note;
use crate::state::collection::{ApplyOutcome, SharedCollection};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Failure of one feed. Fatal to that feed attempt only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionError {
    pub kind: EventKind,
    pub cause: GatewayError,
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` subscription failed: {}", self.kind, self.cause)
    }
}

impl Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// Number of most recent feed failures kept by a reconciler.
pub const FAILURE_LOG_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct FailureLog {
    recent: VecDeque<SubscriptionError>,
    total: u64,
}

impl FailureLog {
    fn record(&mut self, failure: SubscriptionError) {
        if self.recent.len() == FAILURE_LOG_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(failure);
        self.total += 1;
    }
}

#[derive(Debug, Clone, Default)]
struct SharedFailures {
    inner: Arc<Mutex<FailureLog>>,
}

impl SharedFailures {
    fn lock(&self) -> MutexGuard<'_, FailureLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Applies one feed event to `collection`.
pub fn apply_event(collection: &SharedCollection, kind: EventKind, note: Note) -> ApplyOutcome {
    let id = note.id.clone();
    let version = note.version;
    let outcome = match kind {
        EventKind::Created | EventKind::Updated => collection.upsert(note),
        EventKind::Deleted => collection.remove(&id, version),
    };
    debug!(
        "event=feed_event module=sync kind={} id={} version={} outcome={}",
        kind,
        id,
        version,
        outcome.as_str()
    );
    outcome
}

/// Starts feed tasks for every event kind.
pub struct SubscriptionReconciler;

impl SubscriptionReconciler {
    /// Subscribes all three feeds and spawns their consumer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<G: RemoteGateway>(
        gateway: Arc<G>,
        collection: SharedCollection,
        policy: ResubscribePolicy,
    ) -> ReconcilerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let failures = SharedFailures::default();

        let tasks = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let feed = FeedTask {
                    kind,
                    gateway: Arc::clone(&gateway),
                    collection: collection.clone(),
                    policy,
                    cancel: cancel_rx.clone(),
                    failures: failures.clone(),
                };
                let initial = gateway.subscribe(kind);
                (kind, tokio::spawn(feed.run(initial)))
            })
            .collect();

        ReconcilerHandle {
            cancel: cancel_tx,
            tasks,
            failures,
        }
    }
}

/// Owner of the running feed tasks.
///
/// Dropping the handle without `shutdown` aborts the tasks.
pub struct ReconcilerHandle {
    cancel: watch::Sender<bool>,
    tasks: Vec<(EventKind, JoinHandle<()>)>,
    failures: SharedFailures,
}

impl ReconcilerHandle {
    /// Cancels every feed and waits until all feed tasks have exited.
    pub async fn shutdown(mut self) {
        self.cancel.send_replace(true);
        for (kind, task) in self.tasks.drain(..) {
            if let Err(err) = task.await {
                error!(
                    "event=feed_stop module=sync kind={} status=error error={}",
                    kind, err
                );
            }
        }
        info!("event=reconciler_shutdown module=sync status=ok");
    }

    /// Returns whether the feed task for `kind` is still alive.
    pub fn is_running(&self, kind: EventKind) -> bool {
        self.tasks
            .iter()
            .any(|(task_kind, task)| *task_kind == kind && !task.is_finished())
    }

    /// Returns the most recent feed failures, oldest first.
    pub fn failures(&self) -> Vec<SubscriptionError> {
        self.failures.lock().recent.iter().cloned().collect()
    }

    /// Returns how many feed failures were observed since start.
    pub fn failure_count(&self) -> u64 {
        self.failures.lock().total
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

struct FeedTask<G: RemoteGateway> {
    kind: EventKind,
    gateway: Arc<G>,
    collection: SharedCollection,
    policy: ResubscribePolicy,
    cancel: watch::Receiver<bool>,
    failures: SharedFailures,
}

impl<G: RemoteGateway> FeedTask<G> {
    async fn run(mut self, initial: GatewayResult<Subscription>) {
        let mut next = Some(initial);
        let mut consecutive_failures = 0_u32;

        loop {
            if *self.cancel.borrow() {
                break;
            }
            let attempt = next.take().unwrap_or_else(|| self.gateway.subscribe(self.kind));
            let cause = match attempt {
                Ok(mut subscription) => {
                    info!(
                        "event=feed_subscribe module=sync kind={} status=ok retries={}",
                        self.kind, consecutive_failures
                    );
                    let resubscribed = consecutive_failures > 0;
                    consecutive_failures = 0;
                    // Why: events published while this feed was down are gone
                    // for good; a listing taken after the new subscription
                    // covers them without losing anything that follows.
                    if resubscribed && !self.catch_up().await {
                        subscription.cancel();
                        break;
                    }
                    let cause = self.consume(&mut subscription).await;
                    subscription.cancel();
                    match cause {
                        Some(cause) => cause,
                        None => break,
                    }
                }
                Err(cause) => cause,
            };

            consecutive_failures += 1;
            self.record_failure(cause);
            if !self.policy.allows_attempt(consecutive_failures) {
                error!(
                    "event=feed_stop module=sync kind={} status=gave_up attempts={}",
                    self.kind, consecutive_failures
                );
                return;
            }
            if !self.wait_backoff(consecutive_failures).await {
                break;
            }
        }
        debug!(
            "event=feed_stop module=sync kind={} status=cancelled",
            self.kind
        );
    }

    /// Applies events until cancellation (`None`) or a feed failure.
    async fn consume(&mut self, subscription: &mut Subscription) -> Option<GatewayError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.changed() => return None,
                item = subscription.next() => match item {
                    Some(Ok(note)) => {
                        apply_event(&self.collection, self.kind, note);
                    }
                    Some(Err(cause)) => return Some(cause),
                    None => return Some(GatewayError::FeedClosed(self.kind)),
                },
            }
        }
    }

    /// Merges a fresh listing after a gap. Returns `false` if cancelled meanwhile.
    async fn catch_up(&mut self) -> bool {
        let known = self.collection.ids();
        let listed = tokio::select! {
            biased;
            _ = self.cancel.changed() => return false,
            listed = self.gateway.list() => listed,
        };
        match listed {
            Ok(snapshot) => {
                if let Some(summary) = self.collection.merge_listing(&known, snapshot) {
                    info!(
                        "event=feed_catch_up module=sync kind={} status=ok changed={} removed={}",
                        self.kind, summary.changed, summary.removed
                    );
                }
            }
            Err(err) => {
                warn!(
                    "event=feed_catch_up module=sync kind={} status=error error={}",
                    self.kind, err
                );
            }
        }
        true
    }

    /// Sleeps before retry `attempt`. Returns `false` if cancelled meanwhile.
    async fn wait_backoff(&mut self, attempt: u32) -> bool {
        let delay = self.policy.backoff(attempt);
        tokio::select! {
            biased;
            _ = self.cancel.changed() => false,
            _ = tokio::time::sleep(delay) => !*self.cancel.borrow(),
        }
    }

    fn record_failure(&self, cause: GatewayError) {
        let failure = SubscriptionError {
            kind: self.kind,
            cause,
        };
        warn!(
            "event=feed_failure module=sync kind={} status=error error={}",
            self.kind, failure.cause
        );
        self.failures.lock().record(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_event, FailureLog, SubscriptionError, FAILURE_LOG_CAPACITY};
    use crate::gateway::{EventKind, GatewayError};
    use crate::model::note::{Note, NoteId};
    use crate::state::collection::{ApplyOutcome, SharedCollection};

    #[test]
    fn update_event_for_absent_note_inserts() {
        let collection = SharedCollection::new();
        let outcome = apply_event(
            &collection,
            EventKind::Updated,
            Note::with_version("9", "late", 2),
        );
        assert_eq!(outcome, ApplyOutcome::Inserted);
        assert!(collection.contains(&NoteId::new("9")));
    }

    #[test]
    fn delete_then_late_create_stays_deleted() {
        let collection = SharedCollection::new();
        apply_event(
            &collection,
            EventKind::Deleted,
            Note::with_version("1", "", 2),
        );
        let outcome = apply_event(
            &collection,
            EventKind::Created,
            Note::with_version("1", "hello", 1),
        );
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(collection.is_empty());
    }

    #[test]
    fn unversioned_events_apply_over_versioned_entry() {
        let collection = SharedCollection::new();
        collection.upsert(Note::with_version("1", "buy milk", 1));

        let outcome = apply_event(&collection, EventKind::Updated, Note::new("1", "edited"));
        assert_eq!(outcome, ApplyOutcome::Replaced);
        assert_eq!(
            collection.get(&NoteId::new("1")).map(|note| note.text),
            Some("edited".to_string())
        );

        let outcome = apply_event(&collection, EventKind::Deleted, Note::new("1", ""));
        assert_eq!(outcome, ApplyOutcome::Removed);
        assert!(collection.is_empty());
    }

    #[test]
    fn failure_log_keeps_latest_entries() {
        let mut log = FailureLog::default();
        let extra = 5;
        for attempt in 0..FAILURE_LOG_CAPACITY + extra {
            log.record(SubscriptionError {
                kind: EventKind::Created,
                cause: GatewayError::Unavailable(attempt.to_string()),
            });
        }
        assert_eq!(log.recent.len(), FAILURE_LOG_CAPACITY);
        assert_eq!(log.total, (FAILURE_LOG_CAPACITY + extra) as u64);
        assert_eq!(
            log.recent.front().map(|failure| failure.cause.clone()),
            Some(GatewayError::Unavailable(extra.to_string()))
        );
    }
}
