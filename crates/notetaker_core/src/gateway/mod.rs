//! Remote store gateway contract.
//!
//! # Responsibility
//! - Define the request/response and push-feed surface core depends on.
//! - Provide the cancellable `Subscription` channel type gateways hand out.
//!
//! # Invariants
//! - A subscription never terminates on its own; termination without
//!   `cancel()` is a feed failure.
//! - After `Subscription::cancel()` returns, no further items are delivered.

pub mod memory;

use crate::model::note::{Note, NoteId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// One item delivered by a feed.
pub type FeedItem = GatewayResult<Note>;

/// Feed kinds published by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Updated, EventKind::Deleted];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request kinds issued against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport or backend failure reported by a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Store or network not reachable.
    Unavailable(String),
    /// Target id is unknown to the store.
    NotFound(NoteId),
    /// Store refused the request.
    Rejected(String),
    /// Feed ended without being cancelled.
    FeedClosed(EventKind),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(details) => write!(f, "remote store unavailable: {details}"),
            Self::NotFound(id) => write!(f, "note not found on remote store: {id}"),
            Self::Rejected(details) => write!(f, "remote store rejected request: {details}"),
            Self::FeedClosed(kind) => write!(f, "`{kind}` feed closed unexpectedly"),
        }
    }
}

impl Error for GatewayError {}

/// Remote store contract consumed by the coordinator and reconciler.
pub trait RemoteGateway: Send + Sync + 'static {
    /// Full snapshot of the store.
    fn list(&self) -> impl Future<Output = GatewayResult<Vec<Note>>> + Send;
    /// Creates a note; the store assigns id and version.
    fn create(&self, text: &str) -> impl Future<Output = GatewayResult<Note>> + Send;
    /// Overwrites the text of an existing note.
    fn update(&self, id: &NoteId, text: &str) -> impl Future<Output = GatewayResult<Note>> + Send;
    /// Deletes a note; the result carries the id and tombstone version.
    fn delete(&self, id: &NoteId) -> impl Future<Output = GatewayResult<Note>> + Send;
    /// Opens one long-lived feed of the given kind.
    fn subscribe(&self, kind: EventKind) -> GatewayResult<Subscription>;
}

/// Producer side of one subscription, held by the gateway.
#[derive(Debug, Clone)]
pub struct FeedSender {
    kind: EventKind,
    sender: UnboundedSender<FeedItem>,
}

impl FeedSender {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Delivers one note. Returns `false` once the consumer cancelled.
    pub fn deliver(&self, note: Note) -> bool {
        self.sender.send(Ok(note)).is_ok()
    }

    /// Reports a feed-level failure to the consumer.
    pub fn fail(&self, err: GatewayError) -> bool {
        self.sender.send(Err(err)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer side of one feed.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    receiver: UnboundedReceiver<FeedItem>,
    cancelled: bool,
}

impl Subscription {
    /// Creates a connected sender/subscription pair for `kind`.
    pub fn channel(kind: EventKind) -> (FeedSender, Subscription) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            FeedSender { kind, sender },
            Subscription {
                kind,
                receiver,
                cancelled: false,
            },
        )
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Waits for the next item.
    ///
    /// Returns `None` after `cancel()`, or when every sender is gone.
    pub async fn next(&mut self) -> Option<FeedItem> {
        if self.cancelled {
            return None;
        }
        self.receiver.recv().await
    }

    /// Releases the feed. Buffered items are discarded.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
