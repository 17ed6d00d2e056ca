//! Push-feed reconciliation.
//!
//! # Responsibility
//! - Consume the created/updated/deleted feeds and fold them into state.
//! - Own feed lifetimes: resubscribe on failure, release on teardown.

pub mod reconciler;
