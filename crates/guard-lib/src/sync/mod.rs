//! Status exchange through the shared store
//!
//! This module provides:
//! - The [`StatusStore`] contract with HTTP and in-memory implementations
//! - [`StatusPublisher`] for the signal-producing side (best-effort push)
//! - [`StatusSynchronizer`] for the observing side (fixed-interval poll)

mod http;
mod publisher;
mod store;
mod synchronizer;


pub use http::{HttpStatusStore, LatestStatusResponse, VitalSignsPayload};
pub use publisher::{
    truncate_advice, Advisory, PublisherConfig, StatusPublisher, ADVISORY_DISPLAY_CHARS,
    DEFAULT_PUBLISH_TIMEOUT, OFFLINE_ADVISORY,
};
pub use store::{InMemoryStatusStore, PollError, PublishError, StatusStore, StoreError, StoreReply};
pub use synchronizer::{
    StatusSynchronizer, SyncConfig, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
};
