//! # Headway
//!
//! A multi-tenant change feed for live transit connections. Incoming
//! connection updates are diffed against remembered state per agency,
//! detected changes are published as ordered, immutable pages, and pages
//! are delivered to clients over a push stream or a catch-up-then-poll
//! protocol with cursor-based pagination.
//!
//! ## Core concepts
//!
//! - **Connections**: externally-sourced records; only type and delays
//!   participate in change detection, the rest is opaque payload
//! - **Pages**: immutable, timestamp-keyed batches of detected events,
//!   one per publication cycle per agency
//! - **Push**: subscribers replay their backlog, then stream live pages
//! - **Poll**: cursor-based pagination over the page log with
//!   previous/next navigation
//!
//! ## Example
//!
//! ```ignore
//! use headway::{EngineConfig, EventsEngine, SubscriberConfig, Timestamp};
//!
//! let engine = EventsEngine::open_or_create(EngineConfig {
//!     path: "./events".into(),
//!     ..Default::default()
//! })?;
//!
//! // The upstream feed reports connection updates.
//! engine.record_update("sncb", connection)?;
//!
//! // An external timer runs the publication cycle.
//! engine.flush_all(Timestamp(now_ms));
//!
//! // A push client attaches with its last-known timestamp.
//! let handle = engine.push_attach("sncb", last_sync, SubscriberConfig::default())?;
//! ```

pub mod clock;
pub mod detector;
pub mod engine;
pub mod error;
pub mod hub;
pub mod pages;
pub mod sync;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{AgencyState, ChangeDetector, CycleDrain};
pub use engine::{EngineConfig, EventsEngine, PublishedPage};
pub use error::{FeedError, Result};
pub use hub::{
    DropReason, PushMessage, SubscriberConfig, SubscriberHandle, SubscriberId, SubscriptionHub,
};
pub use pages::{
    EventDoc, EventResult, LinkBuilder, Lookup, Page, PageBody, PageDocument, PageStore,
    SearchTemplate,
};
pub use sync::{PollOutcome, SyncCoordinator, SyncPolicy};
pub use types::*;
