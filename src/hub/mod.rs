//! Live push subscriptions.
//!
//! The hub holds the listener set per agency and fans newly published
//! pages out to them over bounded channels. Subscribers that cannot keep
//! up or have gone away are dropped during delivery; the rest are
//! unaffected. A periodic keep-alive frame, timed by the caller, keeps
//! idle connections open.
//!
//! # Example
//!
//! ```ignore
//! let hub = SubscriptionHub::new();
//! let handle = hub.subscribe("sncb", SubscriberConfig::default());
//! hub.mark_caught_up("sncb", handle.id);
//!
//! loop {
//!     match handle.recv() {
//!         Ok(PushMessage::Page { id, body }) => println!("page {id}"),
//!         Ok(PushMessage::KeepAlive) => continue,
//!         Ok(PushMessage::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionHub;
pub use types::{DropReason, PushMessage, SubscriberConfig, SubscriberHandle, SubscriberId};
