//! Sync coordinator.
//!
//! Resolves a client's last-known timestamp against the page log: polls
//! get the single right page or a redirect to its canonical timestamp,
//! push attaches replay the backlog up to the live edge and then hand the
//! subscriber over to the hub for live delivery.

use crate::clock::Clock;
use crate::error::{FeedError, Result};
use crate::hub::{SubscriberConfig, SubscriberHandle, SubscriptionHub};
use crate::pages::{LinkBuilder, Lookup, PageDocument, PageStore};
use crate::types::Timestamp;
use std::sync::Arc;
use tracing::{debug, warn};

/// Policy values for client synchronization.
#[derive(Clone, Copy, Debug)]
pub struct SyncPolicy {
    /// Cursors older than this are rejected; the client must restart from
    /// the live edge. Applies to poll and push attach alike.
    pub max_staleness_ms: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            // 24 hours.
            max_staleness_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Result of resolving a poll cursor.
#[derive(Clone, Debug)]
pub enum PollOutcome {
    /// The cursor named a page exactly; here it is, with navigation.
    Page(Box<PageDocument>),

    /// The cursor fell between pages or past the live edge; re-request at
    /// this canonical timestamp.
    Redirect(Timestamp),
}

/// Serves catch-up for polling and push clients.
pub struct SyncCoordinator {
    pages: Arc<PageStore>,
    hub: Arc<SubscriptionHub>,
    clock: Arc<dyn Clock>,
    policy: SyncPolicy,
    links: LinkBuilder,
}

impl SyncCoordinator {
    pub fn new(
        pages: Arc<PageStore>,
        hub: Arc<SubscriptionHub>,
        clock: Arc<dyn Clock>,
        policy: SyncPolicy,
        links: LinkBuilder,
    ) -> Self {
        Self {
            pages,
            hub,
            clock,
            policy,
            links,
        }
    }

    /// Parse a raw cursor value. Unparseable cursors fall back to now,
    /// which skips backlog replay entirely.
    pub fn parse_cursor(&self, raw: &str) -> Timestamp {
        match Timestamp::parse(raw) {
            Some(timestamp) => timestamp,
            None => {
                warn!(raw, "unparseable lastSyncTime, treating as now");
                self.clock.now()
            }
        }
    }

    fn check_staleness(&self, last_sync: Timestamp) -> Result<()> {
        let now = self.clock.now();
        if now.0 - last_sync.0 > self.policy.max_staleness_ms {
            return Err(FeedError::OutOfSync {
                last_sync,
                window_ms: self.policy.max_staleness_ms,
            });
        }
        Ok(())
    }

    fn missing(&self, agency: &str) -> FeedError {
        if self.pages.contains_agency(agency) {
            FeedError::NoPages(agency.to_string())
        } else {
            FeedError::AgencyNotFound(agency.to_string())
        }
    }

    /// Resolve a poll request for the page covering `last_sync`.
    pub fn poll(&self, agency: &str, last_sync: Timestamp) -> Result<PollOutcome> {
        self.check_staleness(last_sync)?;

        match self.pages.lookup(agency, last_sync)? {
            Lookup::Missing => Err(self.missing(agency)),
            Lookup::LiveEdge { latest } => Ok(PollOutcome::Redirect(latest)),
            Lookup::Found {
                page,
                previous,
                next,
            } => {
                if page.timestamp == last_sync {
                    let document = self.links.page_document(agency, &page, previous, next);
                    Ok(PollOutcome::Page(Box::new(document)))
                } else {
                    Ok(PollOutcome::Redirect(page.timestamp))
                }
            }
        }
    }

    /// Attach a push client: replay every page from `last_sync` to the
    /// live edge, then register it for live delivery.
    ///
    /// Replay aborts as soon as a delivery fails, so nothing is written
    /// towards a client that went away mid-replay.
    pub fn push_attach(
        &self,
        agency: &str,
        last_sync: Timestamp,
        config: SubscriberConfig,
    ) -> Result<SubscriberHandle> {
        self.check_staleness(last_sync)?;
        if !self.pages.contains_agency(agency) {
            return Err(FeedError::AgencyNotFound(agency.to_string()));
        }

        let handle = self.hub.subscribe(agency, config);
        match self.replay(agency, last_sync, &handle) {
            Ok(replayed) => {
                debug!(agency, replayed, "push client caught up, switching to live");
                if !self.hub.mark_caught_up(agency, handle.id) {
                    return Err(FeedError::SubscriberDropped);
                }
                Ok(handle)
            }
            Err(e) => {
                self.hub.unsubscribe(agency, handle.id);
                Err(e)
            }
        }
    }

    /// Walk the page log from `cursor` to the live edge, delivering each
    /// page. Returns how many pages were replayed.
    fn replay(&self, agency: &str, mut cursor: Timestamp, handle: &SubscriberHandle) -> Result<usize> {
        let mut replayed = 0usize;
        loop {
            match self.pages.lookup(agency, cursor)? {
                Lookup::Found { page, next, .. } => {
                    let message = SubscriptionHub::page_message(&page);
                    if !self.hub.send_to(agency, handle.id, message) {
                        return Err(FeedError::SubscriberDropped);
                    }
                    replayed += 1;
                    match next {
                        Some(next) => cursor = next,
                        None => return Ok(replayed),
                    }
                }
                Lookup::LiveEdge { .. } | Lookup::Missing => return Ok(replayed),
            }
        }
    }
}
