//! The publication side of change detection.
//!
//! A cycle tick drains an agency's pending queue under its lock and swaps
//! in a fresh one, so updates arriving mid-flush land in the next cycle's
//! queue. Whether the drain warrants a page follows the empty-cycle
//! policy: an idle agency publishes one trailing empty page after its
//! last non-empty one, then goes quiet.

use crate::types::Event;
use tracing::debug;

use super::engine::ChangeDetector;

/// Outcome of draining one agency for one cycle.
#[derive(Debug)]
pub struct CycleDrain {
    /// Drained events in submission order.
    pub events: Vec<Event>,

    /// Whether this cycle should produce a page.
    pub publish: bool,

    /// The published count before this drain, needed to roll the state
    /// back if the page write fails.
    pub prior_published: usize,
}

impl ChangeDetector {
    /// Drain an agency's pending queue for one publication cycle.
    ///
    /// Returns `None` for agencies that never received an update.
    pub fn drain_cycle(&self, agency: &str) -> Option<CycleDrain> {
        let state = self.state(agency)?;
        let (events, prior_published) = state.lock().rotate(self.retention_cycles());

        if events.is_empty() {
            debug!(agency, "no events pending for this cycle");
        }

        // Zero drained and zero previously published: nothing to say, skip
        // the page. Zero drained after a non-empty cycle: publish one empty
        // page so replay consumers see the log advance past their cursor.
        let publish = !events.is_empty() || prior_published > 0;
        Some(CycleDrain {
            events,
            publish,
            prior_published,
        })
    }

    /// Return a failed cycle's events to the head of the agency's queue so
    /// the next cycle retries them.
    pub fn requeue(&self, agency: &str, events: Vec<Event>, prior_published: usize) {
        if let Some(state) = self.state(agency) {
            state.lock().requeue(events, prior_published);
        }
    }
}
