//! Per-agency diff state.

use crate::types::{Connection, Event, Timestamp};
use std::collections::{HashMap, VecDeque};

/// A connection as last published, plus the number of cycles it survives
/// without being observed again.
#[derive(Clone, Debug)]
pub(crate) struct Remembered {
    pub connection: Connection,
    pub retention: u32,
}

/// All diff state of one agency: the pending-event queue, the snapshot
/// diffed against, and the snapshot being built for the next cycle.
#[derive(Debug, Default)]
pub struct AgencyState {
    /// Detected changes awaiting the next publication cycle, FIFO.
    pending: VecDeque<Event>,

    /// Connection state as of the last cycle, diffed against on ingest.
    previous: HashMap<String, Remembered>,

    /// Connections observed during the active cycle.
    current: HashMap<String, Connection>,

    /// How many events the last cycle published.
    previous_published: usize,
}

impl AgencyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one connection update.
    ///
    /// The connection always lands in the current-cycle snapshot; it is
    /// enqueued only when it is new or its type or delays differ from the
    /// remembered value. Returns whether an event was enqueued.
    pub fn observe(&mut self, connection: Connection, detected_at: Timestamp) -> bool {
        let changed = match self.previous.get(&connection.id) {
            None => true,
            Some(remembered) => connection.differs_from(&remembered.connection),
        };

        self.current
            .insert(connection.id.clone(), connection.clone());

        if changed {
            self.pending.push_back(Event {
                detected_at,
                connection,
            });
        }
        changed
    }

    /// Swap out the pending queue and rotate the snapshots.
    ///
    /// Connections observed this cycle enter the previous snapshot with a
    /// full retention counter. Entries not refreshed are carried over with
    /// their counter decremented and purged when it reaches zero; the
    /// surviving set is rebuilt in one pass rather than deleted in place.
    pub fn rotate(&mut self, retention_cycles: u32) -> (Vec<Event>, usize) {
        let events: Vec<Event> = std::mem::take(&mut self.pending).into();

        let refreshed = std::mem::take(&mut self.current);
        let aged = std::mem::take(&mut self.previous);

        let mut next = HashMap::with_capacity(refreshed.len());
        for (id, connection) in refreshed {
            next.insert(
                id,
                Remembered {
                    connection,
                    retention: retention_cycles,
                },
            );
        }
        for (id, mut entry) in aged {
            if next.contains_key(&id) {
                continue;
            }
            entry.retention = entry.retention.saturating_sub(1);
            if entry.retention > 0 {
                next.insert(id, entry);
            }
        }
        self.previous = next;

        let prior_published = self.previous_published;
        self.previous_published = events.len();
        (events, prior_published)
    }

    /// Put drained events back at the head of the queue after a failed
    /// publication, ahead of anything that arrived in the meantime.
    pub fn requeue(&mut self, events: Vec<Event>, prior_published: usize) {
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
        self.previous_published = prior_published;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn remembered_len(&self) -> usize {
        self.previous.len()
    }

    pub fn previous_published(&self) -> usize {
        self.previous_published
    }
}
