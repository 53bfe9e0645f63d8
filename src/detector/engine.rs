//! The ingestion side of change detection.

use crate::error::Result;
use crate::pages::PageStore;
use crate::types::{Connection, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::state::AgencyState;

/// Diffs incoming connection updates against remembered state, one
/// [`AgencyState`] per agency, created lazily on first use.
pub struct ChangeDetector {
    states: RwLock<HashMap<String, Arc<Mutex<AgencyState>>>>,
    retention_cycles: u32,
}

impl ChangeDetector {
    pub fn new(retention_cycles: u32) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            retention_cycles,
        }
    }

    pub(crate) fn retention_cycles(&self) -> u32 {
        self.retention_cycles
    }

    /// Ingest one connection update for an agency.
    ///
    /// Invalid input is logged and dropped; the call only fails when the
    /// agency's storage location cannot be created.
    pub fn record_update(
        &self,
        agency: &str,
        connection: Connection,
        detected_at: Timestamp,
        pages: &PageStore,
    ) -> Result<()> {
        if agency.is_empty() {
            warn!("invalid agency name, dropping connection update");
            return Ok(());
        }
        if connection.id.is_empty() {
            warn!(agency, "connection without an id, dropping update");
            return Ok(());
        }

        let state = self.state_for(agency, pages)?;
        let enqueued = state.lock().observe(connection, detected_at);
        if enqueued {
            debug!(agency, "change detected, event queued");
        }
        Ok(())
    }

    /// Get an agency's state, creating it and its storage on first use.
    fn state_for(&self, agency: &str, pages: &PageStore) -> Result<Arc<Mutex<AgencyState>>> {
        if let Some(state) = self.states.read().get(agency) {
            return Ok(Arc::clone(state));
        }

        let state = Arc::clone(
            self.states
                .write()
                .entry(agency.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(AgencyState::new()))),
        );
        if pages.ensure_agency(agency)? {
            debug!(agency, "events received for a new agency, storage created");
        }
        Ok(state)
    }

    pub(crate) fn state(&self, agency: &str) -> Option<Arc<Mutex<AgencyState>>> {
        self.states.read().get(agency).map(Arc::clone)
    }

    /// Agencies that have received at least one update.
    pub fn agencies(&self) -> Vec<String> {
        self.states.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn connection(id: &str, departure_delay: i64) -> Connection {
        Connection {
            id: id.to_string(),
            connection_type: "Connection".to_string(),
            departure_delay,
            arrival_delay: 0,
            departure_time: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_invalid_input_is_dropped_without_state() {
        let dir = TempDir::new().unwrap();
        let pages = PageStore::open(dir.path(), 16).unwrap();
        let detector = ChangeDetector::new(120);

        detector
            .record_update("", connection("c1", 0), Timestamp(1), &pages)
            .unwrap();
        detector
            .record_update("sncb", connection("", 0), Timestamp(1), &pages)
            .unwrap();

        assert!(detector.agencies().is_empty());
        assert!(!pages.contains_agency(""));
        assert!(!pages.contains_agency("sncb"));
    }

    #[test]
    fn test_first_update_creates_agency_storage() {
        let dir = TempDir::new().unwrap();
        let pages = PageStore::open(dir.path(), 16).unwrap();
        let detector = ChangeDetector::new(120);

        detector
            .record_update("sncb", connection("c1", 0), Timestamp(1), &pages)
            .unwrap();

        assert!(pages.contains_agency("sncb"));
        assert!(dir.path().join("sncb").is_dir());
        assert_eq!(detector.agencies(), vec!["sncb".to_string()]);
    }

    #[test]
    fn test_agencies_are_isolated() {
        let dir = TempDir::new().unwrap();
        let pages = PageStore::open(dir.path(), 16).unwrap();
        let detector = ChangeDetector::new(120);

        detector
            .record_update("a1", connection("c1", 0), Timestamp(1), &pages)
            .unwrap();
        detector
            .record_update("a2", connection("c1", 0), Timestamp(1), &pages)
            .unwrap();

        assert_eq!(detector.state("a1").unwrap().lock().pending_len(), 1);
        assert_eq!(detector.state("a2").unwrap().lock().pending_len(), 1);
    }
}
