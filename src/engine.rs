//! Main engine tying all components together.

use crate::clock::{Clock, SystemClock};
use crate::detector::ChangeDetector;
use crate::error::{FeedError, Result};
use crate::hub::{SubscriberConfig, SubscriberHandle, SubscriberId, SubscriptionHub};
use crate::pages::{LinkBuilder, Page, PageStore};
use crate::sync::{PollOutcome, SyncCoordinator, SyncPolicy};
use crate::types::{Connection, EngineStats, Timestamp};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base path for per-agency page storage.
    pub path: PathBuf,

    /// Base URI used for pagination and view links.
    pub base_uri: String,

    /// Cycles an unchanged connection stays remembered before it is
    /// purged from the diff snapshot.
    pub retention_cycles: u32,

    /// Staleness window for poll and push-attach cursors.
    pub max_staleness_ms: i64,

    /// Number of parsed pages kept in memory.
    pub page_cache_size: usize,

    /// Whether to create the storage location if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./events"),
            base_uri: "http://localhost:3000".to_string(),
            // One hour of 30-second cycles.
            retention_cycles: 120,
            max_staleness_ms: 24 * 60 * 60 * 1000,
            page_cache_size: 256,
            create_if_missing: true,
        }
    }
}

/// Descriptor of a page produced by a flush.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedPage {
    pub agency: String,
    pub timestamp: Timestamp,
    pub event_count: usize,
}

/// Storage manifest, verified on open.
#[derive(Serialize, Deserialize)]
struct Manifest {
    format: String,
    version: u32,
}

const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = ".lock";
const MANIFEST_FORMAT: &str = "headway-events";
const MANIFEST_VERSION: u32 = 1;

/// The events engine.
///
/// Owns change detection, the page store, the subscription hub and the
/// sync coordinator. It owns no scheduling: an external feed calls
/// [`record_update`](Self::record_update) on upstream changes, an
/// external timer calls [`flush`](Self::flush)/[`flush_all`](Self::flush_all)
/// once per publication interval and [`heartbeat`](Self::heartbeat) on
/// its own keep-alive interval.
pub struct EventsEngine {
    config: EngineConfig,

    /// Lock file for exclusive access to the storage root.
    _lock_file: File,

    clock: Arc<dyn Clock>,
    detector: ChangeDetector,
    pages: Arc<PageStore>,
    hub: Arc<SubscriptionHub>,
    sync: SyncCoordinator,
}

impl EventsEngine {
    /// Open an existing engine or create a new one, on wall-clock time.
    pub fn open_or_create(config: EngineConfig) -> Result<Self> {
        Self::open_or_create_with_clock(config, Arc::new(SystemClock))
    }

    /// Open or create with an injected clock.
    pub fn open_or_create_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let manifest_path = config.path.join(MANIFEST_FILE);
        if manifest_path.exists() {
            Self::verify_manifest(&manifest_path)?;
        } else if config.create_if_missing {
            fs::create_dir_all(&config.path)?;
            Self::write_manifest(&manifest_path)?;
        } else {
            return Err(FeedError::InvalidFormat(format!(
                "no storage at {}",
                config.path.display()
            )));
        }

        let lock_file = Self::acquire_lock(&config.path)?;

        let pages = Arc::new(PageStore::open(&config.path, config.page_cache_size)?);
        let hub = Arc::new(SubscriptionHub::new());
        let detector = ChangeDetector::new(config.retention_cycles);
        let sync = SyncCoordinator::new(
            Arc::clone(&pages),
            Arc::clone(&hub),
            Arc::clone(&clock),
            SyncPolicy {
                max_staleness_ms: config.max_staleness_ms,
            },
            LinkBuilder::new(config.base_uri.clone()),
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            clock,
            detector,
            pages,
            hub,
            sync,
        })
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let manifest = Manifest {
            format: MANIFEST_FORMAT.to_string(),
            version: MANIFEST_VERSION,
        };
        fs::write(path, serde_json::to_vec(&manifest)?)?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let bytes = fs::read(path)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::Deserialization(e.to_string()))?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(FeedError::InvalidFormat(format!(
                "unexpected storage format: {}",
                manifest.format
            )));
        }
        if manifest.version != MANIFEST_VERSION {
            return Err(FeedError::InvalidFormat(format!(
                "unsupported storage version: {}",
                manifest.version
            )));
        }
        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| FeedError::Locked)?;
        Ok(lock_file)
    }

    // --- Ingestion ---

    /// Ingest one connection update from the upstream feed.
    pub fn record_update(&self, agency: &str, connection: Connection) -> Result<()> {
        self.detector
            .record_update(agency, connection, self.clock.now(), &self.pages)
    }

    // --- Publication ---

    /// Run one publication cycle for an agency.
    ///
    /// Returns the published page descriptor, or `None` when the
    /// empty-cycle policy skipped the page. On a storage failure the
    /// drained events are requeued for the next cycle and the error is
    /// returned.
    pub fn flush(&self, agency: &str, timestamp: Timestamp) -> Result<Option<PublishedPage>> {
        let Some(drain) = self.detector.drain_cycle(agency) else {
            return Ok(None);
        };
        if !drain.publish {
            return Ok(None);
        }

        let prior_published = drain.prior_published;
        let page = Page::new(timestamp.truncate_to_seconds(), drain.events);

        match self.pages.append(agency, &page) {
            Ok(()) => {
                debug!(
                    agency,
                    timestamp = %page.timestamp,
                    events = page.len(),
                    "published events page"
                );
                self.hub.notify(agency, &page);
                Ok(Some(PublishedPage {
                    agency: agency.to_string(),
                    timestamp: page.timestamp,
                    event_count: page.len(),
                }))
            }
            Err(e) => {
                let event_count = page.len();
                error!(
                    agency,
                    events = event_count,
                    "page publication failed, requeueing events: {e}"
                );
                self.detector
                    .requeue(agency, page.into_events(), prior_published);
                Err(e)
            }
        }
    }

    /// Run one publication cycle over every known agency. Agencies are
    /// independent; one failure is logged and does not stop the sweep.
    pub fn flush_all(&self, timestamp: Timestamp) -> Vec<PublishedPage> {
        let mut published = Vec::new();
        for agency in self.detector.agencies() {
            match self.flush(&agency, timestamp) {
                Ok(Some(page)) => published.push(page),
                Ok(None) => {}
                Err(e) => error!(agency, "flush failed: {e}"),
            }
        }
        published
    }

    // --- Delivery ---

    /// Send a keep-alive frame to every open push subscriber. Returns the
    /// number of frames delivered.
    pub fn heartbeat(&self) -> usize {
        self.hub.heartbeat()
    }

    /// Resolve a poll request.
    pub fn poll(&self, agency: &str, last_sync: Timestamp) -> Result<PollOutcome> {
        self.sync.poll(agency, last_sync)
    }

    /// Attach a push client: replay its backlog, then stream live pages.
    pub fn push_attach(
        &self,
        agency: &str,
        last_sync: Timestamp,
        config: SubscriberConfig,
    ) -> Result<SubscriberHandle> {
        self.sync.push_attach(agency, last_sync, config)
    }

    /// Detach a push client; idempotent.
    pub fn unsubscribe(&self, agency: &str, id: SubscriberId) {
        self.hub.unsubscribe(agency, id);
    }

    /// Parse a raw `lastSyncTime` cursor, falling back to now.
    pub fn parse_cursor(&self, raw: &str) -> Timestamp {
        self.sync.parse_cursor(raw)
    }

    // --- Inspection ---

    /// Fetch a published page by its exact timestamp.
    pub fn page(&self, agency: &str, timestamp: Timestamp) -> Result<Page> {
        self.pages.get(agency, timestamp)
    }

    pub fn agencies(&self) -> Vec<String> {
        self.pages.agencies()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            agency_count: self.pages.agencies().len(),
            page_count: self.pages.total_pages(),
            subscriber_count: self.hub.total_subscribers(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
