//! Durable, per-agency page store.
//!
//! One directory per agency, one immutable JSON file per published page,
//! named by the page timestamp in zero-padded millisecond form so the
//! directory listing sorts in publication order. Writes go through a
//! temporary file and a rename, so readers never observe partial pages.

use crate::error::{FeedError, Result};
use crate::pages::document::{Page, PageBody};
use crate::types::Timestamp;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Page file extension.
const PAGE_EXT: &str = "json";

fn page_file_name(timestamp: Timestamp) -> String {
    format!("{:020}.{}", timestamp.0, PAGE_EXT)
}

fn parse_page_file_name(name: &str) -> Option<Timestamp> {
    let stem = name.strip_suffix(PAGE_EXT)?.strip_suffix('.')?;
    stem.parse::<i64>().ok().map(Timestamp)
}

/// Result of a floor lookup in an agency's page log.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// The page with the greatest timestamp at or before the cursor. A
    /// cursor before the oldest page resolves to the oldest page, so
    /// replay never skips history.
    Found {
        page: Page,
        previous: Option<Timestamp>,
        next: Option<Timestamp>,
    },

    /// The cursor is past every published page.
    LiveEdge { latest: Timestamp },

    /// Unknown agency, or no pages published yet.
    Missing,
}

/// Append-only store of published pages, indexed by timestamp.
pub struct PageStore {
    /// Base directory, one subdirectory per agency.
    root: PathBuf,

    /// Sorted publication timestamps per agency.
    indexes: RwLock<HashMap<String, Vec<Timestamp>>>,

    /// Recently read pages.
    cache: Mutex<LruCache<(String, Timestamp), Page>>,

    /// Serializes appends; readers only touch the index read lock.
    write_lock: Mutex<()>,
}

impl PageStore {
    /// Open the store, scanning existing agency directories to rebuild the
    /// timestamp indexes.
    pub fn open(root: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut indexes = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let agency = name.to_string_lossy();
            if agency.starts_with('.') {
                continue;
            }

            let mut timestamps = Vec::new();
            for page_entry in fs::read_dir(entry.path())? {
                let page_entry = page_entry?;
                let file_name = page_entry.file_name();
                if let Some(timestamp) = parse_page_file_name(&file_name.to_string_lossy()) {
                    timestamps.push(timestamp);
                }
            }
            timestamps.sort();
            indexes.insert(agency.into_owned(), timestamps);
        }

        let cache_size = NonZeroUsize::new(cache_size.max(1)).expect("cache size is at least 1");

        Ok(Self {
            root,
            indexes: RwLock::new(indexes),
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        })
    }

    /// Create the storage location for an agency if it is new.
    ///
    /// Returns `true` if the agency was created by this call.
    pub fn ensure_agency(&self, agency: &str) -> Result<bool> {
        if agency.is_empty()
            || agency.starts_with('.')
            || agency.contains('/')
            || agency.contains('\\')
        {
            return Err(FeedError::InvalidAgency(agency.to_string()));
        }

        if self.indexes.read().contains_key(agency) {
            return Ok(false);
        }

        fs::create_dir_all(self.root.join(agency))?;
        let created = self
            .indexes
            .write()
            .insert(agency.to_string(), Vec::new())
            .is_none();
        Ok(created)
    }

    pub fn contains_agency(&self, agency: &str) -> bool {
        self.indexes.read().contains_key(agency)
    }

    pub fn agencies(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    pub fn page_count(&self, agency: &str) -> usize {
        self.indexes.read().get(agency).map_or(0, Vec::len)
    }

    pub fn total_pages(&self) -> usize {
        self.indexes.read().values().map(Vec::len).sum()
    }

    /// Timestamp of an agency's newest page.
    pub fn latest(&self, agency: &str) -> Option<Timestamp> {
        self.indexes
            .read()
            .get(agency)
            .and_then(|index| index.last().copied())
    }

    /// Durably publish a page.
    ///
    /// The page becomes visible atomically via rename, and only after the
    /// content hit disk. Timestamps must strictly increase per agency.
    pub fn append(&self, agency: &str, page: &Page) -> Result<()> {
        let _guard = self.write_lock.lock();

        {
            let indexes = self.indexes.read();
            let index = indexes
                .get(agency)
                .ok_or_else(|| FeedError::AgencyNotFound(agency.to_string()))?;
            if let Some(&latest) = index.last() {
                if page.timestamp <= latest {
                    return Err(FeedError::StalePageTimestamp {
                        agency: agency.to_string(),
                        timestamp: page.timestamp,
                    });
                }
            }
        }

        let dir = self.root.join(agency);
        let file_name = page_file_name(page.timestamp);
        let tmp_path = dir.join(format!("{file_name}.tmp"));
        let final_path = dir.join(file_name);

        let bytes = serde_json::to_vec(&page.body)?;
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;

        if let Some(index) = self.indexes.write().get_mut(agency) {
            index.push(page.timestamp);
        }
        self.cache
            .lock()
            .put((agency.to_string(), page.timestamp), page.clone());

        Ok(())
    }

    /// Binary search for the page covering `when`.
    pub fn lookup(&self, agency: &str, when: Timestamp) -> Result<Lookup> {
        let (floor, previous, next) = {
            let indexes = self.indexes.read();
            let index = match indexes.get(agency) {
                Some(index) => index,
                None => return Ok(Lookup::Missing),
            };
            let Some(&latest) = index.last() else {
                return Ok(Lookup::Missing);
            };
            if when > latest {
                return Ok(Lookup::LiveEdge { latest });
            }

            let floor_idx = index.partition_point(|t| *t <= when).saturating_sub(1);
            let previous = if floor_idx > 0 {
                Some(index[floor_idx - 1])
            } else {
                None
            };
            let next = index.get(floor_idx + 1).copied();
            (index[floor_idx], previous, next)
        };

        let page = self.read_page(agency, floor)?;
        Ok(Lookup::Found {
            page,
            previous,
            next,
        })
    }

    /// Fetch a page by its exact timestamp.
    pub fn get(&self, agency: &str, timestamp: Timestamp) -> Result<Page> {
        let known = {
            let indexes = self.indexes.read();
            let index = indexes
                .get(agency)
                .ok_or_else(|| FeedError::AgencyNotFound(agency.to_string()))?;
            index.binary_search(&timestamp).is_ok()
        };
        if !known {
            return Err(FeedError::PageNotFound {
                agency: agency.to_string(),
                timestamp,
            });
        }
        self.read_page(agency, timestamp)
    }

    fn read_page(&self, agency: &str, timestamp: Timestamp) -> Result<Page> {
        let key = (agency.to_string(), timestamp);
        if let Some(page) = self.cache.lock().get(&key) {
            return Ok(page.clone());
        }

        let path = self.root.join(agency).join(page_file_name(timestamp));
        let bytes = fs::read(&path)?;
        let body: PageBody = serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::Deserialization(e.to_string()))?;
        let page = Page::from_body(timestamp, body);

        self.cache.lock().put(key, page.clone());
        Ok(page)
    }
}
