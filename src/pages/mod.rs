//! Page documents and the durable per-agency page store.
//!
//! A page is the immutable artifact of one publication cycle: an ordered
//! graph of event documents keyed by the cycle's timestamp. Pages are
//! stored one file per page, named so a lexicographic directory scan
//! yields publication order.

mod document;
mod store;

pub use document::{EventDoc, EventResult, LinkBuilder, Page, PageBody, PageDocument, SearchTemplate};
pub use store::{Lookup, PageStore};
