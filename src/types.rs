//! Core types for the events feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Drop the sub-second part. Page timestamps are published at
    /// whole-second resolution.
    pub fn truncate_to_seconds(self) -> Self {
        Timestamp(self.0 - self.0.rem_euclid(1000))
    }

    /// Parse a decimal millisecond cursor, e.g. from a `lastSyncTime`
    /// query parameter.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().map(Timestamp)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scheduled transit link with live delay/type attributes.
///
/// Only `@type` and the two delays take part in change detection; every
/// other field is opaque payload carried through unchanged via `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Stable identifier, e.g. a connection URI.
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@type", default)]
    pub connection_type: String,

    #[serde(rename = "departureDelay", default)]
    pub departure_delay: i64,

    #[serde(rename = "arrivalDelay", default)]
    pub arrival_delay: i64,

    /// Departure time of the connection, used to build per-event view links.
    #[serde(rename = "departureTime", default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,

    /// All remaining fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Connection {
    /// Whether this connection counts as changed relative to a remembered one.
    pub fn differs_from(&self, previous: &Connection) -> bool {
        self.connection_type != previous.connection_type
            || self.departure_delay != previous.departure_delay
            || self.arrival_delay != previous.arrival_delay
    }
}

/// A detected creation or update of a connection.
///
/// Identity is `(connection.id, detected_at)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// When the change was detected.
    pub detected_at: Timestamp,

    /// The connection as observed at detection time.
    pub connection: Connection,
}

/// Counters describing the engine as a whole.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub agency_count: usize,
    pub page_count: usize,
    pub subscriber_count: usize,
}
