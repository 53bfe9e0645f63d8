//! Typed page and event documents.
//!
//! The wire format keeps the JSON-LD vocabulary of the upstream feed
//! (`@id`, `@type`, `sosa:*`, `hydra:*`) but everything is structural on
//! this side of the boundary; string-keyed maps only exist inside the
//! opaque connection payload.

use crate::types::{Connection, Event, Timestamp};
use serde::{Deserialize, Serialize};

/// `@type` value of an event document.
pub const EVENT_TYPE: &str = "Event";

/// One event as it appears in a page's graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    /// `<connection id>#<detection time>`, unique per event.
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@type")]
    pub kind: String,

    #[serde(rename = "sosa:resultTime")]
    pub result_time: Timestamp,

    /// Link to the connection's departure-time view. Only attached when a
    /// page is rendered for polling, never stored and never pushed.
    #[serde(rename = "hydra:view", default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    #[serde(rename = "sosa:hasResult")]
    pub result: EventResult,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    #[serde(rename = "Connection")]
    pub connection: Connection,
}

impl EventDoc {
    pub fn from_event(event: Event) -> Self {
        Self {
            id: format!("{}#{}", event.connection.id, event.detected_at),
            kind: EVENT_TYPE.to_string(),
            result_time: event.detected_at,
            view: None,
            result: EventResult {
                connection: event.connection,
            },
        }
    }

    /// Recover the original event, e.g. to requeue it after a failed write.
    pub fn into_event(self) -> Event {
        Event {
            detected_at: self.result_time,
            connection: self.result.connection,
        }
    }
}

/// Page body as written to storage: an ordered graph of events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageBody {
    #[serde(rename = "@graph")]
    pub graph: Vec<EventDoc>,
}

/// An immutable, timestamp-keyed batch of events from one publication cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub timestamp: Timestamp,
    pub body: PageBody,
}

impl Page {
    /// Build a page from drained events, preserving their order.
    pub fn new(timestamp: Timestamp, events: Vec<Event>) -> Self {
        let graph = events.into_iter().map(EventDoc::from_event).collect();
        Self {
            timestamp,
            body: PageBody { graph },
        }
    }

    pub fn from_body(timestamp: Timestamp, body: PageBody) -> Self {
        Self { timestamp, body }
    }

    pub fn len(&self) -> usize {
        self.body.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.graph.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.body.graph.into_iter().map(EventDoc::into_event).collect()
    }
}

/// `hydra:search` block of a poll response.
#[derive(Clone, Debug, Serialize)]
pub struct SearchTemplate {
    #[serde(rename = "hydra:template")]
    pub template: String,
}

/// Poll render of a page: the stored graph annotated with navigation and
/// per-event view links. Push delivery uses the bare [`PageBody`] instead.
#[derive(Clone, Debug, Serialize)]
pub struct PageDocument {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "hydra:search")]
    pub search: SearchTemplate,

    #[serde(rename = "hydra:previous", skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,

    #[serde(rename = "hydra:next", skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(rename = "@graph")]
    pub graph: Vec<EventDoc>,

    #[serde(skip)]
    pub timestamp: Timestamp,

    #[serde(skip)]
    pub previous_timestamp: Option<Timestamp>,

    #[serde(skip)]
    pub next_timestamp: Option<Timestamp>,
}

/// Builds the link space for page documents.
#[derive(Clone, Debug)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let mut base = base_uri.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    /// Canonical URI of an agency's page at a timestamp.
    pub fn events_uri(&self, agency: &str, timestamp: Timestamp) -> String {
        format!("{}/{}/events?lastSyncTime={}", self.base, agency, timestamp)
    }

    fn template_uri(&self, agency: &str) -> String {
        format!("{}/{}/events{{?lastSyncTime}}", self.base, agency)
    }

    fn view_uri(&self, agency: &str, departure_time: &str) -> String {
        format!(
            "{}/{}/connections?departureTime={}",
            self.base, agency, departure_time
        )
    }

    /// Annotate a stored page for a poll response.
    pub fn page_document(
        &self,
        agency: &str,
        page: &Page,
        previous: Option<Timestamp>,
        next: Option<Timestamp>,
    ) -> PageDocument {
        let mut graph = page.body.graph.clone();
        for event in &mut graph {
            if let Some(departure_time) = event.result.connection.departure_time.as_deref() {
                event.view = Some(self.view_uri(agency, departure_time));
            }
        }

        PageDocument {
            id: self.events_uri(agency, page.timestamp),
            search: SearchTemplate {
                template: self.template_uri(agency),
            },
            previous: previous.map(|t| self.events_uri(agency, t)),
            next: next.map(|t| self.events_uri(agency, t)),
            graph,
            timestamp: page.timestamp,
            previous_timestamp: previous,
            next_timestamp: next,
        }
    }
}
