//! Integration tests for the events engine.

use headway::{
    Clock, Connection, EngineConfig, EventsEngine, ManualClock, PollOutcome, PushMessage,
    SubscriberConfig, Timestamp,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn test_engine(dir: &TempDir, now: i64) -> (EventsEngine, Arc<ManualClock>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let clock = Arc::new(ManualClock::new(Timestamp(now)));
    let engine = EventsEngine::open_or_create_with_clock(
        EngineConfig {
            path: dir.path().join("events"),
            base_uri: "http://localhost:3000".to_string(),
            ..Default::default()
        },
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .unwrap();
    (engine, clock)
}

fn connection(id: &str, departure_delay: i64) -> Connection {
    Connection {
        id: format!("http://example.org/connections/{id}"),
        connection_type: "Connection".to_string(),
        departure_delay,
        arrival_delay: 0,
        departure_time: Some("2024-03-01T10:00:00.000Z".to_string()),
        extra: serde_json::Map::new(),
    }
}

// --- Change detection and publication ---

#[test]
fn test_noop_updates_never_produce_pages() {
    let dir = TempDir::new().unwrap();
    let (engine, clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    let first = engine.flush("sncb", Timestamp(10_000)).unwrap().unwrap();
    assert_eq!(first.event_count, 1);

    // The same values over and over: nothing new to publish.
    for _ in 0..5 {
        clock.advance_ms(100);
        engine.record_update("sncb", connection("c1", 0)).unwrap();
    }

    let trailer = engine.flush("sncb", Timestamp(20_000)).unwrap().unwrap();
    assert_eq!(trailer.event_count, 0);
    assert!(engine.flush("sncb", Timestamp(30_000)).unwrap().is_none());
}

#[test]
fn test_empty_cycle_policy_resets_after_trailer_page() {
    let dir = TempDir::new().unwrap();
    let (engine, _clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    assert!(engine.flush("sncb", Timestamp(10_000)).unwrap().is_some());

    // One empty page signals "caught up", then the agency goes quiet.
    let trailer = engine.flush("sncb", Timestamp(20_000)).unwrap().unwrap();
    assert_eq!(trailer.event_count, 0);
    assert!(engine.flush("sncb", Timestamp(30_000)).unwrap().is_none());
    assert!(engine.flush("sncb", Timestamp(40_000)).unwrap().is_none());
}

#[test]
fn test_delay_change_carries_latest_values() {
    let dir = TempDir::new().unwrap();
    let (engine, clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.flush("sncb", Timestamp(10_000)).unwrap();

    clock.set(Timestamp(12_000));
    engine.record_update("sncb", connection("c1", 5)).unwrap();
    let page = engine.flush("sncb", Timestamp(20_000)).unwrap().unwrap();
    assert_eq!(page.event_count, 1);

    let stored = engine.page("sncb", Timestamp(20_000)).unwrap();
    assert_eq!(stored.body.graph.len(), 1);
    assert_eq!(stored.body.graph[0].result.connection.departure_delay, 5);
    assert_eq!(stored.body.graph[0].result_time, Timestamp(12_000));
}

#[test]
fn test_flush_roundtrip_survives_reopen_byte_for_byte() {
    let dir = TempDir::new().unwrap();

    let mut original = connection("c1", 3);
    original
        .extra
        .insert("gtfs:trip".to_string(), json!("trip-88"));
    original
        .extra
        .insert("direction".to_string(), json!("Oostende"));

    {
        let (engine, _clock) = test_engine(&dir, 1000);
        engine.record_update("sncb", original.clone()).unwrap();
        engine.flush("sncb", Timestamp(10_000)).unwrap().unwrap();
    }

    // A fresh engine reads the page from disk, not from any cache.
    let (engine, _clock) = test_engine(&dir, 50_000);
    let page = engine.page("sncb", Timestamp(10_000)).unwrap();
    assert_eq!(page.body.graph.len(), 1);
    assert_eq!(page.body.graph[0].result.connection, original);
    assert_eq!(page.body.graph[0].result_time, Timestamp(1000));
}

#[test]
fn test_agencies_publish_independently() {
    let dir = TempDir::new().unwrap();
    let (engine, _clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.record_update("delijn", connection("c9", 0)).unwrap();

    let mut published = engine.flush_all(Timestamp(10_000));
    published.sort_by(|a, b| a.agency.cmp(&b.agency));

    assert_eq!(published.len(), 2);
    assert_eq!(published[0].agency, "delijn");
    assert_eq!(published[1].agency, "sncb");

    // Each agency's page holds only its own events.
    let sncb = engine.page("sncb", Timestamp(10_000)).unwrap();
    assert!(sncb.body.graph[0].result.connection.id.contains("c1"));
    let delijn = engine.page("delijn", Timestamp(10_000)).unwrap();
    assert!(delijn.body.graph[0].result.connection.id.contains("c9"));
}

// --- The end-to-end flow ---

#[test]
fn test_end_to_end_two_cycles_with_poll_navigation() {
    let dir = TempDir::new().unwrap();
    let (engine, clock) = test_engine(&dir, 1000);
    let t0 = Timestamp(1000);

    engine.record_update("a1", connection("C1", 0)).unwrap();
    let p1 = engine.flush("a1", Timestamp(10_000)).unwrap().unwrap();
    assert_eq!(p1.event_count, 1);

    clock.set(Timestamp(12_000));
    engine.record_update("a1", connection("C1", 5)).unwrap();
    let p2 = engine.flush("a1", Timestamp(20_000)).unwrap().unwrap();
    assert_eq!(p2.event_count, 1);

    // P1 is untouched by the second cycle.
    let p1_read = engine.page("a1", Timestamp(10_000)).unwrap();
    assert_eq!(p1_read.body.graph[0].result.connection.departure_delay, 0);

    // Poll at t0 resolves (via redirect) to P1.
    let redirect = match engine.poll("a1", t0).unwrap() {
        PollOutcome::Redirect(timestamp) => timestamp,
        other => panic!("expected Redirect, got {:?}", other),
    };
    assert_eq!(redirect, Timestamp(10_000));

    let page1 = match engine.poll("a1", redirect).unwrap() {
        PollOutcome::Page(document) => document,
        other => panic!("expected Page, got {:?}", other),
    };
    assert_eq!(page1.timestamp, Timestamp(10_000));
    assert_eq!(page1.previous_timestamp, None);
    assert_eq!(
        page1.next.as_deref(),
        Some("http://localhost:3000/a1/events?lastSyncTime=20000")
    );

    // Following the next link lands on P2.
    let page2 = match engine.poll("a1", page1.next_timestamp.unwrap()).unwrap() {
        PollOutcome::Page(document) => document,
        other => panic!("expected Page, got {:?}", other),
    };
    assert_eq!(page2.timestamp, Timestamp(20_000));
    assert_eq!(page2.previous_timestamp, Some(Timestamp(10_000)));
    assert_eq!(page2.next_timestamp, None);
    assert_eq!(page2.graph[0].result.connection.departure_delay, 5);

    // Poll responses carry per-event view links.
    assert_eq!(
        page2.graph[0].view.as_deref(),
        Some("http://localhost:3000/a1/connections?departureTime=2024-03-01T10:00:00.000Z")
    );
}

// --- Push delivery ---

#[test]
fn test_push_attach_replays_then_streams_live() {
    let dir = TempDir::new().unwrap();
    let (engine, clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.flush("sncb", Timestamp(10_000)).unwrap();
    clock.set(Timestamp(12_000));
    engine.record_update("sncb", connection("c1", 5)).unwrap();
    engine.flush("sncb", Timestamp(20_000)).unwrap();

    let handle = engine
        .push_attach("sncb", Timestamp(500), SubscriberConfig::default())
        .unwrap();

    // Backlog, in order, navigation stripped.
    for expected in [10_000, 20_000] {
        match handle.try_recv().unwrap() {
            PushMessage::Page { id, body } => {
                assert_eq!(id, Timestamp(expected));
                assert_eq!(body.graph.len(), 1);
                assert!(body.graph[0].view.is_none());
            }
            other => panic!("expected Page, got {:?}", other),
        }
    }
    assert!(handle.try_recv().is_err());

    // A later cycle streams straight to the subscriber.
    clock.set(Timestamp(22_000));
    engine.record_update("sncb", connection("c1", 9)).unwrap();
    engine.flush("sncb", Timestamp(30_000)).unwrap();

    match handle.try_recv().unwrap() {
        PushMessage::Page { id, body } => {
            assert_eq!(id, Timestamp(30_000));
            assert_eq!(body.graph[0].result.connection.departure_delay, 9);
        }
        other => panic!("expected Page, got {:?}", other),
    }
}

#[test]
fn test_keepalive_liveness_for_idle_subscribers() {
    let dir = TempDir::new().unwrap();
    let (engine, _clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.flush("sncb", Timestamp(10_000)).unwrap();

    let handle = engine
        .push_attach("sncb", Timestamp(10_000), SubscriberConfig::default())
        .unwrap();
    // Drain the replayed floor page.
    assert!(matches!(
        handle.try_recv(),
        Ok(PushMessage::Page { .. })
    ));

    // No data pages for a while; each heartbeat tick still reaches the
    // subscriber and it stays registered.
    for _ in 0..3 {
        assert_eq!(engine.heartbeat(), 1);
        assert!(matches!(handle.try_recv(), Ok(PushMessage::KeepAlive)));
    }
    assert_eq!(engine.stats().subscriber_count, 1);
}

#[test]
fn test_disconnected_push_client_is_pruned() {
    let dir = TempDir::new().unwrap();
    let (engine, _clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.flush("sncb", Timestamp(10_000)).unwrap();

    let handle = engine
        .push_attach("sncb", Timestamp(10_000), SubscriberConfig::default())
        .unwrap();
    drop(handle);

    // The next publication notices the dead connection and removes it.
    engine.record_update("sncb", connection("c1", 7)).unwrap();
    engine.flush("sncb", Timestamp(20_000)).unwrap();
    assert_eq!(engine.stats().subscriber_count, 0);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let dir = TempDir::new().unwrap();
    let (engine, _clock) = test_engine(&dir, 1000);

    engine.record_update("sncb", connection("c1", 0)).unwrap();
    engine.flush("sncb", Timestamp(10_000)).unwrap();

    let handle = engine
        .push_attach("sncb", Timestamp(10_000), SubscriberConfig::default())
        .unwrap();
    engine.unsubscribe("sncb", handle.id);
    assert_eq!(engine.stats().subscriber_count, 0);
}

// --- Durability across restarts ---

#[test]
fn test_poll_navigation_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let (engine, clock) = test_engine(&dir, 1000);
        engine.record_update("sncb", connection("c1", 0)).unwrap();
        engine.flush("sncb", Timestamp(10_000)).unwrap();
        clock.set(Timestamp(12_000));
        engine.record_update("sncb", connection("c1", 5)).unwrap();
        engine.flush("sncb", Timestamp(20_000)).unwrap();
    }

    let (engine, _clock) = test_engine(&dir, 30_000);
    match engine.poll("sncb", Timestamp(10_000)).unwrap() {
        PollOutcome::Page(document) => {
            assert_eq!(document.next_timestamp, Some(Timestamp(20_000)));
        }
        other => panic!("expected Page, got {:?}", other),
    }

    // New cycles continue the log where it left off.
    engine.record_update("sncb", connection("c1", 8)).unwrap();
    let page = engine.flush("sncb", Timestamp(40_000)).unwrap().unwrap();
    assert_eq!(page.timestamp, Timestamp(40_000));
    assert_eq!(engine.stats().page_count, 3);
}
