mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stagecast_core::config::QueueConfig;
use stagecast_queue::{EventKind, EventQueue, HoldDurations, QueueError};
use support::{payload, RecordingSink};
use tokio::time::Instant;

/// Holds run on the paused clock; allow for timer-wheel rounding only.
fn assert_held(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(50),
        "held {actual:?}, expected {expected:?}"
    );
}

fn seq_of(id: &str) -> u64 {
    id.rsplit('-').next().unwrap().parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn three_messages_are_shown_one_after_another() {
    let sink = RecordingSink::new();
    let queue = EventQueue::new(&QueueConfig::default(), sink.clone());
    queue.start();

    for n in 1..=3 {
        queue
            .enqueue(EventKind::Message, payload(json!({"name": "ana", "content": n})))
            .unwrap();
    }
    queue.shutdown().await;

    let starts = sink.named("overlay_message");
    let ends = sink.named("overlay_message_end");
    assert_eq!(sink.ids_of("overlay_message"), ["message-1", "message-2", "message-3"]);
    assert_eq!(sink.ids_of("overlay_message_end"), ["message-1", "message-2", "message-3"]);

    for (start, end) in starts.iter().zip(&ends) {
        assert_held(end.at - start.at, Duration::from_secs(8));
    }
    assert!(ends[2].at - starts[0].at >= Duration::from_secs(16));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_dispatch_in_acceptance_order() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone());
    queue.start();

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let queue = queue.clone();
            tokio::spawn(async move {
                (0..25)
                    .map(|n| {
                        queue
                            .enqueue(
                                EventKind::Message,
                                payload(json!({"producer": producer, "n": n})),
                            )
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut accepted = Vec::new();
    for producer in producers {
        accepted.extend(producer.await.unwrap());
    }
    queue.shutdown().await;

    accepted.sort_by_key(|id| seq_of(id));
    let dispatched = sink.ids_of("overlay_message");
    assert_eq!(dispatched.len(), 200);
    assert_eq!(dispatched, accepted);
}

#[tokio::test(start_paused = true)]
async fn consecutive_events_never_overlap() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::default(), Duration::ZERO, sink.clone());
    queue.start();

    let kinds = [
        EventKind::Message,
        EventKind::Screenshot,
        EventKind::Poll,
        EventKind::SessionUpdate,
        EventKind::Message,
    ];
    let ids: Vec<String> = kinds
        .iter()
        .map(|kind| queue.enqueue(*kind, payload(json!({}))).unwrap())
        .collect();
    queue.shutdown().await;

    // on-screen window per event: first to last emission carrying its id
    let mut windows: HashMap<String, (Instant, Instant)> = HashMap::new();
    for emission in sink.emissions() {
        let window = windows
            .entry(emission.id().to_string())
            .or_insert((emission.at, emission.at));
        window.0 = window.0.min(emission.at);
        window.1 = window.1.max(emission.at);
    }

    for pair in ids.windows(2) {
        let (_, prev_end) = windows[&pair[0]];
        let (next_start, _) = windows[&pair[1]];
        assert!(next_start >= prev_end, "{} overlapped {}", pair[1], pair[0]);
    }
    let (poll_start, poll_end) = windows["poll-3"];
    assert_held(poll_end - poll_start, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn stop_mid_hold_lets_the_current_event_finish() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::default(), Duration::ZERO, sink.clone());
    queue.start();
    queue
        .enqueue(EventKind::Message, payload(json!({"content": "hi"})))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(queue.status().processing);

    queue.stop();
    let late = queue.enqueue(EventKind::Message, payload(json!({"content": "late"})));
    assert!(matches!(late, Err(QueueError::Closed)));

    queue.shutdown().await;

    assert_eq!(sink.ids_of("overlay_message"), ["message-1"]);
    assert_eq!(sink.ids_of("overlay_message_end"), ["message-1"]);
    let start = &sink.named("overlay_message")[0];
    let end = &sink.named("overlay_message_end")[0];
    assert_held(end.at - start.at, Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn everything_accepted_before_stop_is_dispatched_once() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone());

    for _ in 0..3 {
        queue.enqueue(EventKind::Poll, payload(json!({}))).unwrap();
    }
    queue.stop();
    assert!(queue.enqueue(EventKind::Poll, payload(json!({}))).is_err());

    queue.start();
    queue.shutdown().await;

    assert_eq!(sink.ids_of("overlay_poll"), ["poll-1", "poll-2", "poll-3"]);
    assert_eq!(queue.status().queue_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_start_notification_still_ends_the_event() {
    let sink = RecordingSink::failing_on("overlay_message");
    let queue = EventQueue::with_timings(HoldDurations::default(), Duration::ZERO, sink.clone());
    queue.start();
    queue.enqueue(EventKind::Message, payload(json!({}))).unwrap();
    queue.enqueue(EventKind::Poll, payload(json!({}))).unwrap();
    queue.shutdown().await;

    let end = &sink.named("overlay_message_end")[0];
    let start = &sink.named("overlay_message")[0];
    assert_eq!(end.id(), "message-1");
    assert_held(end.at - start.at, Duration::from_secs(8));
    assert_eq!(sink.ids_of("overlay_poll"), ["poll-2"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_sink_does_not_kill_the_worker() {
    let sink = RecordingSink::panicking_on("new_poll");
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone());
    queue.start();
    queue.enqueue(EventKind::Poll, payload(json!({}))).unwrap();
    queue.enqueue(EventKind::Message, payload(json!({}))).unwrap();
    queue.shutdown().await;

    assert_eq!(sink.ids_of("overlay_poll_end"), ["poll-1"]);
    assert_eq!(sink.ids_of("overlay_message"), ["message-2"]);
}

#[tokio::test(start_paused = true)]
async fn priority_never_reorders_dispatch() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone());
    queue
        .enqueue_with_priority(EventKind::Message, payload(json!({})), 0)
        .unwrap();
    queue
        .enqueue_with_priority(EventKind::Message, payload(json!({})), 100)
        .unwrap();
    queue.shutdown().await;

    assert_eq!(sink.ids_of("overlay_message"), ["message-1", "message-2"]);
    let starts = sink.named("overlay_message");
    assert_eq!(starts[0].payload["priority"], 0);
    assert_eq!(starts[1].payload["priority"], 100);
}

#[tokio::test(start_paused = true)]
async fn hold_duration_comes_from_config() {
    let sink = RecordingSink::new();
    let config = QueueConfig {
        poll_hold_ms: 5_000,
        inter_event_gap_ms: 0,
        ..QueueConfig::default()
    };
    let queue = EventQueue::new(&config, sink.clone());
    queue.start();
    queue.enqueue(EventKind::Poll, payload(json!({}))).unwrap();
    queue.shutdown().await;

    let start = &sink.named("overlay_poll")[0];
    let end = &sink.named("overlay_poll_end")[0];
    assert_held(end.at - start.at, Duration::from_secs(5));
    assert_eq!(start.payload["displayDurationMs"], 5_000);
}

#[tokio::test(start_paused = true)]
async fn inter_event_gap_spaces_events() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::from_secs(1), sink.clone());
    queue.start();
    queue.enqueue(EventKind::Screenshot, payload(json!({}))).unwrap();
    queue.enqueue(EventKind::Screenshot, payload(json!({}))).unwrap();
    queue.shutdown().await;

    let shots = sink.named("new_screenshot");
    assert_eq!(shots.len(), 2);
    assert!(shots[1].at - shots[0].at >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn notifications_target_the_right_audience() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone());
    queue
        .enqueue(EventKind::Message, payload(json!({"name": "ana", "content": "oi"})))
        .unwrap();
    queue
        .enqueue(EventKind::SessionUpdate, payload(json!({"title": "Live #1"})))
        .unwrap();
    queue.shutdown().await;

    let start = &sink.named("overlay_message")[0];
    assert_eq!(start.scope.as_deref(), Some("overlay-messages"));
    assert_eq!(start.payload["type"], "message");
    assert_eq!(start.payload["payload"]["content"], "oi");

    let generic = &sink.named("new_message")[0];
    assert_eq!(generic.scope, None);
    assert_eq!(generic.payload["id"], "message-1");
    assert_eq!(generic.payload["name"], "ana");

    let end = &sink.named("overlay_message_end")[0];
    assert_eq!(end.scope.as_deref(), Some("overlay-messages"));
    assert_eq!(end.payload, json!({"id": "message-1"}));

    let live = &sink.named("live_updated")[0];
    assert_eq!(live.scope, None);
    assert_eq!(live.payload["payload"]["title"], "Live #1");
    assert!(sink.named("live_updated_end").is_empty());
}

#[tokio::test(start_paused = true)]
async fn status_tracks_the_worker() {
    let sink = RecordingSink::new();
    let queue = EventQueue::with_timings(HoldDurations::default(), Duration::ZERO, sink.clone());
    queue.start();
    queue.enqueue(EventKind::Poll, payload(json!({}))).unwrap();
    queue.enqueue(EventKind::Message, payload(json!({}))).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let status = queue.status();
    assert!(status.processing);
    assert!(status.worker_alive);
    assert_eq!(status.queue_depth, 1);

    queue.shutdown().await;
    let status = queue.status();
    assert!(!status.processing);
    assert!(!status.worker_alive);
}

#[tokio::test(start_paused = true)]
async fn start_while_draining_does_not_spawn_a_second_worker() {
    let sink = RecordingSink::new();
    let queue = EventQueue::new(&QueueConfig::default(), sink.clone());
    queue.start();
    queue.enqueue(EventKind::Message, payload(json!({"n": 1}))).unwrap();
    queue.enqueue(EventKind::Message, payload(json!({"n": 2}))).unwrap();

    let draining = queue.clone();
    let shutdown = tokio::spawn(async move { draining.shutdown().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.status().worker_alive);
    queue.start();
    shutdown.await.unwrap();

    // both ends are out by the time shutdown returns
    let ends = sink.named("overlay_message_end");
    assert_eq!(sink.ids_of("overlay_message_end"), ["message-1", "message-2"]);
    let starts = sink.named("overlay_message");
    assert_eq!(starts.len(), 2);
    assert!(starts[1].at >= ends[0].at, "message-2 started before message-1 ended");
    assert!(!queue.status().worker_alive);
}

#[tokio::test]
async fn queue_handles_are_shareable_across_tasks() {
    let sink = RecordingSink::new();
    let queue = Arc::new(EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, sink.clone()));
    queue.start();
    let producer = Arc::clone(&queue);
    tokio::spawn(async move { producer.enqueue(EventKind::Screenshot, payload(json!({}))) })
        .await
        .unwrap()
        .unwrap();
    queue.shutdown().await;
    assert_eq!(sink.named("new_screenshot").len(), 1);
}
