//! Connection manager behavior against the scripted stub transport, run on
//! a paused runtime so every delay is deterministic.

use gridpulse_client::clock::ManualClock;
use gridpulse_client::{ClientConfig, ConnectionManager, ConnectionState};
use gridpulse_devkit::{ConnectOutcome, FrameBuilder, SampleCollector, StubTransport};
use std::sync::Arc;
use std::time::Duration;

fn manager(transport: &StubTransport, config: &ClientConfig) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(transport.clone()),
        config,
        Arc::new(ManualClock::new(1_700_000_000_000)),
    )
}

async fn settle() {
    // Lets spawned session tasks run without advancing past any timer.
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn delivers_decoded_samples_in_arrival_order() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());
    let collector = SampleCollector::new();
    let _sub = conn.subscribe(collector.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    assert_eq!(conn.state(), ConnectionState::Open);

    let link = transport.last_link().unwrap();
    let d1 = FrameBuilder::new("D1");
    link.send_frame(&d1.frame(7, 42, 19));
    link.send_frame(&d1.frame(8, 43, 20));
    link.send_frame(&FrameBuilder::new("D2").frame(1, 2, 3));
    settle().await;

    let samples = collector.samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].device_id, "D1");
    assert_eq!(
        (samples[0].voltage, samples[0].current, samples[0].temperature),
        (7.0, 42.0, 19.0)
    );
    assert_eq!(samples[1].voltage, 8.0);
    assert_eq!(samples[2].device_id, "D2");
}

#[tokio::test(start_paused = true)]
async fn undecodable_frames_are_dropped_without_closing() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());
    let collector = SampleCollector::new();
    let _sub = conn.subscribe(collector.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    let link = transport.last_link().unwrap();

    link.send_frame(&gridpulse_devkit::frames::greeting());
    link.send_frame("D1V7C42T19"); // single-digit voltage
    link.send_frame("D1V07C42T19");
    settle().await;

    assert_eq!(conn.state(), ConnectionState::Open);
    assert_eq!(collector.len(), 1);
    assert_eq!(collector.samples()[0].voltage, 7.0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_backoff_is_exponential_and_bounded() {
    let transport = StubTransport::refusing(10);
    let config = ClientConfig::default(); // base 1000ms, cap 3
    let conn = manager(&transport, &config);

    conn.connect("ws://feed:8080");
    // Enough paused time for the whole retry schedule (1000+1500+2250 ms).
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(conn.state(), ConnectionState::Exhausted);
    let attempts = transport.attempts();
    // initial attempt + 3 retries
    assert_eq!(attempts.len(), 4);

    let deltas: Vec<Duration> = attempts
        .windows(2)
        .map(|w| w[1].at - w[0].at)
        .collect();
    assert_eq!(deltas[0], Duration::from_millis(1000));
    assert_eq!(deltas[1], Duration::from_millis(1500));
    assert_eq!(deltas[2], Duration::from_millis(2250));
    assert!(deltas[1] > deltas[0] && deltas[2] > deltas[1]);

    // Exhausted is terminal: no further attempts without an explicit connect.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.attempt_count(), 4);

    // A fresh connect resets the attempt counter and tries again.
    conn.connect("ws://feed:8080");
    settle().await;
    assert_eq!(transport.attempt_count(), 5);
    assert_eq!(conn.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn remote_close_triggers_reconnect_and_recovers() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());
    let collector = SampleCollector::new();
    let _sub = conn.subscribe(collector.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    let first = transport.last_link().unwrap();
    first.close();
    settle().await;
    assert_eq!(conn.state(), ConnectionState::Reconnecting(1));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(conn.state(), ConnectionState::Open);
    assert_eq!(transport.attempt_count(), 2);

    // The new link feeds the same subscribers.
    let second = transport.last_link().unwrap();
    second.send_frame("D1V01C02T03");
    settle().await;
    assert_eq!(collector.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent_while_open_on_same_endpoint() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());

    conn.connect("ws://feed:8080");
    settle().await;
    conn.connect("ws://feed:8080");
    settle().await;
    assert_eq!(transport.attempt_count(), 1);

    // A different endpoint tears down and reconnects.
    conn.connect("ws://other:9090");
    settle().await;
    assert_eq!(transport.attempt_count(), 2);
    assert_eq!(transport.attempts()[1].url, "ws://other:9090");
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect_and_clears_subscribers() {
    let transport = StubTransport::scripted([ConnectOutcome::Refuse]);
    let conn = manager(&transport, &ClientConfig::default());
    let collector = SampleCollector::new();
    let _sub = conn.subscribe(collector.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    assert_eq!(conn.state(), ConnectionState::Reconnecting(1));

    conn.disconnect();
    assert_eq!(conn.state(), ConnectionState::Closed);

    // The pending retry must never fire.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.attempt_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(collector.is_empty());
}

#[tokio::test(start_paused = true)]
async fn panicking_subscriber_does_not_starve_others() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());

    let _bad = conn.subscribe(|_| panic!("widget exploded"));
    let collector = SampleCollector::new();
    let _good = conn.subscribe(collector.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    let link = transport.last_link().unwrap();
    link.send_frame("D1V01C01T01");
    link.send_frame("D1V02C02T02");
    settle().await;

    assert_eq!(collector.len(), 2);
    assert_eq!(collector.samples()[1].voltage, 2.0);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_removes_exactly_one_registration() {
    let transport = StubTransport::new();
    let conn = manager(&transport, &ClientConfig::default());

    let first = SampleCollector::new();
    let sub_first = conn.subscribe(first.recorder());
    let second = SampleCollector::new();
    let _sub_second = conn.subscribe(second.recorder());

    conn.connect("ws://feed:8080");
    settle().await;
    sub_first.cancel();

    transport.last_link().unwrap().send_frame("D1V05C05T05");
    settle().await;

    assert!(first.is_empty());
    assert_eq!(second.len(), 1);
}
