use std::fs;
use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use watch_core::{Embed, Message, DISABLED_DESTINATION};
use watch_engine::{Attempt, DrainReport, RetryQueue, WebhookNotifier, UNIT_SUFFIX};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watch_logging::initialize_for_tests);
}

fn message(text: &str) -> Message {
    Message::single(Embed {
        title: Some("PSN £50".into()),
        description: Some(text.into()),
        color: Some(3_066_993),
        ..Embed::default()
    })
}

fn notifier(queue_dir: &TempDir) -> WebhookNotifier {
    let fixed = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
    WebhookNotifier::new(RetryQueue::new(queue_dir.path().join("queue")))
        .unwrap()
        .with_clock(Arc::new(move || fixed))
}

async fn respond(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn disabled_destination_succeeds_without_sending() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);

    assert!(notifier.notify(&message("hi"), DISABLED_DESTINATION).await);
    assert!(notifier.queue().units().unwrap().is_empty());
}

#[tokio::test]
async fn delivered_message_is_posted_as_json() {
    init_logging();
    let server = MockServer::start().await;
    let sent = message("price drop");
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(&sent))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);

    let delivered = notifier.notify(&sent, &format!("{}/hook", server.uri())).await;

    assert!(delivered);
    assert!(notifier.queue().units().unwrap().is_empty());
}

#[tokio::test]
async fn failed_first_attempt_is_queued_with_destination_and_timestamp() {
    init_logging();
    let server = MockServer::start().await;
    respond(&server, "/hook", 500).await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);
    let destination = format!("{}/hook", server.uri());

    let delivered = notifier.notify(&message("lost"), &destination).await;

    assert!(!delivered);
    let units = notifier.queue().units().unwrap();
    assert_eq!(units.len(), 1);
    let name = units[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("2026-10-18T09.30.00.000000-"), "{name}");
    assert!(name.ends_with(UNIT_SUFFIX), "{name}");

    let unit = notifier.queue().load(&units[0]).unwrap();
    assert_eq!(unit.webhook_url, destination);
    assert_eq!(
        unit.message.embeds[0].timestamp.as_deref(),
        Some("2026-10-18T09:30:00+00:00")
    );
    assert_eq!(unit.message.embeds[0].description.as_deref(), Some("lost"));
}

#[tokio::test]
async fn transport_error_is_a_failure() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);

    // Nothing listens on port 9 locally.
    let delivered = notifier.notify(&message("x"), "http://127.0.0.1:9/hook").await;

    assert!(!delivered);
    assert_eq!(notifier.queue().units().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_retry_is_not_queued_again() {
    init_logging();
    let server = MockServer::start().await;
    respond(&server, "/hook", 503).await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);

    let delivered = notifier
        .deliver(&message("x"), &format!("{}/hook", server.uri()), Attempt::Retry)
        .await;

    assert!(!delivered);
    assert!(notifier.queue().units().unwrap().is_empty());
}

#[tokio::test]
async fn enqueue_failure_is_swallowed() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("queue");
    fs::write(&blocker, "a file where the queue directory should be").unwrap();
    let notifier = WebhookNotifier::new(RetryQueue::new(&blocker)).unwrap();

    assert_eq!(notifier.enqueue(&message("x"), "https://example.invalid/hook"), None);
}

#[tokio::test]
async fn drain_deletes_delivered_units_and_keeps_the_failed_one() {
    init_logging();
    let server = MockServer::start().await;
    respond(&server, "/one", 200).await;
    respond(&server, "/two", 500).await;
    respond(&server, "/three", 200).await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);
    let queue = notifier.queue().clone();
    for route in ["one", "two", "three"] {
        queue
            .push(
                &message(route),
                &format!("{}/{route}", server.uri()),
                Utc::now(),
            )
            .unwrap();
    }

    let report = notifier.drain_queue().await;

    assert_eq!(
        report,
        DrainReport {
            delivered: 2,
            retained: 1,
            unreadable: 0,
            undeleted: 0,
        }
    );
    let remaining = queue.units().unwrap();
    assert_eq!(remaining.len(), 1);
    let unit = queue.load(&remaining[0]).unwrap();
    assert!(unit.webhook_url.ends_with("/two"));
}

#[tokio::test]
async fn drain_skips_unreadable_units() {
    init_logging();
    let server = MockServer::start().await;
    respond(&server, "/ok", 200).await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);
    let queue = notifier.queue().clone();
    fs::create_dir_all(queue.dir()).unwrap();
    fs::write(queue.dir().join("0000-broken-vouchers.json"), "{").unwrap();
    queue
        .push(&message("ok"), &format!("{}/ok", server.uri()), Utc::now())
        .unwrap();

    let report = notifier.drain_queue().await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.unreadable, 1);
    assert_eq!(queue.units().unwrap().len(), 1);
}

#[tokio::test]
async fn draining_a_missing_queue_is_a_no_op() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);

    assert_eq!(notifier.drain_queue().await, DrainReport::default());
}

#[tokio::test]
async fn redelivered_body_omits_the_stored_destination() {
    init_logging();
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let notifier = notifier(&temp);
    let queue = notifier.queue().clone();
    let destination = format!("{}/hook", server.uri());
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    queue.push(&message("again"), &destination, now).unwrap();

    let mut expected = message("again");
    expected.stamp("2026-01-01T00:00:00+00:00");
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(&expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let report = notifier.drain_queue().await;

    assert_eq!(report.delivered, 1);
    assert!(queue.units().unwrap().is_empty());
}
