//! Worker tests against a mocked publisher and an in-process browser

use crate::fake::FakeRecorder;
use crate::fakes::{echo_launcher, PanickingSink, RecordingSink, SLOW_MARKER};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::Config;
use sumi_harvest::worker::Worker;
use sumi_harvest::HarvestError;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn worker_config(publisher_url: &str, restart_interval: usize, max_pages: usize) -> Config {
    let mut config = Config::default();
    config.worker.publisher_url = publisher_url.to_string();
    config.worker.restart_interval = restart_interval;
    config.worker.max_pages = max_pages;
    config.worker.idle_backoff_ms = 10;
    config.browser.navigation_timeout_secs = 1;
    config.browser.settle_ms = 0;
    config
}

/// Serves each task exactly once, in order, then answers 204
async fn mount_tasks(server: &MockServer, tasks: &[(&str, &str)]) {
    for (id, url) in tasks {
        Mock::given(method("GET"))
            .and(path("/task"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": id, "url": url})),
            )
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/task"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

async fn mount_ack(server: &MockServer, id: &str) {
    Mock::given(method("POST"))
        .and(path("/done"))
        .and(body_json(serde_json::json!({"id": id, "type": "complete"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_navigation_timeout_is_acknowledged_but_not_stored() {
    let server = MockServer::start().await;
    let slow_url = format!("http://{}.example/", SLOW_MARKER);
    mount_tasks(&server, &[("t1", slow_url.as_str())]).await;
    mount_ack(&server, "t1").await;

    let launcher = Arc::new(echo_launcher(Duration::ZERO));
    let sink = Arc::new(RecordingSink::default());
    let config = worker_config(&server.uri(), 1, 4);
    let worker = Worker::new(&config, launcher.clone(), sink.clone()).unwrap();

    let report = worker.run_generation().await.unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.stored, 0);
    assert!(sink.ids().is_empty());
    assert_eq!(FakeRecorder::get(&launcher.recorder.closed), 1);
}

#[tokio::test]
async fn test_generation_captures_stores_and_acknowledges() {
    let server = MockServer::start().await;
    mount_tasks(
        &server,
        &[
            ("a", "https://a.example/"),
            ("b", "https://b.example/"),
            ("c", "https://c.example/"),
        ],
    )
    .await;
    for id in ["a", "b", "c"] {
        mount_ack(&server, id).await;
    }

    let launcher = Arc::new(echo_launcher(Duration::from_millis(50)));
    let sink = Arc::new(RecordingSink::default());
    let config = worker_config(&server.uri(), 3, 2);
    let worker = Worker::new(&config, launcher.clone(), sink.clone()).unwrap();

    let report = worker.run_generation().await.unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.stored, 3);
    assert_eq!(sink.ids(), vec!["a", "b", "c"]);

    let saved = sink.saved.lock().unwrap();
    let (_, artifact) = saved.iter().find(|(id, _)| id == "b").unwrap();
    assert_eq!(artifact.url, "https://b.example/");
    assert!(artifact.html.contains("https://b.example/"));
    assert!(!artifact.screenshot.is_empty());

    let recorder = &launcher.recorder;
    assert!(FakeRecorder::get(&recorder.max_open) <= 2);
    assert_eq!(FakeRecorder::get(&recorder.opened), 3);
    assert_eq!(FakeRecorder::get(&recorder.closed), 3);
    assert_eq!(FakeRecorder::get(&recorder.launched), 1);
    assert_eq!(FakeRecorder::get(&recorder.browser_closed), 1);
}

#[tokio::test]
async fn test_persistence_failure_still_acknowledged() {
    let server = MockServer::start().await;
    mount_tasks(&server, &[("t1", "https://a.example/")]).await;
    mount_ack(&server, "t1").await;

    let launcher = Arc::new(echo_launcher(Duration::ZERO));
    let sink = Arc::new(RecordingSink::rejecting());
    let config = worker_config(&server.uri(), 1, 1);
    let worker = Worker::new(&config, launcher, sink).unwrap();

    let report = worker.run_generation().await.unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.persist_failed, 1);
    assert_eq!(report.stored, 0);
}

#[tokio::test]
async fn test_browser_rebuilt_every_generation() {
    let server = MockServer::start().await;
    mount_tasks(
        &server,
        &[
            ("a", "https://a.example/"),
            ("b", "https://b.example/"),
            ("c", "https://c.example/"),
            ("d", "https://d.example/"),
        ],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/done"))
        .respond_with(ResponseTemplate::new(200))
        .expect(4)
        .mount(&server)
        .await;

    let launcher = Arc::new(echo_launcher(Duration::ZERO));
    let sink = Arc::new(RecordingSink::default());
    let config = worker_config(&server.uri(), 2, 2);
    let worker = Worker::new(&config, launcher.clone(), sink.clone()).unwrap();

    let first = worker.run_generation().await.unwrap();
    assert_eq!(FakeRecorder::get(&launcher.recorder.browser_closed), 1);
    let second = worker.run_generation().await.unwrap();

    assert_eq!(first.dispatched, 2);
    assert_eq!(second.dispatched, 2);
    assert_eq!(FakeRecorder::get(&launcher.recorder.launched), 2);
    assert_eq!(FakeRecorder::get(&launcher.recorder.browser_closed), 2);
    assert_eq!(sink.ids(), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_idle_publisher_does_not_consume_page_slots() {
    let server = MockServer::start().await;
    mount_tasks(&server, &[]).await;

    let launcher = Arc::new(echo_launcher(Duration::ZERO));
    let sink = Arc::new(RecordingSink::default());
    let config = worker_config(&server.uri(), 1, 1);
    let worker = Worker::new(&config, launcher.clone(), sink).unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(300), worker.run_generation()).await;

    assert!(outcome.is_err(), "generation should keep polling an idle publisher");
    assert_eq!(FakeRecorder::get(&launcher.recorder.opened), 0);
    let polls = server.received_requests().await.unwrap().len();
    assert!(polls >= 2);
}

#[tokio::test]
async fn test_panicking_task_ends_generation_and_closes_browser() {
    let server = MockServer::start().await;
    mount_tasks(
        &server,
        &[("t1", "https://a.example/"), ("t2", "https://b.example/")],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/done"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let launcher = Arc::new(echo_launcher(Duration::ZERO));
    let config = worker_config(&server.uri(), 2, 2);
    let worker = Worker::new(&config, launcher.clone(), Arc::new(PanickingSink)).unwrap();

    let result = worker.run_generation().await;

    match result {
        Err(HarvestError::TaskPanicked { task_id, message }) => {
            assert!(task_id == "t1" || task_id == "t2");
            assert_eq!(message, "sink exploded");
        }
        other => panic!("expected a panicked task, got {:?}", other),
    }
    assert_eq!(FakeRecorder::get(&launcher.recorder.launched), 1);
    assert_eq!(FakeRecorder::get(&launcher.recorder.browser_closed), 1);
}
