//! Publisher tests over real HTTP

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use sumi_harvest::config::PublisherConfig;
use sumi_harvest::publisher::{serve, PublisherService, PublisherStatus};
use sumi_harvest::TaskRecord;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn write_shard(dir: &Path, name: &str, ids: &[&str]) {
    let lines: Vec<String> = ids
        .iter()
        .map(|id| format!(r#"{{"id": "{}", "url": "https://example.com/{}"}}"#, id, id))
        .collect();
    std::fs::write(dir.join(name), lines.join("\n")).unwrap();
}

fn publisher_config(dir: &TempDir) -> PublisherConfig {
    let shard_dir = dir.path().join("shards");
    std::fs::create_dir_all(&shard_dir).unwrap();
    PublisherConfig {
        shard_dir: shard_dir.display().to_string(),
        checkpoint_file: dir.path().join("checkpoint.json").display().to_string(),
        bind: "127.0.0.1:0".to_string(),
        ..PublisherConfig::default()
    }
}

struct RunningPublisher {
    addr: SocketAddr,
    service: Arc<PublisherService>,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl RunningPublisher {
    async fn start(config: &PublisherConfig, fresh: bool) -> Self {
        let service = Arc::new(PublisherService::open(config, fresh).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(serve(Arc::clone(&service), listener, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            service,
            stop: Some(stop),
            handle,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("http://{}/{}", self.addr, endpoint)
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
        self.service.save_checkpoint().await.unwrap();
    }
}

async fn pull(client: &reqwest::Client, publisher: &RunningPublisher) -> Option<TaskRecord> {
    let response = client.get(publisher.url("task")).send().await.unwrap();
    match response.status().as_u16() {
        200 => Some(response.json().await.unwrap()),
        204 => None,
        other => panic!("unexpected status {}", other),
    }
}

async fn ack(client: &reqwest::Client, publisher: &RunningPublisher, id: &str) -> u16 {
    client
        .post(publisher.url("done"))
        .json(&serde_json::json!({"id": id, "type": "complete"}))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

#[tokio::test]
async fn test_tasks_served_in_shard_order_then_no_content() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "b.jsonl", &["b0"]);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["a0", "a1"]);

    let publisher = RunningPublisher::start(&config, false).await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    while let Some(task) = pull(&client, &publisher).await {
        ids.push(task.id);
    }
    assert_eq!(ids, vec!["a0", "a1", "b0"]);
    assert!(pull(&client, &publisher).await.is_none());

    publisher.stop().await;
}

#[tokio::test]
async fn test_acknowledgments_and_status() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["t1", "t2", "t3"]);

    let publisher = RunningPublisher::start(&config, false).await;
    let client = reqwest::Client::new();

    let first = pull(&client, &publisher).await.unwrap();
    pull(&client, &publisher).await.unwrap();

    assert_eq!(ack(&client, &publisher, &first.id).await, 200);
    assert_eq!(ack(&client, &publisher, "never-dispatched").await, 200);

    let body: serde_json::Value = client
        .get(publisher.url("status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["dispatched"], 2);
    assert_eq!(body["acknowledged"], 1);
    assert_eq!(body["unmatched_acks"], 1);
    assert_eq!(body["in_flight"], 1);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["exhausted"], false);

    let status: PublisherStatus = publisher.service.status().await;
    assert_eq!(status.in_flight, 1);

    publisher.stop().await;
}

#[tokio::test]
async fn test_ack_without_type_is_accepted() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["t1"]);

    let publisher = RunningPublisher::start(&config, false).await;
    let client = reqwest::Client::new();
    let task = pull(&client, &publisher).await.unwrap();

    let status = client
        .post(publisher.url("done"))
        .json(&serde_json::json!({"id": task.id}))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 200);
    assert_eq!(publisher.service.status().await.acknowledged, 1);

    publisher.stop().await;
}

#[tokio::test]
async fn test_ack_body_read_regardless_of_content_type() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["t1"]);

    let publisher = RunningPublisher::start(&config, false).await;
    let client = reqwest::Client::new();
    let task = pull(&client, &publisher).await.unwrap();

    let plain = client
        .post(publisher.url("done"))
        .body(format!(r#"{{"id": "{}", "type": "complete"}}"#, task.id))
        .send()
        .await
        .unwrap();
    assert_eq!(plain.status().as_u16(), 200);

    let garbage = client
        .post(publisher.url("done"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status().as_u16(), 200);

    let status = publisher.service.status().await;
    assert_eq!(status.acknowledged, 1);
    assert_eq!(status.in_flight, 0);

    publisher.stop().await;
}

#[tokio::test]
async fn test_restart_resumes_after_dispatched_records() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["t1", "t2", "t3"]);
    write_shard(Path::new(&config.shard_dir), "b.jsonl", &["u1"]);

    let client = reqwest::Client::new();

    let publisher = RunningPublisher::start(&config, false).await;
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "t1");
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "t2");
    publisher.stop().await;

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.checkpoint_file).unwrap()).unwrap();
    assert_eq!(saved["a.jsonl"]["progress"], 2);

    let publisher = RunningPublisher::start(&config, false).await;
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "t3");
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "u1");
    assert!(pull(&client, &publisher).await.is_none());
    publisher.stop().await;

    let publisher = RunningPublisher::start(&config, false).await;
    assert!(pull(&client, &publisher).await.is_none());
    publisher.stop().await;

    let publisher = RunningPublisher::start(&config, true).await;
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "t1");
    publisher.stop().await;
}

#[tokio::test]
async fn test_changed_shard_restarts_from_zero() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["t1", "t2"]);

    let client = reqwest::Client::new();

    let publisher = RunningPublisher::start(&config, false).await;
    pull(&client, &publisher).await.unwrap();
    publisher.stop().await;

    write_shard(Path::new(&config.shard_dir), "a.jsonl", &["n1", "n2"]);

    let publisher = RunningPublisher::start(&config, false).await;
    assert_eq!(pull(&client, &publisher).await.unwrap().id, "n1");
    publisher.stop().await;
}

#[tokio::test]
async fn test_run_publisher_exits_when_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    let config = publisher_config(&dir);
    write_shard(Path::new(&config.shard_dir), "a.jsonl", &[]);

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sumi_harvest::publisher::run_publisher(&config, false),
    )
    .await
    .expect("publisher should stop once drained");

    assert!(result.is_ok());
    assert!(Path::new(&config.checkpoint_file).exists());
}
