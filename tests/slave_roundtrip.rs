use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use container_loadgen::codec::Codec;
use container_loadgen::compress::Compression;
use container_loadgen::config::RunConfig;
use container_loadgen::runner::{self, Scenario};
use container_loadgen::stats::RunStats;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Clone)]
struct MockSlave {
    batches: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
    health: Arc<AtomicU64>,
    last_frame: Arc<Mutex<Option<Vec<u8>>>>,
    status: StatusCode,
}

impl MockSlave {
    fn new(status: StatusCode) -> Self {
        Self {
            batches: Arc::new(AtomicU64::new(0)),
            frames: Arc::new(AtomicU64::new(0)),
            health: Arc::new(AtomicU64::new(0)),
            last_frame: Arc::new(Mutex::new(None)),
            status,
        }
    }
}

async fn ingest(State(state): State<MockSlave>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/json") {
        let envelope: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => return StatusCode::BAD_REQUEST,
        };
        if envelope.get("compressedData").is_none() || envelope.get("metadata").is_none() {
            return StatusCode::BAD_REQUEST;
        }
        state.batches.fetch_add(1, Ordering::Relaxed);
    } else {
        state.frames.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slot) = state.last_frame.lock() {
            *slot = Some(body.to_vec());
        }
    }
    state.status
}

async fn health(State(state): State<MockSlave>) -> &'static str {
    state.health.fetch_add(1, Ordering::Relaxed);
    "ok"
}

async fn spawn_mock(state: MockSlave) -> SocketAddr {
    let app = Router::new()
        .route("/api/receive-compressed", post(ingest))
        .route("/api/health", get(health))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn test_config(addr: SocketAddr, scenario: Scenario) -> RunConfig {
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    RunConfig {
        slave_ingest: base.join("/api/receive-compressed").unwrap(),
        slave_health: base.join("/api/health").unwrap(),
        mobius_ingest: None,
        users: 3,
        duration: Duration::from_secs(2),
        think_min: Duration::from_millis(10),
        think_max: Duration::from_millis(30),
        scenario,
        codec: Codec::Cbor,
        compression: Compression::Brotli,
        batch_min: 3,
        batch_max: 8,
        source_node: "loadgen-test".to_string(),
        summary_out: None,
        report_interval: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn batch_scenario_delivers_envelopes() {
    let mock = MockSlave::new(StatusCode::OK);
    let addr = spawn_mock(mock.clone()).await;
    let stats = Arc::new(RunStats::new());

    runner::run(test_config(addr, Scenario::SlaveBatch), stats.clone())
        .await
        .unwrap();

    let snapshot = stats.snapshot();
    assert!(snapshot.requests > 0, "no requests issued");
    assert_eq!(snapshot.transport_failures, 0);
    assert_eq!(snapshot.encode_failures, 0);
    assert_eq!(snapshot.successes, snapshot.requests);
    assert!(snapshot.avg_compression_ratio > 1.0);
    assert!(mock.batches.load(Ordering::Relaxed) > 0);
}

#[tokio::test]
async fn frame_scenario_sends_decodable_cbor() {
    let mock = MockSlave::new(StatusCode::OK);
    let addr = spawn_mock(mock.clone()).await;
    let stats = Arc::new(RunStats::new());

    runner::run(test_config(addr, Scenario::SlaveFrames), stats.clone())
        .await
        .unwrap();

    assert!(mock.frames.load(Ordering::Relaxed) > 0);
    let body = mock.last_frame.lock().unwrap().clone().expect("frame captured");
    let value: ciborium::Value = ciborium::de::from_reader(body.as_slice()).unwrap();
    let map = value.as_map().expect("cbor map");
    // Reserved version/codec keys lead the frame.
    let (first_key, _) = &map[0];
    assert_eq!(first_key.as_integer(), Some(ciborium::value::Integer::from(0xFFu64)));
    let (second_key, _) = &map[1];
    assert_eq!(second_key.as_integer(), Some(ciborium::value::Integer::from(0xFEu64)));
}

#[tokio::test]
async fn conflict_responses_count_as_delivered() {
    let mock = MockSlave::new(StatusCode::CONFLICT);
    let addr = spawn_mock(mock.clone()).await;
    let stats = Arc::new(RunStats::new());

    runner::run(test_config(addr, Scenario::SlaveBatch), stats.clone())
        .await
        .unwrap();

    let snapshot = stats.snapshot();
    assert!(snapshot.conflicts > 0);
    assert_eq!(snapshot.transport_failures, 0);
    assert_eq!(snapshot.successes, 0);
}

#[tokio::test]
async fn mixed_scenario_touches_health_endpoint() {
    let mock = MockSlave::new(StatusCode::OK);
    let addr = spawn_mock(mock.clone()).await;
    let stats = Arc::new(RunStats::new());

    let mut config = test_config(addr, Scenario::Mixed);
    config.users = 6;
    config.duration = Duration::from_secs(3);
    runner::run(config, stats.clone()).await.unwrap();

    let snapshot = stats.snapshot();
    assert!(snapshot.requests > 0);
    assert_eq!(snapshot.transport_failures, 0);
    assert!(mock.batches.load(Ordering::Relaxed) > 0);
    assert_eq!(mock.health.load(Ordering::Relaxed), snapshot.health_checks);
    assert!(snapshot.health_checks > 0, "mixed run never hit the health route");
}
