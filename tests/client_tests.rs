mod common;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use common::{Probe, ScriptedBackend, gateway_with_engine, png, spawn_server};
use infernum_gateway::{
    InferenceEngine,
    client::{CSV_HEADER, FixedDelay, NoPacing, RetryPolicy, VisionClient},
    gateway,
    messages::{AnalysisResult, BatchRecord},
};
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// Gateway stand-in that fails its first `failures` requests with `status`.
#[derive(Clone)]
struct Flaky {
    hits: Arc<AtomicUsize>,
    failures: usize,
    status: StatusCode,
}

impl Flaky {
    fn new(failures: usize, status: StatusCode) -> Self {
        Self {
            hits: Arc::default(),
            failures,
            status,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn serve(&self) -> String {
        let app = Router::new()
            .route("/analyze-image", post(flaky_analyze))
            .with_state(self.clone());
        spawn_server(app).await
    }
}

async fn flaky_analyze(State(flaky): State<Flaky>, _body: Bytes) -> Response {
    let hit = flaky.hits.fetch_add(1, Ordering::SeqCst);
    if hit < flaky.failures {
        return (flaky.status, Json(json!({ "error": "boom" }))).into_response();
    }
    Json(AnalysisResult::completed("mock", format!("attempt {}", hit + 1), 0.25)).into_response()
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    }
}

fn client(url: &str, retry: RetryPolicy) -> VisionClient {
    VisionClient::new(url, Duration::from_secs(5))
        .unwrap()
        .with_retry(retry)
        .with_pacing(NoPacing)
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png(6, 4)).unwrap();
    path
}

#[tokio::test]
async fn retries_with_backoff_until_success() {
    let flaky = Flaky::new(2, StatusCode::SERVICE_UNAVAILABLE);
    let url = flaky.serve().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");

    let started = Instant::now();
    let result = client(&url, fast_retry(3)).analyze(&image, None).await;
    let elapsed = started.elapsed();

    let result = result.unwrap();
    assert!(result.success);
    assert_eq!(result.analysis.as_deref(), Some("attempt 3"));
    assert_eq!(flaky.hits(), 3);
    // 50ms after the first failure, 100ms after the second
    assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let flaky = Flaky::new(usize::MAX, StatusCode::INTERNAL_SERVER_ERROR);
    let url = flaky.serve().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");

    let started = Instant::now();
    let result = client(&url, fast_retry(3)).analyze(&image, None).await;

    assert!(result.is_none());
    assert_eq!(flaky.hits(), 3);
    // no pause after the last attempt
    assert!(started.elapsed() < Duration::from_millis(350));
}

#[tokio::test]
async fn client_errors_are_retried_by_default() {
    let flaky = Flaky::new(usize::MAX, StatusCode::BAD_REQUEST);
    let url = flaky.serve().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");

    assert!(client(&url, fast_retry(2)).analyze(&image, None).await.is_none());
    assert_eq!(flaky.hits(), 2);
}

#[tokio::test]
async fn permanent_failures_stop_early_when_asked() {
    let flaky = Flaky::new(usize::MAX, StatusCode::BAD_REQUEST);
    let url = flaky.serve().await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");
    let retry = RetryPolicy {
        retry_client_errors: false,
        ..fast_retry(3)
    };

    assert!(client(&url, retry).analyze(&image, None).await.is_none());
    assert_eq!(flaky.hits(), 1);
}

#[tokio::test]
async fn unreachable_gateway_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");

    let result = client(&common::closed_url().await, fast_retry(2))
        .analyze(&image, None)
        .await;
    assert!(result.is_none());
}

#[tokio::test]
async fn prompt_reaches_the_backend() {
    let probe = Probe::default();
    let state = gateway_with_engine(InferenceEngine::new(ScriptedBackend::ok(&probe)));
    let url = spawn_server(gateway::router(state)).await;
    let dir = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "a.png");

    let result = client(&url, fast_retry(1))
        .analyze(&image, Some("Count the cars & bikes"))
        .await
        .unwrap();
    assert_eq!(result.analysis.as_deref(), Some("a 6x4 picture"));
    assert_eq!(
        probe.last_instruction().as_deref(),
        Some("Count the cars & bikes")
    );
}

#[tokio::test]
async fn batch_keeps_order_and_skips_failures() {
    let probe = Probe::default();
    let state = gateway_with_engine(InferenceEngine::new(ScriptedBackend::ok(&probe)));
    let url = spawn_server(gateway::router(state)).await;
    let dir = tempfile::tempdir().unwrap();
    let images = vec![
        write_png(dir.path(), "first.png"),
        dir.path().join("missing.png"),
        write_png(dir.path(), "third.png"),
    ];

    let retry = RetryPolicy {
        retry_client_errors: false,
        ..fast_retry(2)
    };
    let mut client = VisionClient::new(&url, Duration::from_secs(5))
        .unwrap()
        .with_retry(retry)
        .with_pacing(FixedDelay(Duration::from_millis(40)));

    let started = Instant::now();
    let records = client.batch_analyze(&images, None).await.to_vec();
    // paced after each of the three items, failed or not
    assert!(started.elapsed() >= Duration::from_millis(120));

    let names: Vec<_> = records.iter().map(|r| r.image.as_str()).collect();
    assert_eq!(
        names,
        [
            images[0].display().to_string(),
            images[2].display().to_string()
        ]
    );
    assert!(records.iter().all(|r| r.result.success));
    assert_eq!(probe.calls(), 2);
    assert_eq!(client.results(), records.as_slice());
}

#[tokio::test]
async fn exports_every_record() {
    let flaky = Flaky::new(0, StatusCode::OK);
    let url = flaky.serve().await;
    let dir = tempfile::tempdir().unwrap();
    let images: Vec<_> = (0..3)
        .map(|i| write_png(dir.path(), &format!("{i}.png")))
        .collect();

    let mut client = client(&url, fast_retry(1));
    assert_eq!(client.batch_analyze(&images, None).await.len(), 3);

    let json_path = dir.path().join("out/results.json");
    std::fs::create_dir_all(json_path.parent().unwrap()).unwrap();
    assert_eq!(client.export_json(&json_path).unwrap(), 3);
    let exported: Vec<BatchRecord> =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(exported, client.results());

    let csv_path = dir.path().join("results.csv");
    assert_eq!(client.export_csv(&csv_path).unwrap(), 3);
    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let header: Vec<_> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(header, CSV_HEADER);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[1][0], images[1].display().to_string());
    assert_eq!(&rows[1][1], "attempt 2");
    assert_eq!(&rows[1][2], "0.25");
}

#[tokio::test]
async fn empty_results_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&common::closed_url().await, fast_retry(1));

    let json_path = dir.path().join("results.json");
    let csv_path = dir.path().join("results.csv");
    assert_eq!(client.export_json(&json_path).unwrap(), 0);
    assert_eq!(client.export_csv(&csv_path).unwrap(), 0);
    assert!(!json_path.exists());
    assert!(!csv_path.exists());
}
