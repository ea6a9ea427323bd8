use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use upscale_farm::api::{router, ApiState};
use upscale_farm::config::{ServerConfig, WorkerConfig};
use upscale_farm::dispatcher::Dispatcher;
use upscale_farm::publish::FsBlobStore;
use upscale_farm::registry::InMemoryRegistry;

fn write_worker_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake_worker.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Build the API router over a dispatcher whose worker is a stand-in script.
fn test_app(tmp: &Path, script_body: &str) -> Router {
    let script = write_worker_script(tmp, script_body);
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        staging_root: tmp.join("staging"),
        store_root: tmp.join("store"),
        worker: WorkerConfig {
            program: script,
            script: None,
            working_dir: None,
            tile: 1000,
            tile_pad: 0,
        },
    };
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(InMemoryRegistry::new()),
        Arc::new(FsBlobStore::new(config.store_root.clone())),
        config,
        CancellationToken::new(),
    ));
    router(ApiState { dispatcher })
}

async fn request_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path(), "true");

    let (status, body) = request_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "healthy": true }));
}

#[tokio::test]
async fn test_create_job_requires_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path(), "true");

    let (status, body) =
        request_json(&app, "POST", "/jobs", Some(json!({ "model": "RealESRGAN_x4plus" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("input_dir"));

    let (status, _) = request_json(
        &app,
        "POST",
        "/jobs",
        Some(json!({ "input_dir": tmp.path().to_str().unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_job_rejects_missing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path(), "true");

    let (status, body) = request_json(
        &app,
        "POST",
        "/jobs",
        Some(json!({
            "input_dir": tmp.path().join("nope").to_str().unwrap(),
            "model": "RealESRGAN_x4plus",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not a directory"));
}

#[tokio::test]
async fn test_status_of_unknown_job_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path(), "true");

    let uri = format!("/jobs/{}/status", uuid::Uuid::new_v4());
    let (status, _) = request_json(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_of_unknown_job_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path(), "true");

    let uri = format!("/jobs/{}/result", uuid::Uuid::new_v4());
    let (status, _) = request_json(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_before_completion_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("a.png"), b"aaa").unwrap();

    // Worker that never finishes quickly.
    let app = test_app(tmp.path(), "sleep 30");

    let (status, body) = request_json(
        &app,
        "POST",
        "/jobs",
        Some(json!({
            "input_dir": input.to_str().unwrap(),
            "model": "RealESRGAN_x4plus",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) =
        request_json(&app, "GET", &format!("/jobs/{}/result", job_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Output not ready"));
}

#[tokio::test]
async fn test_submit_poll_and_fetch_result() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("a.png"), b"aaa").unwrap();

    let app = test_app(tmp.path(), r#"cp -R "$2/." "$4/""#);

    let (status, body) = request_json(
        &app,
        "POST",
        "/jobs",
        Some(json!({
            "input_dir": input.to_str().unwrap(),
            "model": "RealESRGAN_x4plus",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let deadline = Instant::now() + Duration::from_secs(30);
    let final_status = loop {
        let (status, body) =
            request_json(&app, "GET", &format!("/jobs/{}/status", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_id"].as_str().unwrap(), job_id);

        match body["status"].as_str().unwrap() {
            "completed" | "error" => break body,
            _ => {
                assert!(Instant::now() < deadline, "job did not settle: {}", body);
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
    };
    assert_eq!(final_status["status"], json!("completed"));
    assert!(final_status["result_url"].as_str().unwrap().starts_with("file://"));

    let (status, body) =
        request_json(&app, "GET", &format!("/jobs/{}/result", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["download_url"], final_status["result_url"]);
}
