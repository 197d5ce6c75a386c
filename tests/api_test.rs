//! End-to-end tests for the HTTP API over both store families

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use ml_monitor::config::FeedbackWriteMode;
use ml_monitor::server::{router, ServerState};
use ml_monitor::store::{MemoryDatabase, SqliteDatabase};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn routers(mode: FeedbackWriteMode) -> Vec<(&'static str, Router)> {
    let sqlite = SqliteDatabase::open_in_memory().unwrap();
    vec![
        ("memory", router(ServerState::in_memory(&MemoryDatabase::new(), mode))),
        ("sqlite", router(ServerState::sqlite(&sqlite, mode))),
    ]
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_inference(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/inferences",
        Some(r#"{"model_name":"example_model","model_version":"1.0.0","input_data":{"input":"some input data"},"output_data":{"output":"some output data"}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["inference_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    for (name, app) in routers(FeedbackWriteMode::Transactional) {
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK, "{}", name);
        assert_eq!(body, json!({ "status": "ok" }));
    }
}

#[tokio::test]
async fn test_inference_feedback_lifecycle() {
    for mode in [FeedbackWriteMode::Transactional, FeedbackWriteMode::Sequential] {
        for (name, app) in routers(mode) {
            let id = create_inference(&app).await;

            let (status, inference) = send(&app, "GET", &format!("/inferences/{}", id), None).await;
            assert_eq!(status, StatusCode::OK, "{} {}", name, mode);
            assert_eq!(inference["id"], json!(id));
            assert_eq!(inference["model_name"], json!("example_model"));
            assert_eq!(inference["input_data"], json!({ "input": "some input data" }));
            assert_eq!(inference["has_feedback"], json!(false));

            let (status, created) = send(
                &app,
                "POST",
                &format!("/inferences/{}/feedback", id),
                Some(r#"{"feedback_data":{"corrected_output":"the correct output"}}"#),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED, "{} {}", name, mode);
            let feedback_id = created["feedback_id"].as_str().unwrap().to_string();

            let (_, inference) = send(&app, "GET", &format!("/inferences/{}", id), None).await;
            assert_eq!(inference["has_feedback"], json!(true), "{} {}", name, mode);

            let (status, listed) =
                send(&app, "GET", &format!("/inferences/{}/feedback", id), None).await;
            assert_eq!(status, StatusCode::OK);
            let listed = listed.as_array().unwrap();
            assert_eq!(listed.len(), 1, "{} {}", name, mode);
            assert_eq!(listed[0]["id"], json!(feedback_id));
            assert_eq!(listed[0]["inference_id"], json!(id));
            assert_eq!(listed[0]["feedback_data"], json!({ "corrected_output": "the correct output" }));
        }
    }
}

#[tokio::test]
async fn test_unknown_inference_is_404() {
    for (name, app) in routers(FeedbackWriteMode::Transactional) {
        let (status, body) = send(&app, "GET", "/inferences/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", name);
        assert_eq!(body["error"], json!("not_found"));
    }
}

#[tokio::test]
async fn test_feedback_for_unknown_inference_is_500_and_writes_nothing() {
    for mode in [FeedbackWriteMode::Transactional, FeedbackWriteMode::Sequential] {
        for (name, app) in routers(mode) {
            let (status, body) = send(
                &app,
                "POST",
                "/inferences/ghost/feedback",
                Some(r#"{"feedback_data":{"c":1}}"#),
            )
            .await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{} {}", name, mode);
            assert_eq!(body["error"], json!("internal_error"));

            let (status, listed) = send(&app, "GET", "/inferences/ghost/feedback", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(listed, json!([]), "{} {}", name, mode);
        }
    }
}

#[tokio::test]
async fn test_list_feedback_empty_cases_are_indistinguishable() {
    for (name, app) in routers(FeedbackWriteMode::Transactional) {
        let id = create_inference(&app).await;

        let (known_status, known) =
            send(&app, "GET", &format!("/inferences/{}/feedback", id), None).await;
        let (unknown_status, unknown) = send(&app, "GET", "/inferences/nope/feedback", None).await;

        assert_eq!(known_status, StatusCode::OK, "{}", name);
        assert_eq!(unknown_status, StatusCode::OK, "{}", name);
        assert_eq!(known, json!([]));
        assert_eq!(unknown, json!([]));
    }
}

#[tokio::test]
async fn test_malformed_bodies_are_400() {
    for (name, app) in routers(FeedbackWriteMode::Transactional) {
        let (status, body) = send(&app, "POST", "/inferences", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
        assert_eq!(body["error"], json!("invalid_request"));

        let id = create_inference(&app).await;
        let (status, _) = send(&app, "POST", &format!("/inferences/{}/feedback", id), Some("[1,")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);

        // Rejected feedback leaves the flag untouched
        let (_, inference) = send(&app, "GET", &format!("/inferences/{}", id), None).await;
        assert_eq!(inference["has_feedback"], json!(false));
    }
}

#[tokio::test]
async fn test_feedback_listed_in_submission_order() {
    for (name, app) in routers(FeedbackWriteMode::Transactional) {
        let id = create_inference(&app).await;

        let mut submitted = Vec::new();
        for n in 0..4 {
            let (_, created) = send(
                &app,
                "POST",
                &format!("/inferences/{}/feedback", id),
                Some(&json!({ "feedback_data": { "n": n } }).to_string()),
            )
            .await;
            submitted.push(created["feedback_id"].clone());
        }

        let (_, listed) = send(&app, "GET", &format!("/inferences/{}/feedback", id), None).await;
        let listed: Vec<Value> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|fb| fb["id"].clone())
            .collect();
        assert_eq!(listed, submitted, "{}", name);
    }
}

#[tokio::test]
async fn test_sqlite_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.db");

    let id = {
        let db = SqliteDatabase::open(&path).await.unwrap();
        let app = router(ServerState::sqlite(&db, FeedbackWriteMode::Transactional));
        let id = create_inference(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/inferences/{}/feedback", id),
            Some(r#"{"feedback_data":"looks wrong"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        id
    };

    let db = SqliteDatabase::open(&path).await.unwrap();
    let app = router(ServerState::sqlite(&db, FeedbackWriteMode::Transactional));

    let (_, inference) = send(&app, "GET", &format!("/inferences/{}", id), None).await;
    assert_eq!(inference["has_feedback"], json!(true));
    let (_, listed) = send(&app, "GET", &format!("/inferences/{}/feedback", id), None).await;
    assert_eq!(listed[0]["feedback_data"], json!("looks wrong"));
}
