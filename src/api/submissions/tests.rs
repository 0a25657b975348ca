use std::sync::Arc;

use axum::http::{Method, StatusCode};
use tower::ServiceExt;

use crate::db::types::SubmissionStatus;
use crate::grading::errors::AnalysisError;
use crate::test_support::{
    self, completion, submission_row, test_payload_json, MemoryStore, ScriptedTransport,
};

const USER: &str = "user-1";

fn seeded_store(balance: u32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store.insert_check(test_support::test_check(2));
    store.set_variant_answers("check-test", 1, &[("1", "A"), ("2", "B")]);
    store.insert_submission(submission_row("sub-1", "check-test", USER, 1));
    store.set_balance(USER, balance);
    store
}

fn scripted(contents: Vec<String>) -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new(contents.into_iter().map(|c| Ok(completion(c))).collect()))
}

#[tokio::test]
async fn evaluate_returns_result_and_status_reports_completion() {
    let _guard = test_support::env_lock().await;
    let store = seeded_store(5);
    let app = test_support::test_app(
        store.clone(),
        scripted(vec![test_payload_json(&[("1", "A"), ("2", "C")])]),
    );

    let response = app
        .clone()
        .oneshot(test_support::json_request(Method::POST, "/api/v1/submissions/sub-1/evaluate", None))
        .await
        .expect("evaluate");
    assert_eq!(response.status(), StatusCode::OK);
    let result = test_support::read_json(response).await;
    assert_eq!(result["submission_id"], "sub-1");
    assert_eq!(result["correct_answers"], 1);
    assert_eq!(result["percentage_score"], 50);
    assert_eq!(result["final_grade"], 3);

    let response = app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/submissions/sub-1/status", None))
        .await
        .expect("status");
    assert_eq!(response.status(), StatusCode::OK);
    let status = test_support::read_json(response).await;
    assert_eq!(status["status"], "completed");
    assert!(status["started_at"].is_string());
    assert!(status["completed_at"].is_string());
    assert!(status["error_details"].is_null());

    let response = app
        .oneshot(test_support::json_request(Method::GET, "/api/v1/submissions/sub-1/result", None))
        .await
        .expect("result");
    assert_eq!(response.status(), StatusCode::OK);
    let stored = test_support::read_json(response).await;
    assert_eq!(stored["id"], result["id"]);
}

#[tokio::test]
async fn second_evaluate_of_completed_submission_conflicts() {
    let _guard = test_support::env_lock().await;
    let store = seeded_store(5);
    store.set_status("sub-1", SubmissionStatus::Completed);
    let transport = scripted(Vec::new());
    let app = test_support::test_app(store.clone(), transport.clone());

    let response = app
        .oneshot(test_support::json_request(Method::POST, "/api/v1/submissions/sub-1/evaluate", None))
        .await
        .expect("evaluate");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(transport.calls(), 0);
    assert_eq!(store.balance(USER), 5);
}

#[tokio::test]
async fn insufficient_credits_returns_402() {
    let _guard = test_support::env_lock().await;
    let store = seeded_store(0);
    let transport = scripted(Vec::new());
    let app = test_support::test_app(store.clone(), transport.clone());

    let response = app
        .oneshot(test_support::json_request(Method::POST, "/api/v1/submissions/sub-1/evaluate", None))
        .await
        .expect("evaluate");

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = test_support::read_json(response).await;
    assert_eq!(body["required"], 1);
    assert_eq!(body["available"], 0);
    assert_eq!(transport.calls(), 0);
    assert_eq!(store.submission("sub-1").status, SubmissionStatus::Failed);
}

#[tokio::test]
async fn content_rejection_returns_422_and_failed_status() {
    let _guard = test_support::env_lock().await;
    let store = seeded_store(5);
    let rejection = serde_json::json!({
        "error": "inappropriate_content",
        "message": "На изображении нет учебной работы",
        "content_type_detected": "пейзаж"
    })
    .to_string();
    let app = test_support::test_app(store, scripted(vec![rejection]));

    let response = app
        .clone()
        .oneshot(test_support::json_request(Method::POST, "/api/v1/submissions/sub-1/evaluate", None))
        .await
        .expect("evaluate");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = test_support::read_json(response).await;
    assert_eq!(body["error_type"], "inappropriate_content");
    assert_eq!(body["retryable"], false);

    let response = app
        .oneshot(test_support::json_request(Method::GET, "/api/v1/submissions/sub-1/status", None))
        .await
        .expect("status");
    let status = test_support::read_json(response).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(status["error_details"]["error_type"], "inappropriate_content");
    assert_eq!(status["error_details"]["detected_content_type"], "пейзаж");
}

#[tokio::test]
async fn exhausted_retries_return_502() {
    let _guard = test_support::env_lock().await;
    let store = seeded_store(5);
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(AnalysisError::Transport("timeout".to_string())),
        Err(AnalysisError::Transport("timeout".to_string())),
        Err(AnalysisError::Transport("timeout".to_string())),
    ]));
    let app = test_support::test_app(store, transport.clone());

    let response = app
        .oneshot(test_support::json_request(Method::POST, "/api/v1/submissions/sub-1/evaluate", None))
        .await
        .expect("evaluate");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = test_support::read_json(response).await;
    assert_eq!(body["error_type"], "transport_error");
    assert_eq!(body["retryable"], true);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn unknown_submission_is_404() {
    let _guard = test_support::env_lock().await;
    let app = test_support::test_app(seeded_store(5), scripted(Vec::new()));

    let response = app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/submissions/missing/status", None))
        .await
        .expect("status");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(test_support::json_request(Method::GET, "/api/v1/submissions/sub-1/result", None))
        .await
        .expect("result");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = test_support::read_json(response).await;
    assert_eq!(body["detail"], "Evaluation result not found");
}
