//! End-to-end tests driving the full gateway router

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use textgate_gateway::{build_state, create_router, GatewayConfig};
use tower::ServiceExt;

const CUSTOM_SCRIPT: &str = r#"
declare_counter("background_runs", "Times the background detector body actually ran");

/// Flags text containing the word apple.
fn contains_word(text) {
    let position = text.index_of("apple");
    if position >= 0 {
        #{
            start: position,
            end: position + 5,
            text: text,
            detection_type: "content_check",
            detection: "forbidden_word: apple",
            score: 1.0
        }
    } else {
        #{}
    }
}

fn function_that_needs_headers(text, headers) {
    headers["magic-key"] != "123"
}

fn throws_error(text) {
    if text == "illegal" {
        true
    } else if text == "error" {
        throw "deliberate failure";
    } else {
        false
    }
}
"#;

fn build_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("custom_detectors.rhai");
    std::fs::write(&script, CUSTOM_SCRIPT).unwrap();

    let mut config = GatewayConfig::default();
    config.detectors.custom_detectors_path = Some(script.to_string_lossy().to_string());

    let state = build_state(&config).unwrap();
    (create_router(state), dir)
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

async fn post_contents(app: &Router, body: Value) -> (StatusCode, String) {
    request(app, "POST", "/api/v1/text/contents", Some(body), &[]).await
}

#[tokio::test]
async fn valid_json_content_yields_empty_item_list() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["{\"a\": 1, \"b\": 2}"], "detector_params": {"file_type": ["json"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0], json!([]));
}

#[tokio::test]
async fn invalid_json_content_is_flagged() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["{a: 1}"], "detector_params": {"file_type": ["json"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0][0]["detection"], "invalid_json");
}

#[tokio::test]
async fn email_detection_end_to_end() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["Contact me at test@example.com"], "detector_params": {"regex": ["email"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0][0]["text"], "test@example.com");
    assert_eq!(value["root"][0][0]["detection"], "email_address");
}

#[tokio::test]
async fn unknown_registry_kind_is_a_400() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["anything"], "detector_params": {"nonexistent": ["x"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Detector nonexistent not found"));
}

#[tokio::test]
async fn unknown_custom_function_is_a_400() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["anything"], "detector_params": {"custom": ["abc"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unrecognized custom function: abc"));
}

#[tokio::test]
async fn custom_detector_flags_matching_content() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["What is an apple?"], "detector_params": {"custom": ["contains_word"]}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0][0]["text"], "What is an apple?");
}

#[tokio::test]
async fn headers_are_passed_to_declaring_functions() {
    let (app, _dir) = build_app();
    let payload = json!({
        "contents": ["hello"],
        "detector_params": {"custom": ["function_that_needs_headers"]}
    });

    let (status, body) = request(
        &app,
        "POST",
        "/api/v1/text/contents",
        Some(payload.clone()),
        &[("magic-key", "123")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0], json!([]));

    let (status, body) = request(
        &app,
        "POST",
        "/api/v1/text/contents",
        Some(payload),
        &[("magic-key", "wrong")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_user_regex_is_a_500_with_generic_message() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({"contents": ["totally innocuous"], "detector_params": {"regex": ["["]}}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("check detector logs"));
    // compile detail stays in the logs
    assert!(!body.contains("unclosed"));
}

#[tokio::test]
async fn erroring_custom_function_is_a_500() {
    let (app, _dir) = build_app();
    let (status, _body) = post_contents(
        &app,
        json!({"contents": ["error"], "detector_params": {"custom": ["throws_error"]}}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _dir) = build_app();
    let (status, body) = request(&app, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn registry_endpoint_lists_functions_per_registry() {
    let (app, _dir) = build_app();
    let (status, body) = request(&app, "GET", "/registry", None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_str(&body).unwrap();
    assert!(value["regex"]["email"].is_string());
    assert!(value["regex"]["$CUSTOM_REGEX"].is_string());
    assert!(value["file_type"]["json-with-schema:$SCHEMA"].is_string());
    assert!(value["custom"]["contains_word"]
        .as_str()
        .unwrap()
        .contains("apple"));
}

#[tokio::test]
async fn metrics_reflect_mixed_traffic_exactly() {
    let (app, _dir) = build_app();

    // 40% flagged file_type traffic
    for _ in 0..4 {
        post_contents(
            &app,
            json!({"contents": ["{\"a\": 1, \"b\": 2}"], "detector_params": {"file_type": ["json"]}}),
        )
        .await;
    }
    for _ in 0..6 {
        post_contents(
            &app,
            json!({"contents": ["{\"a\": 1, \"b\": 2"], "detector_params": {"file_type": ["json"]}}),
        )
        .await;
    }

    // regex: 2 pass, 7 flag, 1 error
    for _ in 0..2 {
        let (status, _) = post_contents(
            &app,
            json!({"contents": ["totally innocuous"], "detector_params": {"regex": ["(?i:orange|apple)"]}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    for _ in 0..7 {
        let (status, _) = post_contents(
            &app,
            json!({"contents": ["orange and apple"], "detector_params": {"regex": ["(?i:orange|apple)"]}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = post_contents(
        &app,
        json!({"contents": ["totally innocuous"], "detector_params": {"regex": ["["]}}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // custom: 5 pass, 3 flag, 2 error
    for _ in 0..5 {
        post_contents(
            &app,
            json!({"contents": ["fine"], "detector_params": {"custom": ["throws_error"]}}),
        )
        .await;
    }
    for _ in 0..3 {
        post_contents(
            &app,
            json!({"contents": ["illegal"], "detector_params": {"custom": ["throws_error"]}}),
        )
        .await;
    }
    for _ in 0..2 {
        post_contents(
            &app,
            json!({"contents": ["error"], "detector_params": {"custom": ["throws_error"]}}),
        )
        .await;
    }

    let (status, body) = request(&app, "GET", "/metrics", None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let expected = [
        r#"textgate_guardrails_requests_total{detector_kind="file_type",detector_name="json"} 10"#,
        r#"textgate_guardrails_detections_total{detector_kind="file_type",detector_name="json"} 6"#,
        r#"textgate_guardrails_errors_total{detector_kind="file_type",detector_name="json"} 0"#,
        r#"textgate_guardrails_requests_total{detector_kind="regex",detector_name="custom_regex"} 10"#,
        r#"textgate_guardrails_detections_total{detector_kind="regex",detector_name="custom_regex"} 7"#,
        r#"textgate_guardrails_errors_total{detector_kind="regex",detector_name="custom_regex"} 1"#,
        r#"textgate_guardrails_requests_total{detector_kind="custom",detector_name="throws_error"} 10"#,
        r#"textgate_guardrails_detections_total{detector_kind="custom",detector_name="throws_error"} 3"#,
        r#"textgate_guardrails_errors_total{detector_kind="custom",detector_name="throws_error"} 2"#,
    ];
    for line in expected {
        assert!(body.contains(line), "missing metric line: {line}\n{body}");
    }

    // user-declared counter from the script is on the same surface
    assert!(body.contains("background_runs"));
}

#[tokio::test]
async fn empty_contents_is_a_400() {
    let (app, _dir) = build_app();
    let (status, _body) = post_contents(
        &app,
        json!({"contents": [], "detector_params": {"regex": ["email"]}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multiple_contents_align_in_order() {
    let (app, _dir) = build_app();
    let (status, body) = post_contents(
        &app,
        json!({
            "contents": ["clean text", "mail test@example.com"],
            "detector_params": {"regex": ["email"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["root"][0], json!([]));
    assert_eq!(value["root"][1][0]["text"], "test@example.com");
}
