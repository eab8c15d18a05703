// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API tests driven through the router with mock sessions.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use zapline_core::{CredentialBlob, CredentialStore, SessionState};
use zapline_gateway::{GatewayState, router};
use zapline_test_utils::mock_gateway::MOCK_CREDENTIALS;
use zapline_test_utils::{TestHarness, customer_message};

const TOKEN: &str = "test-token";
const CUSTOMER: &str = "5511988887777@s.whatsapp.net";

fn app(harness: &TestHarness) -> Router {
    router(GatewayState::new(
        harness.manager.clone(),
        Some(TOKEN.to_string()),
    ))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn connected(harness: &TestHarness) {
    harness
        .store
        .save(&TestHarness::tenant(), &CredentialBlob(MOCK_CREDENTIALS.to_vec()))
        .await
        .unwrap();
    let outcome = harness
        .manager
        .initialize_session(&TestHarness::tenant())
        .await
        .unwrap();
    assert_eq!(outcome.status.status, SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn health_needs_no_token() {
    let harness = TestHarness::new();
    let response = app(&harness)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test(start_paused = true)]
async fn api_rejects_missing_or_wrong_token() {
    let harness = TestHarness::new();
    let app = app(&harness);

    let anonymous = app
        .clone()
        .oneshot(Request::get("/v1/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .oneshot(
            Request::get("/v1/sessions")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(start_paused = true)]
async fn unconfigured_token_locks_the_api() {
    let harness = TestHarness::new();
    let app = router(GatewayState::new(harness.manager.clone(), None));
    let response = app
        .oneshot(
            Request::get("/v1/sessions")
                .header(header::AUTHORIZATION, "Bearer anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(start_paused = true)]
async fn initialize_returns_the_qr_code() {
    let harness = TestHarness::new();
    let app = app(&harness);

    let (status, body) = call(&app, Method::POST, "/v1/sessions/acme/initialize", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenantId"], "acme");
    assert_eq!(body["status"], "AWAITING_QR_SCAN");
    assert_eq!(body["qrCode"], "mock-qr-1");
    assert_eq!(body["created"], true);
    assert_eq!(body["alreadyConnected"], false);

    let (status, list) = call(&app, Method::GET, "/v1/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_tenant_reports_uninitialized() {
    let harness = TestHarness::new();
    let (status, body) = call(&app(&harness), Method::GET, "/v1/sessions/ghost/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UNINITIALIZED");
    assert_eq!(body["connected"], false);
}

#[tokio::test(start_paused = true)]
async fn send_to_unconnected_tenant_conflicts() {
    let harness = TestHarness::new();
    let (status, body) = call(
        &app(&harness),
        Method::POST,
        "/v1/sessions/acme/messages",
        Some(json!({"to": "+55 11 98888-7777", "text": "Olá"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_connected");
}

#[tokio::test(start_paused = true)]
async fn send_returns_the_message_id() {
    let harness = TestHarness::new();
    connected(&harness).await;

    let (status, body) = call(
        &app(&harness),
        Method::POST,
        "/v1/sessions/acme/messages",
        Some(json!({"to": "+55 11 98888-7777", "text": "Olá"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageId"], "mock-out-1");

    let sent = harness.gateway.socket().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, CUSTOMER);
}

#[tokio::test(start_paused = true)]
async fn empty_message_is_a_bad_request() {
    let harness = TestHarness::new();
    connected(&harness).await;

    let (status, body) = call(
        &app(&harness),
        Method::POST,
        "/v1/sessions/acme/messages",
        Some(json!({"to": "+55 11 98888-7777"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test(start_paused = true)]
async fn disconnect_with_logout_forgets_credentials() {
    let harness = TestHarness::new();
    connected(&harness).await;

    let (status, body) = call(
        &app(&harness),
        Method::POST,
        "/v1/sessions/acme/disconnect?logout=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DISCONNECTED");
    assert!(
        harness
            .store
            .load(&TestHarness::tenant())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(start_paused = true)]
async fn inbound_webhook_buffers_for_the_owning_tenant() {
    let harness = TestHarness::new();
    connected(&harness).await;
    let app = app(&harness);

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/inbound",
        Some(json!({
            "businessPhone": "+55 11 40000-0000",
            "message": {"id": "w1", "from": CUSTOMER, "text": "oi"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["tenantId"], "acme");
    assert_eq!(body["outcome"], "buffered");
    assert_eq!(body["pending"], 1);

    let (_, again) = call(
        &app,
        Method::POST,
        "/v1/inbound",
        Some(json!({
            "businessPhone": "5511400000000",
            "message": {"id": "w1", "from": CUSTOMER, "text": "oi"}
        })),
    )
    .await;
    assert_eq!(again["outcome"], "duplicate");

    let batches = harness.handler.wait_for_batches(1).await;
    assert_eq!(batches[0].text, "oi");
}

#[tokio::test(start_paused = true)]
async fn inbound_for_unknown_phone_is_rejected() {
    let harness = TestHarness::new();
    let (status, _) = call(
        &app(&harness),
        Method::POST,
        "/v1/inbound",
        Some(json!({
            "businessPhone": "5599000000000",
            "message": {"id": "w1", "from": CUSTOMER, "text": "oi"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn context_reset_returns_no_content() {
    let harness = TestHarness::new();
    connected(&harness).await;
    harness
        .gateway
        .deliver(customer_message("m1", CUSTOMER, "oi"))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _) = call(
        &app(&harness),
        Method::DELETE,
        &format!("/v1/sessions/acme/contexts/{CUSTOMER}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        harness.handler.cleared(),
        vec![(TestHarness::tenant(), CUSTOMER.to_string())]
    );
}
