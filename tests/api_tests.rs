//! HTTP-level tests against the full router on an in-memory database

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use kalpla::api;
use kalpla::app;
use kalpla::config::Config;
use kalpla::db::{create_test_pool, migrations};
use kalpla::gateway::{
    signature, CreateOrderRequest, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway,
};
use kalpla::services::EmailService;

const KEY_SECRET: &str = "test_key_secret";
const WEBHOOK_SECRET: &str = "test_webhook_secret";

/// Gateway that hands out sequential order ids and checks signatures with
/// fixed secrets
struct MockGateway {
    next_id: AtomicU32,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder {
            id: format!("order_test_{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            status: "created".to_string(),
        })
    }

    async fn refund(&self, _gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund, GatewayError> {
        Ok(GatewayRefund {
            id: "rfnd_test".to_string(),
            amount,
            status: "processed".to_string(),
        })
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, sig: &str) -> bool {
        signature::verify_payment_signature(KEY_SECRET, gateway_order_id, gateway_payment_id, sig)
    }

    fn verify_webhook_signature(&self, body: &[u8], sig: &str) -> bool {
        signature::verify_webhook_signature(WEBHOOK_SECRET, body, sig)
    }
}

async fn setup() -> TestServer {
    let pool = create_test_pool().await.expect("Failed to create pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let gateway = Arc::new(MockGateway {
        next_id: AtomicU32::new(1),
    });
    let state = app::build_state(
        Config::default(),
        pool,
        gateway,
        Arc::new(EmailService::disabled()),
    );
    let router = api::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to start test server")
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).expect("valid header")
}

/// Register and return `(user_id, token)`
async fn register(server: &TestServer, name: &str, email: &str) -> (i64, String) {
    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({ "name": name, "email": email, "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    (
        body["user"]["id"].as_i64().expect("user id"),
        body["token"].as_str().expect("token").to_string(),
    )
}

/// Create and publish a course with one lesson; returns `(course_id, lesson_id)`
async fn published_course(server: &TestServer, token: &str, title: &str, price: i64) -> (i64, i64) {
    let course: Value = server
        .post("/api/v1/instructor/courses")
        .add_header(header::AUTHORIZATION, bearer(token))
        .json(&json!({ "title": title, "summary": "Learn things", "price": price }))
        .await
        .json();
    let course_id = course["id"].as_i64().expect("course id");

    let module: Value = server
        .post(&format!("/api/v1/instructor/courses/{}/modules", course_id))
        .add_header(header::AUTHORIZATION, bearer(token))
        .json(&json!({ "title": "Basics" }))
        .await
        .json();
    let module_id = module["id"].as_i64().expect("module id");

    let lesson: Value = server
        .post(&format!("/api/v1/instructor/modules/{}/lessons", module_id))
        .add_header(header::AUTHORIZATION, bearer(token))
        .json(&json!({ "title": "Welcome", "content": "Hello", "duration_minutes": 5 }))
        .await
        .json();
    let lesson_id = lesson["id"].as_i64().expect("lesson id");

    let response = server
        .post(&format!("/api/v1/instructor/courses/{}/publish", course_id))
        .add_header(header::AUTHORIZATION, bearer(token))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    (course_id, lesson_id)
}

#[tokio::test]
async fn test_health() {
    let server = setup().await;

    let response = server.get("/api/v1/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn test_first_user_is_admin() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;

    let me: Value = server
        .get("/api/v1/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .await
        .json();
    assert_eq!(me["role"], "admin");

    let me: Value = server
        .get("/api/v1/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await
        .json();
    assert_eq!(me["role"], "student");
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let server = setup().await;
    register(&server, "Asha", "asha@example.com").await;

    let response = server
        .post("/api/v1/auth/register")
        .json(&json!({ "name": "Other", "email": "asha@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_and_logout() {
    let server = setup().await;
    register(&server, "Asha", "asha@example.com").await;

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "asha@example.com", "password": "wrong-password" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "asha@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let token = response.json::<Value>()["token"].as_str().expect("token").to_string();

    let response = server
        .post("/api/v1/auth/logout")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = server
        .get("/api/v1/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_repeated_failed_logins_are_throttled() {
    let server = setup().await;
    register(&server, "Asha", "asha@example.com").await;

    for _ in 0..5 {
        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({ "email": "asha@example.com", "password": "wrong-password" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "asha@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "RATE_LIMIT");
    assert_eq!(body["error"]["details"]["retry_after"], 900);
}

#[tokio::test]
async fn test_role_gates() {
    let server = setup().await;
    register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;

    let response = server.get("/api/v1/me/enrollments").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .get("/api/v1/admin/users")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = server
        .post("/api/v1/instructor/courses")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({ "title": "Nope" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_banned_user_is_rejected() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (student_id, student_token) = register(&server, "Ravi", "ravi@example.com").await;

    let response = server
        .put(&format!("/api/v1/admin/users/{}", student_id))
        .add_header(header::AUTHORIZATION, bearer(&admin_token))
        .json(&json!({ "status": "banned" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // Existing sessions are revoked
    let response = server
        .get("/api/v1/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ravi@example.com", "password": "password123" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "USER_BANNED");
}

#[tokio::test]
async fn test_free_course_enrollment_and_progress() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;
    let (course_id, lesson_id) = published_course(&server, &admin_token, "Rust Basics", 0).await;

    let catalog: Value = server.get("/api/v1/courses").await.json();
    assert_eq!(catalog["total"], 1);

    let response = server
        .post(&format!("/api/v1/courses/{}/enroll", course_id))
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = server
        .post(&format!("/api/v1/courses/{}/enroll", course_id))
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let progress: Value = server
        .post(&format!("/api/v1/me/lessons/{}/complete", lesson_id))
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await
        .json();
    assert_eq!(progress["progress_percent"], 100);
    assert_eq!(progress["completed_lessons"], 1);
}

#[tokio::test]
async fn test_paid_course_requires_payment() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;
    let (course_id, _) = published_course(&server, &admin_token, "Advanced Rust", 49_900).await;

    let response = server
        .post(&format!("/api/v1/courses/{}/enroll", course_id))
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "PAYMENT_REQUIRED");
}

#[tokio::test]
async fn test_checkout_and_verify() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;
    let (course_id, _) = published_course(&server, &admin_token, "Advanced Rust", 49_900).await;

    let response = server
        .post("/api/v1/payments/orders")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({ "item_type": "course", "item_id": course_id }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let order: Value = response.json();
    assert_eq!(order["amount"], 49_900);
    assert_eq!(order["key_id"], "rzp_test_key");
    let gateway_order_id = order["gateway_order_id"].as_str().expect("gateway order id").to_string();

    // Tampered signature leaves the payment pending
    let response = server
        .post("/api/v1/payments/verify")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_test_1",
            "signature": "00".repeat(32),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let sig = signature::payment_signature(KEY_SECRET, &gateway_order_id, "pay_test_1");
    let response = server
        .post("/api/v1/payments/verify")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_test_1",
            "signature": sig,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "success");

    // Replaying the callback does not settle twice
    let response = server
        .post("/api/v1/payments/verify")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_test_1",
            "signature": sig,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let enrollments: Value = server
        .get("/api/v1/me/enrollments")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await
        .json();
    assert_eq!(enrollments[0]["course_id"], course_id);

    // Owning the course blocks a second purchase
    let response = server
        .post("/api/v1/payments/orders")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({ "item_type": "course", "item_id": course_id }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_verify_by_other_user_is_forbidden() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;
    let (_, other_token) = register(&server, "Meera", "meera@example.com").await;
    let (course_id, _) = published_course(&server, &admin_token, "Advanced Rust", 49_900).await;

    let order: Value = server
        .post("/api/v1/payments/orders")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({ "item_type": "course", "item_id": course_id }))
        .await
        .json();
    let gateway_order_id = order["gateway_order_id"].as_str().expect("gateway order id").to_string();
    let sig = signature::payment_signature(KEY_SECRET, &gateway_order_id, "pay_test_1");

    let response = server
        .post("/api/v1/payments/verify")
        .add_header(header::AUTHORIZATION, bearer(&other_token))
        .json(&json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": "pay_test_1",
            "signature": sig,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_captures_payment() {
    let server = setup().await;
    let (_, admin_token) = register(&server, "Asha", "asha@example.com").await;
    let (_, student_token) = register(&server, "Ravi", "ravi@example.com").await;
    let (course_id, _) = published_course(&server, &admin_token, "Advanced Rust", 49_900).await;

    let order: Value = server
        .post("/api/v1/payments/orders")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .json(&json!({ "item_type": "course", "item_id": course_id }))
        .await
        .json();
    let gateway_order_id = order["gateway_order_id"].as_str().expect("gateway order id");

    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_hook_1",
            "order_id": gateway_order_id,
            "amount": 49_900,
            "status": "captured"
        }}}
    })
    .to_string();
    let signature_header = HeaderName::from_static("x-razorpay-signature");

    let response = server
        .post("/api/v1/payments/webhook")
        .add_header(
            signature_header.clone(),
            HeaderValue::from_static("deadbeef"),
        )
        .text(body.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());
    let response = server
        .post("/api/v1/payments/webhook")
        .add_header(signature_header.clone(), HeaderValue::from_str(&sig).expect("valid header"))
        .text(body.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["outcome"], "captured");

    // Redelivery is acknowledged without settling again
    let response = server
        .post("/api/v1/payments/webhook")
        .add_header(signature_header, HeaderValue::from_str(&sig).expect("valid header"))
        .text(body)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["outcome"], "ignored");

    let payments: Value = server
        .get("/api/v1/me/payments")
        .add_header(header::AUTHORIZATION, bearer(&student_token))
        .await
        .json();
    assert_eq!(payments["items"][0]["status"], "success");
}

#[tokio::test]
async fn test_unknown_api_route_is_json_404() {
    let server = setup().await;

    let response = server.get("/api/v1/nothing-here").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}
