//! E2E tests for health check, login and metrics

mod common;

use common::TestServer;
use jokebox::auth::LoginResponse;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_cors_headers() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .header("Origin", "https://test.example.com")
        .send()
        .await
        .unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_404_for_unknown_routes() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/unknown/route"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_login_sets_cookie_and_creates_user() {
    let server = TestServer::new().await;
    let token = server.token_for("alice");

    let response = server
        .client
        .post(server.url("/api/login"))
        .json(&serde_json::json!({ "token": token }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let body: LoginResponse = response.json().await.unwrap();
    assert_eq!(body.message, "Login successful");
    assert_eq!(body.user_id, "alice");
    assert_eq!(body.user_email, "alice@test.example.com");

    use jokebox::data::JokeStore;
    let user = server.store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("alice@test.example.com"));
    assert!(user.favorites.is_empty());
}

#[tokio::test]
async fn test_login_rejects_invalid_token() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/api/login"))
        .json(&serde_json::json!({ "token": "garbage.token" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_session_cookie_authenticates_requests() {
    let server = TestServer::new().await;
    let token = server.token_for("bob");

    let response = server
        .client
        .get(server.url("/api/users/bob/favorites"))
        .header("Cookie", format!("session={token}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_metrics_require_auth() {
    let server = TestServer::new().await;
    jokebox::metrics::init_metrics();

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .get(server.url("/metrics"))
        .bearer_auth(server.token_for("ops"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}
