mod common;

use axum::http::{Method, StatusCode};
use binstock_api::{auth::proxy::hash_password, services::users::UpdateUserRequest};
use common::{data, json_body, TestApp};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn proxy_accepting(username: &str, password: &str, employee_id: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({
            "username": username,
            "password": hash_password(password),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "employee_id": employee_id,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Invalid username or password",
        })))
        .mount(&server)
        .await;
    server
}

async fn app_with(server: &MockServer) -> TestApp {
    TestApp::with_proxy(Some(format!("{}/login", server.uri()))).await
}

async fn login(app: &TestApp, username: &str, password: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/auth/login",
        Some(json!({ "username": username, "password": password })),
        None,
    )
    .await
}

#[tokio::test]
async fn login_issues_tokens_for_known_user() {
    let server = proxy_accepting("admin", "s3cret", "E0001").await;
    let app = app_with(&server).await;

    let response = login(&app, "admin", "s3cret").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = data(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");

    let token = body["access_token"].as_str().unwrap();
    let response = app
        .request(Method::GET, "/api/v1/inventory", None, Some(token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejected_password_is_unauthorized() {
    let server = proxy_accepting("admin", "s3cret", "E0001").await;
    let app = app_with(&server).await;

    let response = login(&app, "admin", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID_CREDENTIALS");
}

#[tokio::test]
async fn proxy_identity_without_local_user_is_not_found() {
    let server = proxy_accepting("stranger", "pw", "E9999").await;
    let app = app_with(&server).await;

    let response = login(&app, "stranger", "pw").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_user_cannot_log_in() {
    let server = proxy_accepting("admin", "s3cret", "E0001").await;
    let app = app_with(&server).await;
    app.state
        .services
        .users
        .update_user(
            app.admin.id,
            UpdateUserRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = login(&app, "admin", "s3cret").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_is_disabled_without_proxy() {
    let app = TestApp::new().await;
    let response = login(&app, "admin", "s3cret").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_LOGIN_DISABLED");
}

#[tokio::test]
async fn broken_proxy_is_a_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;
    let app = app_with(&server).await;

    let response = login(&app, "admin", "s3cret").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

async fn refresh(app: &TestApp, token: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/auth/refresh",
        Some(json!({ "refresh_token": token })),
        None,
    )
    .await
}

#[tokio::test]
async fn refresh_tokens_work_once() {
    let app = TestApp::new().await;
    let pair = app.state.auth.generate_token(&app.admin).await.unwrap();

    let first = refresh(&app, &pair.refresh_token).await;
    assert_eq!(first.status(), StatusCode::OK);
    let next = data(first).await;
    assert!(next["access_token"].is_string());

    let reused = refresh(&app, &pair.refresh_token).await;
    assert_eq!(reused.status(), StatusCode::UNAUTHORIZED);

    // An access token is not a refresh token
    let wrong_kind = refresh(&app, &pair.access_token).await;
    assert_eq!(wrong_kind.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let app = TestApp::new().await;
    let pair = app.state.auth.generate_token(&app.admin).await.unwrap();

    let response = app
        .request(
            Method::POST,
            "/auth/logout",
            Some(json!({ "refresh_token": pair.refresh_token })),
            Some(&pair.access_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = app
        .request(Method::GET, "/api/v1/inventory", None, Some(&pair.access_token))
        .await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    let refreshed = refresh(&app, &pair.refresh_token).await;
    assert_eq!(refreshed.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/zones", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
