#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use binstock_api::{
    app_router,
    config::AppConfig,
    db,
    entities::user::{self, UserRole},
    events::{self, EventHandler, EventSender},
    services::{
        notifications::{NotificationHandler, NotificationService},
        users::CreateUserRequest,
    },
    AppState,
};

/// Helper harness spinning up the full router over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: user::Model,
    token: String,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Test application without an auth proxy (login disabled).
    pub async fn new() -> Self {
        Self::with_proxy(None).await
    }

    /// Test application whose login calls the given auth proxy URL.
    pub async fn with_proxy(proxy_url: Option<String>) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let db_path = db_dir.path().join("binstock_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.import_batch_size = 2;
        cfg.low_stock_threshold = 5;
        cfg.auth_proxy_url = proxy_url;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(NotificationHandler::new(
            NotificationService::new(db_arc.clone()),
            cfg.low_stock_threshold,
        ))];
        let event_task = tokio::spawn(events::process_events(event_rx, handlers));

        let state = AppState::new(db_arc, cfg, event_sender).expect("app state for tests");

        let admin = state
            .services
            .users
            .create_user(CreateUserRequest {
                username: "admin".to_string(),
                display_name: "Test Admin".to_string(),
                role: UserRole::Admin,
                employee_id: Some("E0001".to_string()),
            })
            .await
            .expect("seed admin user");
        let token = state
            .auth
            .generate_token(&admin)
            .await
            .expect("admin token")
            .access_token;

        let router = app_router(state.clone());

        Self {
            router,
            state,
            admin,
            token,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Bearer token for the seeded admin user.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Creates a user with `role` and returns an access token for it.
    pub async fn token_for_role(&self, username: &str, role: UserRole) -> String {
        let user = self
            .state
            .services
            .users
            .create_user(CreateUserRequest {
                username: username.to_string(),
                display_name: username.to_string(),
                role,
                employee_id: None,
            })
            .await
            .expect("seed user");
        self.state
            .auth
            .generate_token(&user)
            .await
            .expect("user token")
            .access_token
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request with an optional JSON body and bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// Authenticated JSON request as the admin user.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Upload CSV text to the import endpoint with `token`.
    pub async fn upload_csv(&self, csv: &str, token: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/inventory/import")
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "text/csv")
            .body(Body::from(csv.to_string()))
            .expect("failed to build request");
        self.send(request).await
    }

    /// Import CSV as admin and assert it succeeded.
    pub async fn import(&self, csv: &str) -> Value {
        let response = self.upload_csv(csv, self.token()).await;
        assert_eq!(response.status(), StatusCode::OK, "CSV import failed");
        data(response).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads the whole response body as JSON.
pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Reads the whole response body as text.
pub async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("response body is UTF-8")
}

/// The `data` member of an `ApiResponse` envelope.
pub async fn data(response: Response) -> Value {
    let mut body = json_body(response).await;
    assert_eq!(body["success"], Value::Bool(true), "unexpected body: {}", body);
    body["data"].take()
}
