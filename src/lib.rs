//! Binstock API Library
//!
//! Warehouse bin and inventory management: zones and bins, stock moves and
//! adjustments, CSV import/export, stock counts and notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use handlers::inventory::InventoryHandlerState;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<auth::AuthService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Result<Self, auth::AuthError> {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        let auth = Arc::new(auth::AuthService::new(
            auth::AuthConfig::from(&config),
            db.clone(),
        )?);
        Ok(Self {
            db,
            config,
            event_sender,
            services,
            auth,
        })
    }
}

impl InventoryHandlerState for AppState {
    fn inventory_service(&self) -> &services::inventory::InventoryService {
        &self.services.inventory
    }

    fn import_service(&self) -> &services::csv_import::ImportService {
        &self.services.imports
    }

    fn app_config(&self) -> &config::AppConfig {
        &self.config
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// `/api/v1` routes, each group gated by one permission
pub fn api_v1_routes() -> Router<AppState> {
    // Locations
    let locations_read = Router::new()
        .route("/zones", get(handlers::locations::list_zones))
        .route("/zones/:id", get(handlers::locations::get_zone))
        .route("/bins/:code", get(handlers::locations::get_bin))
        .with_permission(perm::INVENTORY_READ);

    let locations_write = Router::new()
        .route("/bins", post(handlers::locations::create_bin))
        .with_permission(perm::INVENTORY_ADJUST);

    // Products
    let products_read = Router::new()
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route(
            "/products/:id/history",
            get(handlers::products::product_history),
        )
        .with_permission(perm::INVENTORY_READ);

    // Inventory
    let inventory_read =
        handlers::inventory::inventory_read_router::<AppState>().with_permission(perm::INVENTORY_READ);
    let inventory_move =
        handlers::inventory::inventory_move_router::<AppState>().with_permission(perm::INVENTORY_MOVE);
    let inventory_adjust = handlers::inventory::inventory_adjust_router::<AppState>()
        .with_permission(perm::INVENTORY_ADJUST);
    let inventory_import = handlers::inventory::inventory_import_router::<AppState>()
        .with_permission(perm::INVENTORY_IMPORT);
    let inventory_export = handlers::inventory::inventory_export_router::<AppState>()
        .with_permission(perm::INVENTORY_EXPORT);

    // Stock counts
    let counts_read = Router::new()
        .route("/stock-counts", get(handlers::stock_counts::list_counts))
        .route("/stock-counts/:id", get(handlers::stock_counts::get_count))
        .route(
            "/stock-counts/:id/variance",
            get(handlers::stock_counts::get_variance),
        )
        .route(
            "/stock-counts/:id/export",
            get(handlers::stock_counts::export_report),
        )
        .route(
            "/stock-counts/zones/:zone_count_id/items",
            get(handlers::stock_counts::zone_items),
        )
        .with_permission(perm::STOCKCOUNTS_READ);

    let counts_create = Router::new()
        .route("/stock-counts", post(handlers::stock_counts::start_count))
        .route(
            "/stock-counts/:id/complete",
            post(handlers::stock_counts::complete_count),
        )
        .with_permission(perm::STOCKCOUNTS_CREATE);

    let counts_count = Router::new()
        .route(
            "/stock-counts/zones/:zone_count_id/items",
            post(handlers::stock_counts::add_unexpected_item),
        )
        .route(
            "/stock-counts/items/:item_id",
            put(handlers::stock_counts::update_item),
        )
        .with_permission(perm::STOCKCOUNTS_COUNT);

    let counts_delete = Router::new()
        .route(
            "/stock-counts/:id",
            delete(handlers::stock_counts::delete_count),
        )
        .with_permission(perm::STOCKCOUNTS_DELETE);

    // Users
    let users = Router::new()
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/users/:id",
            put(handlers::users::update_user).delete(handlers::users::deactivate_user),
        )
        .with_permission(perm::USERS_MANAGE);

    // Notifications only need a signed-in user
    let notifications = Router::new()
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/read-all",
            post(handlers::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::notifications::mark_read),
        )
        .with_auth();

    Router::new()
        .route("/status", get(api_status))
        .merge(locations_read)
        .merge(locations_write)
        .merge(products_read)
        .merge(inventory_read)
        .merge(inventory_move)
        .merge(inventory_adjust)
        .merge(inventory_import)
        .merge(inventory_export)
        .merge(counts_read)
        .merge(counts_create)
        .merge(counts_count)
        .merge(counts_delete)
        .merge(users)
        .merge(notifications)
}

/// Full application router: health, auth, `/api/v1`, metrics and API docs.
///
/// The auth service is injected into request extensions for the auth
/// middleware, and every request gets a request id. Transport layers
/// (CORS, compression, body limits) are added by the binary.
pub fn app_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();

    Router::<AppState>::new()
        .route("/", get(|| async { "binstock-api up" }))
        .nest("/health", handlers::health::health_routes())
        .nest("/auth", handlers::auth::auth_router())
        .nest("/api/v1", api_v1_routes())
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<auth::AuthService>>,
             mut req: axum::extract::Request,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "binstock-api",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "login_enabled": state.config.auth_proxy_url.is_some(),
    });

    Json(ApiResponse::success(status_data))
}
