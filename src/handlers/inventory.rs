use crate::{
    auth::AuthUser,
    config::AppConfig,
    entities::inventory_log::LogAction,
    errors::ServiceError,
    handlers::common::{actor, created_response, paginated, success_response, PaginationParams},
    services::{
        csv_import::{ImportService, ImportSummary},
        inventory::{
            AddStockRequest, AdjustOutcome, AdjustRequest, InventoryFilter, InventoryLine,
            InventoryService, LogLine, MoveOutcome, MoveRequest,
        },
    },
};
use axum::{
    extract::{Extension, Json, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

const DEFAULT_ACTIVITY_LIMIT: u64 = 50;
const MAX_ACTIVITY_LIMIT: u64 = 500;

// Trait for inventory handler state that provides access to inventory services
pub trait InventoryHandlerState: Clone + Send + Sync + 'static {
    fn inventory_service(&self) -> &InventoryService;
    fn import_service(&self) -> &ImportService;
    fn app_config(&self) -> &AppConfig;
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Defaults to the configured low stock threshold
    pub threshold: Option<i32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    pub action: Option<LogAction>,
    pub limit: Option<u64>,
}

/// Read-only inventory routes
pub fn inventory_read_router<S: InventoryHandlerState>() -> Router<S> {
    Router::new()
        .route("/inventory", get(list_inventory::<S>))
        .route("/inventory/low-stock", get(low_stock::<S>))
        .route("/inventory/activity", get(activity::<S>))
}

pub fn inventory_move_router<S: InventoryHandlerState>() -> Router<S> {
    Router::new().route("/inventory/move", post(move_inventory::<S>))
}

pub fn inventory_adjust_router<S: InventoryHandlerState>() -> Router<S> {
    Router::new()
        .route("/inventory/adjust", post(adjust_inventory::<S>))
        .route("/inventory/add", post(add_inventory::<S>))
}

pub fn inventory_import_router<S: InventoryHandlerState>() -> Router<S> {
    Router::new().route("/inventory/import", post(import_inventory::<S>))
}

pub fn inventory_export_router<S: InventoryHandlerState>() -> Router<S> {
    Router::new().route("/inventory/export", get(export_inventory::<S>))
}

/// List inventory with optional filtering
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(PaginationParams, InventoryFilter),
    responses(
        (status = 200, description = "Inventory list returned",
            headers(("X-Request-Id" = String, description = "Unique request id for tracing"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_inventory<S>(
    State(state): State<S>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<InventoryFilter>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let (page, limit) = pagination.resolve(state.app_config());
    let (items, total) = state
        .inventory_service()
        .list_inventory(filter, page, limit)
        .await?;
    Ok(success_response(paginated(items, total, page, limit)))
}

/// Records at or below the low stock threshold
#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Low stock records, emptiest first", body = [InventoryLine]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn low_stock<S>(
    State(state): State<S>,
    Query(query): Query<LowStockQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let threshold = query
        .threshold
        .unwrap_or(state.app_config().low_stock_threshold);
    let items = state.inventory_service().low_stock(threshold).await?;
    Ok(success_response(items))
}

/// Recent audit log rows, newest first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/activity",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Recent activity", body = [LogLine]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn activity<S>(
    State(state): State<S>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let rows = state.inventory_service().activity(query.action, limit).await?;
    Ok(success_response(rows))
}

/// Move stock between two bins
#[utoipa::path(
    post,
    path = "/api/v1/inventory/move",
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Stock moved", body = MoveOutcome),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or bin not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Source holds less than requested", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn move_inventory<S>(
    State(state): State<S>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<MoveRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let outcome = state
        .inventory_service()
        .move_stock(payload, actor(&user))
        .await?;
    Ok(success_response(outcome))
}

/// Set the quantity of one record
#[utoipa::path(
    post,
    path = "/api/v1/inventory/adjust",
    request_body = AdjustRequest,
    responses(
        (status = 200, description = "Quantity set", body = AdjustOutcome),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or bin not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn adjust_inventory<S>(
    State(state): State<S>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AdjustRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let outcome = state
        .inventory_service()
        .adjust_stock(payload, actor(&user))
        .await?;
    Ok(success_response(outcome))
}

/// Receive stock into a bin, creating the product if needed
#[utoipa::path(
    post,
    path = "/api/v1/inventory/add",
    request_body = AddStockRequest,
    responses(
        (status = 201, description = "Stock added", body = AdjustOutcome),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Bin not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn add_inventory<S>(
    State(state): State<S>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddStockRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let outcome = state
        .inventory_service()
        .add_stock(payload, actor(&user))
        .await?;
    Ok(created_response(outcome))
}

/// Import an inventory CSV (raw `text/csv` body)
#[utoipa::path(
    post,
    path = "/api/v1/inventory/import",
    request_body(content = String, content_type = "text/csv", description = "Inventory CSV"),
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "Missing headers or no rows", body = crate::errors::ErrorResponse),
        (status = 413, description = "Body too large"),
        (status = 422, description = "A batch failed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn import_inventory<S>(
    State(state): State<S>,
    Extension(user): Extension<AuthUser>,
    body: String,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let summary = state
        .import_service()
        .import_csv(&body, actor(&user))
        .await?;
    Ok(success_response(summary))
}

/// Export every inventory record as CSV
#[utoipa::path(
    get,
    path = "/api/v1/inventory/export",
    responses(
        (status = 200, description = "Inventory CSV", content_type = "text/csv", body = String),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn export_inventory<S>(State(state): State<S>) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let csv = state.import_service().export_csv().await?;
    let disposition = format!(
        "attachment; filename=\"inventory_export_{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    // Leading BOM so spreadsheet apps read Thai product names as UTF-8
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        format!("\u{feff}{}", csv),
    ))
}
