use crate::{
    auth::AuthUser,
    entities::{stock_count::CountStatus, stock_count_item},
    errors::ServiceError,
    handlers::common::{actor, created_response, no_content_response, success_response},
    services::stock_count::{
        CompletionSummary, StartCountRequest, StockCountView, UnexpectedItemRequest,
        UpdateItemRequest, VarianceReport, ZoneItemsView,
    },
    AppState,
};
use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CountFilter {
    pub status: Option<CountStatus>,
}

/// List stock counts, newest first
#[utoipa::path(
    get,
    path = "/api/v1/stock-counts",
    params(CountFilter),
    responses(
        (status = 200, description = "Stock counts with progress", body = [StockCountView]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn list_counts(
    State(state): State<AppState>,
    Query(filter): Query<CountFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let counts = state.services.stock_counts.list_counts(filter.status).await?;
    Ok(success_response(counts))
}

/// Start a count over the given zones, snapshotting their inventory
#[utoipa::path(
    post,
    path = "/api/v1/stock-counts",
    request_body = StartCountRequest,
    responses(
        (status = 201, description = "Count started", body = StockCountView),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Zone not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "A zone is already being counted", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn start_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<StartCountRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let count = state
        .services
        .stock_counts
        .start_count(payload, actor(&user))
        .await?;
    Ok(created_response(count))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-counts/{id}",
    params(("id" = Uuid, Path, description = "Stock count id")),
    responses(
        (status = 200, description = "Stock count with zone progress", body = StockCountView),
        (status = 404, description = "Stock count not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn get_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let count = state.services.stock_counts.get_count(id).await?;
    Ok(success_response(count))
}

/// Delete a count and its items; inventory is untouched
#[utoipa::path(
    delete,
    path = "/api/v1/stock-counts/{id}",
    params(("id" = Uuid, Path, description = "Stock count id")),
    responses(
        (status = 204, description = "Stock count deleted"),
        (status = 404, description = "Stock count not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn delete_count(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.stock_counts.delete_count(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-counts/{id}/variance",
    params(("id" = Uuid, Path, description = "Stock count id")),
    responses(
        (status = 200, description = "Discrepancies and summary", body = VarianceReport),
        (status = 404, description = "Stock count not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn get_variance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.stock_counts.get_variance(id).await?;
    Ok(success_response(report))
}

/// Download every item of a count as CSV
#[utoipa::path(
    get,
    path = "/api/v1/stock-counts/{id}/export",
    params(("id" = Uuid, Path, description = "Stock count id")),
    responses(
        (status = 200, description = "Count report CSV", content_type = "text/csv", body = String),
        (status = 404, description = "Stock count not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn export_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.stock_counts.export_report(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", report.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        format!("\u{feff}{}", report.csv),
    ))
}

/// Apply counted quantities to inventory and close the count
#[utoipa::path(
    post,
    path = "/api/v1/stock-counts/{id}/complete",
    params(("id" = Uuid, Path, description = "Stock count id")),
    responses(
        (status = 200, description = "Count completed", body = CompletionSummary),
        (status = 400, description = "Count already completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Stock count not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn complete_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .stock_counts
        .complete_count(id, actor(&user))
        .await?;
    Ok(success_response(summary))
}

/// Items of one zone in a count, grouped by bin
#[utoipa::path(
    get,
    path = "/api/v1/stock-counts/zones/{zone_count_id}/items",
    params(("zone_count_id" = Uuid, Path, description = "Stock count zone id")),
    responses(
        (status = 200, description = "Items by bin", body = ZoneItemsView),
        (status = 404, description = "Stock count zone not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn zone_items(
    State(state): State<AppState>,
    Path(zone_count_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.stock_counts.zone_items(zone_count_id).await?;
    Ok(success_response(view))
}

/// Record an item found in a counted zone that the snapshot missed
#[utoipa::path(
    post,
    path = "/api/v1/stock-counts/zones/{zone_count_id}/items",
    params(("zone_count_id" = Uuid, Path, description = "Stock count zone id")),
    request_body = UnexpectedItemRequest,
    responses(
        (status = 201, description = "Item added", body = stock_count_item::Model),
        (status = 400, description = "Bin outside the zone or count closed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Item already in the count", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn add_unexpected_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(zone_count_id): Path<Uuid>,
    Json(payload): Json<UnexpectedItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .stock_counts
        .add_unexpected_item(zone_count_id, payload, actor(&user))
        .await?;
    Ok(created_response(item))
}

/// Record the counted quantity of one item
#[utoipa::path(
    put,
    path = "/api/v1/stock-counts/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Stock count item id")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item counted", body = stock_count_item::Model),
        (status = 400, description = "Count closed or invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "stock-counts"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .stock_counts
        .update_item(item_id, payload, actor(&user))
        .await?;
    Ok(success_response(item))
}
