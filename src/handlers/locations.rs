use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::locations::{BinDetail, CreateBinRequest, ZoneDetail, ZoneSummary},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

/// List zones with bin and item counts
#[utoipa::path(
    get,
    path = "/api/v1/zones",
    responses(
        (status = 200, description = "Zones ordered for display", body = [ZoneSummary]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn list_zones(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let zones = state.services.locations.list_zones().await?;
    Ok(success_response(zones))
}

/// Get one zone and its bins
#[utoipa::path(
    get,
    path = "/api/v1/zones/{id}",
    params(("id" = Uuid, Path, description = "Zone id")),
    responses(
        (status = 200, description = "Zone with bins", body = ZoneDetail),
        (status = 404, description = "Zone not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn get_zone(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let zone = state.services.locations.get_zone(id).await?;
    Ok(success_response(zone))
}

/// Get a bin by its code, with contents
#[utoipa::path(
    get,
    path = "/api/v1/bins/{code}",
    params(("code" = String, Path, description = "Bin code, e.g. A1-1")),
    responses(
        (status = 200, description = "Bin with contents", body = BinDetail),
        (status = 404, description = "Bin not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn get_bin(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let bin = state.services.locations.get_bin_by_code(&code).await?;
    Ok(success_response(bin))
}

/// Create a bin; its zone is derived from the code
#[utoipa::path(
    post,
    path = "/api/v1/bins",
    request_body = CreateBinRequest,
    responses(
        (status = 201, description = "Bin created", body = crate::entities::bin::Model),
        (status = 400, description = "Invalid bin code", body = crate::errors::ErrorResponse),
        (status = 409, description = "Bin already exists", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "locations"
)]
pub async fn create_bin(
    State(state): State<AppState>,
    Json(payload): Json<CreateBinRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let bin = state.services.locations.create_bin(payload).await?;
    Ok(created_response(bin))
}
