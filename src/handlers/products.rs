use crate::{
    errors::ServiceError,
    handlers::common::{paginated, success_response, PaginationParams},
    services::inventory::{InventoryLine, LogLine},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductSearch {
    /// Matches product codes and names
    pub search: Option<String>,
}

/// A product with every record holding it
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: crate::entities::product::Model,
    pub stock: Vec<InventoryLine>,
    pub total_qty: i64,
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams, ProductSearch),
    responses(
        (status = 200, description = "Page of products"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ProductSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.resolve(&state.config);
    let (products, total) = state
        .services
        .products
        .list_products(page, limit, filter.search)
        .await?;
    Ok(success_response(paginated(products, total, page, limit)))
}

/// Get a product and where it is stocked
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product with stock locations", body = ProductDetail),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get_product(id).await?;
    let stock = state.services.inventory.product_stock(id).await?;
    let total_qty = stock.iter().map(|line| i64::from(line.qty)).sum();
    Ok(success_response(ProductDetail {
        product,
        stock,
        total_qty,
    }))
}

/// Audit trail for a product, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/history",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Log rows", body = [LogLine]),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn product_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let history = state.services.inventory.product_history(id).await?;
    Ok(success_response(history))
}
