use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Binstock API",
        version = "1.0.0",
        description = r#"
# Binstock Warehouse API

Bin-level inventory for a warehouse: where every product sits, how much of it, and who moved it.

## Features

- **Locations**: Zones and bins derived from bin codes such as `A1-1`
- **Inventory**: Move stock between bins, set quantities, receive new stock
- **CSV Import/Export**: Bulk upsert of products, bins and quantities
- **Stock Counts**: Snapshot zones, count, review variance, apply adjustments
- **History**: Per-product audit trail of every change
- **Notifications**: Low stock, import and stock count notices

## Authentication

Log in with `POST /auth/login`; credentials are verified by the company auth proxy.
Send the returned access token on every `/api/v1` request:

```
Authorization: Bearer <access-token>
```

## Error Handling

Errors use one JSON shape with an HTTP status that matches the failure:

```json
{
  "error": "Insufficient stock",
  "message": "Bin A1-1 holds 3, cannot move 5",
  "request_id": "6f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints take `page` (default 1) and `limit` (clamped to the configured maximum).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, token refresh and logout"),
        (name = "locations", description = "Zones and bins"),
        (name = "products", description = "Product catalog and history"),
        (name = "inventory", description = "Stock queries, moves, adjustments, CSV import/export"),
        (name = "stock-counts", description = "Stock count workflow"),
        (name = "users", description = "Staff accounts"),
        (name = "notifications", description = "In-app notifications"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Auth
        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,

        // Locations
        crate::handlers::locations::list_zones,
        crate::handlers::locations::get_zone,
        crate::handlers::locations::get_bin,
        crate::handlers::locations::create_bin,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::product_history,

        // Inventory
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::activity,
        crate::handlers::inventory::move_inventory,
        crate::handlers::inventory::adjust_inventory,
        crate::handlers::inventory::add_inventory,
        crate::handlers::inventory::import_inventory,
        crate::handlers::inventory::export_inventory,

        // Stock counts
        crate::handlers::stock_counts::list_counts,
        crate::handlers::stock_counts::start_count,
        crate::handlers::stock_counts::get_count,
        crate::handlers::stock_counts::delete_count,
        crate::handlers::stock_counts::get_variance,
        crate::handlers::stock_counts::export_report,
        crate::handlers::stock_counts::complete_count,
        crate::handlers::stock_counts::zone_items,
        crate::handlers::stock_counts::add_unexpected_item,
        crate::handlers::stock_counts::update_item,

        // Users
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::deactivate_user,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_read,
        crate::handlers::notifications::mark_all_read,

        // Health
        crate::handlers::health::liveness_check,
        crate::handlers::health::readiness_check,
        crate::handlers::health::detailed_health_check,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Auth
            crate::auth::LoginRequest,
            crate::auth::LoginResponse,
            crate::auth::TokenPair,
            crate::auth::RefreshTokenRequest,
            crate::handlers::auth::LogoutRequest,

            // Entities
            crate::entities::zone::Model,
            crate::entities::bin::Model,
            crate::entities::product::Model,
            crate::entities::user::Model,
            crate::entities::user::UserRole,
            crate::entities::inventory_log::LogAction,
            crate::entities::stock_count::Model,
            crate::entities::stock_count::CountStatus,
            crate::entities::stock_count_item::Model,
            crate::entities::notification::Model,

            // Locations and products
            crate::services::locations::ZoneSummary,
            crate::services::locations::BinSummary,
            crate::services::locations::ZoneDetail,
            crate::services::locations::BinDetail,
            crate::services::locations::CreateBinRequest,
            crate::services::products::ProductInput,
            crate::handlers::products::ProductDetail,

            // Inventory
            crate::services::inventory::InventoryLine,
            crate::services::inventory::LogLine,
            crate::services::inventory::MoveRequest,
            crate::services::inventory::MoveOutcome,
            crate::services::inventory::AdjustRequest,
            crate::services::inventory::AdjustOutcome,
            crate::services::inventory::AddStockRequest,
            crate::services::csv_import::ImportSummary,
            crate::services::csv_import::BatchResult,

            // Stock counts
            crate::services::stock_count::StartCountRequest,
            crate::services::stock_count::UpdateItemRequest,
            crate::services::stock_count::UnexpectedItemRequest,
            crate::services::stock_count::StockCountView,
            crate::services::stock_count::ZoneProgress,
            crate::services::stock_count::ZoneItemsView,
            crate::services::stock_count::BinItems,
            crate::services::stock_count::CountItemLine,
            crate::services::stock_count::VarianceReport,
            crate::services::stock_count::VarianceSummary,
            crate::services::stock_count::CompletionSummary,

            // Users and notifications
            crate::services::users::CreateUserRequest,
            crate::services::users::UpdateUserRequest,
            crate::services::notifications::Inbox,

            // Health
            crate::handlers::health::HealthResponse,
        )
    )
)]
pub struct ApiDocV1;

/// Registers the bearer JWT scheme referenced by `security(("bearer_auth" = []))`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
