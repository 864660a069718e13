use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::common::success_response,
    services::notifications::Inbox,
    AppState,
};
use axum::{
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

/// Latest notifications for the current user, own and broadcast
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    responses(
        (status = 200, description = "Inbox", body = Inbox),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let inbox = state.services.notifications.inbox(user.user_id).await?;
    Ok(success_response(inbox))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read"),
        (status = 404, description = "Notification not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .notifications
        .mark_read(user.user_id, id)
        .await?;
    Ok(success_response(json!({ "id": id, "is_read": true })))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read-all",
    responses(
        (status = 200, description = "Number of notifications marked read"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .notifications
        .mark_all_read(user.user_id)
        .await?;
    Ok(success_response(json!({ "updated": updated })))
}
