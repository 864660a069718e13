use crate::{auth::AuthUser, config::AppConfig, ApiResponse, PaginatedResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// User id recorded as the actor of a mutation
pub fn actor(user: &AuthUser) -> Option<Uuid> {
    Some(user.user_id)
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size, clamped to the configured maximum
    pub limit: Option<u32>,
}

impl PaginationParams {
    /// Page number and clamped page size
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        (page, u64::from(config.page_size(self.limit)))
    }
}

pub fn paginated<T>(items: Vec<T>, total: u64, page: u64, limit: u64) -> PaginatedResponse<T> {
    let total_pages = if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    };
    PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(paginated(Vec::<()>::new(), 0, 1, 20).total_pages, 0);
        assert_eq!(paginated(Vec::<()>::new(), 20, 1, 20).total_pages, 1);
        assert_eq!(paginated(Vec::<()>::new(), 21, 2, 20).total_pages, 2);
    }

    #[test]
    fn page_defaults_and_clamps() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "x".repeat(64),
            900,
            3600,
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        let params = PaginationParams {
            page: Some(0),
            limit: Some(u32::MAX),
        };
        let (page, limit) = params.resolve(&config);
        assert_eq!(page, 1);
        assert_eq!(limit, u64::from(config.api_max_page_size));
    }
}
