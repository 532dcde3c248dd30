use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Envelope for paginated list responses.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Common pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse { data })).into_response()
}

pub fn paginated_response<T: Serialize>(
    items: Vec<T>,
    total: u64,
    params: &PaginationParams,
) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse {
            data: PaginatedResponse {
                items,
                total,
                page: params.page,
                per_page: params.per_page,
            },
        }),
    )
        .into_response()
}
