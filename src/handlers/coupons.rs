use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, paginated_response, success_response, PaginationParams,
};
use crate::services::coupons::CreateCouponInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct PreviewPayload {
    total: Decimal,
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCouponInput>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.create_coupon(input).await?;
    Ok(created_response(coupon))
}

async fn list_coupons(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (coupons, total) = state
        .services
        .coupons
        .list_coupons(params.page, params.per_page)
        .await?;
    Ok(paginated_response(coupons, total, &params))
}

async fn get_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.get_by_code(&code).await?;
    Ok(success_response(coupon))
}

async fn deactivate_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.deactivate_coupon(&code).await?;
    Ok(success_response(coupon))
}

/// Dry-run: what would this code take off a given total right now.
async fn preview_coupon(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(payload): Json<PreviewPayload>,
) -> Result<Response, ServiceError> {
    let discount = state
        .services
        .coupons
        .evaluate(&code, payload.total)
        .await?;
    Ok(success_response(serde_json::json!({
        "code": code.trim().to_uppercase(),
        "total": payload.total,
        "discount": discount.round_dp(2),
    })))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_coupon).get(list_coupons))
        .route("/{code}", get(get_coupon).delete(deactivate_coupon))
        .route("/{code}/preview", post(preview_coupon))
}
