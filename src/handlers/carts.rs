use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::services::carts::AddItemInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct UpdateQuantityPayload {
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct ApplyCouponPayload {
    code: String,
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let view = state.services.carts.get_cart(customer_id).await?;
    Ok(success_response(view))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> Result<Response, ServiceError> {
    let view = state.services.carts.add_item(customer_id, input).await?;
    Ok(success_response(view))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityPayload>,
) -> Result<Response, ServiceError> {
    let view = state
        .services
        .carts
        .update_item_quantity(customer_id, item_id, payload.quantity)
        .await?;
    Ok(success_response(view))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((customer_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError> {
    let view = state
        .services
        .carts
        .remove_item(customer_id, item_id)
        .await?;
    Ok(success_response(view))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let view = state.services.carts.clear_cart(customer_id).await?;
    Ok(success_response(view))
}

async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<ApplyCouponPayload>,
) -> Result<Response, ServiceError> {
    let view = state
        .services
        .carts
        .apply_coupon(customer_id, &payload.code)
        .await?;
    Ok(success_response(view))
}

async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let view = state.services.carts.remove_coupon(customer_id).await?;
    Ok(success_response(view))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{customer_id}", get(get_cart).delete(clear_cart))
        .route("/{customer_id}/items", post(add_item))
        .route(
            "/{customer_id}/items/{item_id}",
            put(update_item).delete(remove_item),
        )
        .route(
            "/{customer_id}/coupon",
            post(apply_coupon).delete(remove_coupon),
        )
}
