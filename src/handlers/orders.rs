use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, paginated_response, success_response, PaginationParams,
};
use crate::services::orders::{ConfirmPaymentInput, FailPaymentInput, PlaceOrderInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct ListOrdersParams {
    customer_id: Option<Uuid>,
    #[serde(default = "default_page")]
    page: u64,
    #[serde(default = "default_per_page")]
    per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize)]
struct UpdateStatusPayload {
    status: OrderStatus,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelPayload {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundPayload {
    /// Amount to refund; omitted means the full order total.
    amount: Option<rust_decimal::Decimal>,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PlaceOrderInput>,
) -> Result<Response, ServiceError> {
    let details = state.services.orders.place_order(input).await?;
    Ok(created_response(details))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(params.customer_id, params.page, params.per_page)
        .await?;
    let pagination = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    };
    Ok(paginated_response(orders, total, &pagination))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let details = state.services.orders.get_order(id).await?;
    Ok(success_response(details))
}

async fn get_order_by_number(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
) -> Result<Response, ServiceError> {
    let details = state
        .services
        .orders
        .get_order_by_number(&order_number)
        .await?;
    Ok(success_response(details))
}

async fn get_status_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let history = state.services.order_status.get_status_history(id).await?;
    Ok(success_response(history))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .order_status
        .update_status(id, payload.status, payload.note)
        .await?;
    Ok(success_response(order))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelPayload>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .order_status
        .cancel_order(id, payload.reason)
        .await?;
    Ok(success_response(order))
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ConfirmPaymentInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.confirm_payment(id, input).await?;
    Ok(success_response(order))
}

async fn fail_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<FailPaymentInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.fail_payment(id, input).await?;
    Ok(success_response(order))
}

async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundPayload>,
) -> Result<Response, ServiceError> {
    let order = state.services.order_status.refund(id, payload.amount).await?;
    Ok(success_response(order))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/{id}", get(get_order))
        .route("/number/{order_number}", get(get_order_by_number))
        .route("/{id}/history", get(get_status_history))
        .route("/{id}/status", put(update_status))
        .route("/{id}/cancel", post(cancel_order))
        .route("/{id}/payment", post(confirm_payment))
        .route("/{id}/payment/failure", post(fail_payment))
        .route("/{id}/refund", post(refund_order))
}
