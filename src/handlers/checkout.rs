use axum::{
    extract::{Path, State},
    response::Response,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::created_response;
use crate::services::orders::CreateOrderInput;
use crate::AppState;

/// Converts the customer's cart into an order. On success the cart is empty
/// and the response carries the frozen order snapshot.
async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<CreateOrderInput>,
) -> Result<Response, ServiceError> {
    let details = state
        .services
        .orders
        .create_order(customer_id, input)
        .await?;
    Ok(created_response(details))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/{customer_id}", post(checkout))
}
