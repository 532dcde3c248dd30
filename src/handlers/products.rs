use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, paginated_response, success_response, PaginationParams,
};
use crate::services::products::{CreateProductInput, CreateVariantInput, UpdateProductInput};
use crate::AppState;

async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.create_product(input).await?;
    Ok(created_response(product))
}

#[derive(Debug, serde::Deserialize)]
struct ListProductsParams {
    q: Option<String>,
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

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListProductsParams>,
) -> Result<Response, ServiceError> {
    let (products, total) = state
        .services
        .products
        .list_products(params.page, params.per_page, params.q.as_deref())
        .await?;
    let pagination = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    };
    Ok(paginated_response(products, total, &pagination))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let (product, variants) = state.services.products.get_product_with_variants(id).await?;
    Ok(success_response(serde_json::json!({
        "product": product,
        "variants": variants,
    })))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.update_product(id, input).await?;
    Ok(success_response(product))
}

async fn create_variant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateVariantInput>,
) -> Result<Response, ServiceError> {
    let variant = state.services.products.create_variant(id, input).await?;
    Ok(created_response(variant))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/{id}", get(get_product).put(update_product))
        .route("/{id}/variants", post(create_variant))
}
