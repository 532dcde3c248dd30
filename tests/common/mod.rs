#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema, Set,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::config::AppConfig;
use storefront_api::entities::{cart, cart_item, coupon, order, order_item, order_status_history, product, product_variant};
use storefront_api::events::{Event, EventSender};
use storefront_api::handlers::AppServices;

/// Everything a test needs: an isolated in-memory database with the full
/// schema plus wired services. The event receiver is held open so event
/// publication behaves as it does in production.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub config: Arc<AppConfig>,
    _event_rx: mpsc::Receiver<Event>,
}

pub async fn setup() -> TestContext {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");

    let schema = Schema::new(DbBackend::Sqlite);
    let statements = [
        schema.create_table_from_entity(product::Entity),
        schema.create_table_from_entity(product_variant::Entity),
        schema.create_table_from_entity(coupon::Entity),
        schema.create_table_from_entity(cart::Entity),
        schema.create_table_from_entity(cart_item::Entity),
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
        schema.create_table_from_entity(order_status_history::Entity),
    ];
    for statement in statements {
        db.execute(db.get_database_backend().build(&statement))
            .await
            .expect("create table");
    }

    let db = Arc::new(db);
    let config = Arc::new(AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        0,
        "test".to_string(),
    ));

    let (tx, rx) = mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(tx));
    let services = AppServices::new(Arc::clone(&db), event_sender, Arc::clone(&config));

    TestContext {
        db,
        services,
        config,
        _event_rx: rx,
    }
}

pub async fn seed_product(
    db: &DatabaseConnection,
    name: &str,
    price: Decimal,
    stock: i32,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(name.to_lowercase().replace(' ', "-")),
        description: Set(String::new()),
        status: Set(product::ProductStatus::Active),
        price: Set(price),
        sale_price: Set(None),
        is_on_sale: Set(false),
        sale_starts_at: Set(None),
        sale_ends_at: Set(None),
        stock: Set(stock),
        sold_count: Set(0),
        image_url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn seed_variant(
    db: &DatabaseConnection,
    product_id: Uuid,
    sku: &str,
    price: Decimal,
    stock: i32,
) -> product_variant::Model {
    let now = Utc::now();
    product_variant::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        sku: Set(sku.to_string()),
        name: Set(sku.to_string()),
        price: Set(price),
        stock: Set(stock),
        sold_count: Set(0),
        options: Set(serde_json::json!({})),
        position: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert variant")
}

pub async fn seed_coupon(
    db: &DatabaseConnection,
    code: &str,
    discount_type: coupon::DiscountType,
    value: Decimal,
    min_purchase: Decimal,
    usage_limit: Option<i32>,
) -> coupon::Model {
    let now = Utc::now();
    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        discount_type: Set(discount_type),
        discount_value: Set(value),
        min_purchase: Set(min_purchase),
        max_discount: Set(None),
        starts_at: Set(now - Duration::days(1)),
        ends_at: Set(now + Duration::days(30)),
        usage_limit: Set(usage_limit),
        used_count: Set(0),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert coupon")
}

pub fn shipping_address() -> serde_json::Value {
    serde_json::json!({
        "name": "Ada Lovelace",
        "line1": "12 Analytical Way",
        "city": "London",
        "postal_code": "N1 7AA",
        "country": "GB",
    })
}
