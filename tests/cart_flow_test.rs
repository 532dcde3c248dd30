mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use storefront_api::entities::coupon::DiscountType;
use storefront_api::entities::{product, Product};
use storefront_api::errors::ServiceError;
use storefront_api::services::carts::AddItemInput;

use common::{seed_coupon, seed_product, setup};

fn add(product_id: Uuid, quantity: i32) -> AddItemInput {
    AddItemInput {
        product_id,
        variant_sku: None,
        quantity,
    }
}

#[tokio::test]
async fn adding_same_product_merges_lines() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 1))
        .await
        .unwrap();
    let view = ctx
        .services
        .carts
        .add_item(customer, add(widget.id, 2))
        .await
        .unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.items[0].line_total, dec!(60.00));
}

#[tokio::test]
async fn totals_include_flat_shipping_below_threshold() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    let view = ctx
        .services
        .carts
        .add_item(customer, add(widget.id, 2))
        .await
        .unwrap();

    // 40 subtotal, under the 50 free-shipping threshold, 8% tax.
    assert_eq!(view.totals.subtotal, dec!(40.00));
    assert_eq!(view.totals.shipping, dec!(10.00));
    assert_eq!(view.totals.tax, dec!(3.20));
    assert_eq!(view.totals.total, dec!(53.20));
}

#[tokio::test]
async fn subtotal_at_threshold_ships_free() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(25.00), 10).await;

    let view = ctx
        .services
        .carts
        .add_item(customer, add(widget.id, 2))
        .await
        .unwrap();

    assert_eq!(view.totals.subtotal, dec!(50.00));
    assert_eq!(view.totals.shipping, dec!(0.00));
}

#[tokio::test]
async fn repeated_reads_are_idempotent() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(19.99), 10).await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 3))
        .await
        .unwrap();

    let first = ctx.services.carts.get_cart(customer).await.unwrap();
    let second = ctx.services.carts.get_cart(customer).await.unwrap();
    assert_eq!(first.totals, second.totals);
    assert_eq!(first.items[0].line_total, second.items[0].line_total);
}

#[tokio::test]
async fn zero_quantity_update_removes_line() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    let view = ctx
        .services
        .carts
        .add_item(customer, add(widget.id, 2))
        .await
        .unwrap();
    let item_id = view.items[0].id;

    let view = ctx
        .services
        .carts
        .update_item_quantity(customer, item_id, 0)
        .await
        .unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.totals.total, dec!(0));
}

#[tokio::test]
async fn reads_reprice_against_live_catalog() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    let view = ctx
        .services
        .carts
        .add_item(customer, add(widget.id, 1))
        .await
        .unwrap();
    assert_eq!(view.items[0].unit_price, dec!(20.00));

    // Price change lands on the next read without touching the cart.
    let mut model: product::ActiveModel = Product::find_by_id(widget.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    model.price = Set(dec!(35.00));
    model.update(ctx.db.as_ref()).await.unwrap();

    let view = ctx.services.carts.get_cart(customer).await.unwrap();
    assert_eq!(view.items[0].unit_price, dec!(35.00));
    assert_eq!(view.totals.subtotal, dec!(35.00));
}

#[tokio::test]
async fn stock_drop_clamps_quantity_and_flags_line() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 5))
        .await
        .unwrap();

    let mut model: product::ActiveModel = Product::find_by_id(widget.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    model.stock = Set(2);
    model.update(ctx.db.as_ref()).await.unwrap();

    let view = ctx.services.carts.get_cart(customer).await.unwrap();
    assert_eq!(view.items[0].quantity, 2);
    assert!(!view.items[0].in_stock);
    assert_eq!(view.totals.subtotal, dec!(40.00));
}

#[tokio::test]
async fn archived_product_line_is_flagged_not_removed() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 2))
        .await
        .unwrap();

    let mut model: product::ActiveModel = Product::find_by_id(widget.id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    model.status = Set(product::ProductStatus::Archived);
    model.update(ctx.db.as_ref()).await.unwrap();

    let view = ctx.services.carts.get_cart(customer).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert!(!view.items[0].in_stock);
    assert_eq!(view.items[0].line_total, dec!(0));
    assert_eq!(view.totals.subtotal, dec!(0));
    assert_eq!(view.totals.total, dec!(0));
}

#[tokio::test]
async fn coupon_applies_and_goes_dormant_when_invalid() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(60.00), 10).await;
    seed_coupon(
        &ctx.db,
        "TENOFF",
        DiscountType::Percentage,
        dec!(10),
        dec!(50.00),
        None,
    )
    .await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 1))
        .await
        .unwrap();
    let view = ctx
        .services
        .carts
        .apply_coupon(customer, "tenoff")
        .await
        .unwrap();
    assert_eq!(view.coupon_code.as_deref(), Some("TENOFF"));
    assert_eq!(view.totals.discount, dec!(6.00));
    assert_eq!(view.totals.total, dec!(58.80));

    // Shrinking the cart below the minimum keeps the code attached but it
    // contributes nothing.
    let item_id = view.items[0].id;
    ctx.services
        .carts
        .update_item_quantity(customer, item_id, 0)
        .await
        .unwrap();
    let view = ctx.services.carts.get_cart(customer).await.unwrap();
    assert_eq!(view.coupon_code.as_deref(), Some("TENOFF"));
    assert_eq!(view.totals.discount, dec!(0));
}

#[tokio::test]
async fn applying_coupon_below_minimum_fails() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let widget = seed_product(&ctx.db, "Widget", dec!(20.00), 10).await;
    seed_coupon(
        &ctx.db,
        "BIGSPEND",
        DiscountType::Fixed,
        dec!(15.00),
        dec!(100.00),
        None,
    )
    .await;

    ctx.services
        .carts
        .add_item(customer, add(widget.id, 1))
        .await
        .unwrap();
    let err = ctx
        .services
        .carts
        .apply_coupon(customer, "BIGSPEND")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BelowMinimumPurchase(_));
}

#[tokio::test]
async fn unknown_product_rejected() {
    let ctx = setup().await;
    let customer = Uuid::new_v4();
    let err = ctx
        .services
        .carts
        .add_item(customer, add(Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
