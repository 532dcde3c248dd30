use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{
    cart, cart_item, coupon, order, order_item, product, product_variant, CartItem, Coupon, Order,
    OrderItem, Product, ProductVariant,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::coupons::CouponService;
use crate::services::notifications::NotificationSender;
use crate::services::order_status::append_history;
use crate::services::pricing;

const ORDER_NUMBER_ATTEMPTS: u32 = 8;

/// Service for order assembly and queries.
///
/// Order creation is all-or-nothing: every stock decrement, the coupon
/// redemption, and the order rows commit in one transaction, and any failure
/// rolls the whole attempt back.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    cart_service: CartService,
    coupon_service: CouponService,
    notifier: Arc<dyn NotificationSender>,
}

/// Checkout from the customer's cart.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[validate(length(min = 1, max = 64))]
    pub payment_method: String,
    pub shipping_address: serde_json::Value,
}

/// One requested line for direct order placement.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub variant_sku: Option<String>,
    pub quantity: i32,
}

/// Direct order placement from explicit lines, bypassing the cart.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrderInput {
    pub customer_id: Uuid,
    #[validate]
    pub items: Vec<OrderLineInput>,
    #[validate(length(min = 1, max = 64))]
    pub payment_method: String,
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmPaymentInput {
    #[validate(length(min = 1, max = 128))]
    pub payment_reference: String,
}

/// Payment-failure callback from the payment provider.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FailPaymentInput {
    #[validate(length(min = 1, max = 128))]
    pub payment_reference: Option<String>,
    pub reason: Option<String>,
}

/// An order with its immutable line snapshots.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        cart_service: CartService,
        coupon_service: CouponService,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            cart_service,
            coupon_service,
            notifier,
        }
    }

    /// Assembles an order from the customer's cart, then empties the cart.
    #[instrument(skip(self, input))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;

        let cart = self.cart_service.get_or_create_cart(customer_id).await?;
        let txn = self.db.begin().await?;

        let cart_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&txn)
            .await?;
        if cart_items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "cannot create an order from an empty cart".to_string(),
            ));
        }

        let lines: Vec<OrderLineInput> = cart_items
            .iter()
            .map(|item| OrderLineInput {
                product_id: item.product_id,
                variant_sku: item.variant_sku.clone(),
                quantity: item.quantity,
            })
            .collect();

        let details = self
            .assemble(
                &txn,
                customer_id,
                &lines,
                cart.coupon_code.clone(),
                input.payment_method,
                input.shipping_address,
                cart.currency.clone(),
            )
            .await?;

        // Empty the cart inside the same transaction; a failed order leaves
        // the cart exactly as it was.
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let mut cart_model: cart::ActiveModel = cart.into();
        cart_model.coupon_code = Set(None);
        cart_model.coupon_discount = Set(Decimal::ZERO);
        cart_model.updated_at = Set(Utc::now());
        cart_model.update(&txn).await?;

        txn.commit().await?;
        self.after_commit(&details).await;
        Ok(details)
    }

    /// Places an order from explicit request lines, without touching any cart.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<OrderDetails, ServiceError> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let details = self
            .assemble(
                &txn,
                input.customer_id,
                &input.items,
                input.coupon_code.map(|c| c.trim().to_uppercase()),
                input.payment_method,
                input.shipping_address,
                self.config.currency.clone(),
            )
            .await?;
        txn.commit().await?;
        self.after_commit(&details).await;
        Ok(details)
    }

    /// The shared assembly core. Runs entirely on the caller's transaction:
    /// strict re-pricing, guarded stock decrements, coupon redemption, the
    /// order and snapshot inserts, and the opening history row.
    async fn assemble(
        &self,
        txn: &DatabaseTransaction,
        customer_id: Uuid,
        lines: &[OrderLineInput],
        coupon_code: Option<String>,
        payment_method: String,
        shipping_address: serde_json::Value,
        currency: String,
    ) -> Result<OrderDetails, ServiceError> {
        let now = Utc::now();
        let pricing_config = self.config.pricing();

        let mut line_totals = Vec::with_capacity(lines.len());
        let mut item_models = Vec::with_capacity(lines.len());

        for line_input in lines {
            if line_input.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "quantity must be positive".to_string(),
                ));
            }

            let product = Product::find_by_id(line_input.product_id)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line_input.product_id))
                })?;
            if !product.is_purchasable() {
                return Err(ServiceError::InvalidOperation(format!(
                    "product '{}' is no longer available",
                    product.name
                )));
            }

            let variant = match &line_input.variant_sku {
                Some(sku) => Some(
                    ProductVariant::find()
                        .filter(product_variant::Column::Sku.eq(sku.clone()))
                        .filter(product_variant::Column::ProductId.eq(product.id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::VariantNotFound(sku.clone()))?,
                ),
                None => None,
            };

            let line = pricing::price_line(&product, variant.as_ref(), line_input.quantity, now);
            if line.quantity < line_input.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "'{}' has {} in stock, {} requested",
                    product.name, line.available_stock, line_input.quantity
                )));
            }

            take_stock(txn, &product, variant.as_ref(), line_input.quantity).await?;

            line_totals.push(line.line_total);
            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(Uuid::nil()), // patched once the order id exists
                product_id: Set(product.id),
                name: Set(product.name.clone()),
                image_url: Set(product.image_url.clone()),
                variant_sku: Set(variant.as_ref().map(|v| v.sku.clone())),
                variant_name: Set(variant.as_ref().map(|v| v.name.clone())),
                quantity: Set(line_input.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.line_total.round_dp(2)),
            });
        }

        let subtotal: Decimal = line_totals.iter().copied().sum();

        // Coupon evaluation and redemption happen inside the transaction so
        // the usage slot rolls back with everything else on failure.
        let mut applied_coupon = None;
        let mut discount = Decimal::ZERO;
        if let Some(code) = coupon_code {
            let coupon = Coupon::find()
                .filter(coupon::Column::Code.eq(code.clone()))
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::CouponNotValid(code.clone()))?;
            discount = coupon.calculate_discount(subtotal, now)?;
            self.coupon_service.redeem(txn, coupon.id).await?;
            applied_coupon = Some(code);
        }

        let totals = pricing::summarize(&line_totals, discount, &pricing_config);
        let order_number = generate_unique_order_number(txn).await?;

        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(payment_method),
            payment_reference: Set(None),
            items_price: Set(totals.subtotal),
            shipping_price: Set(totals.shipping),
            tax_price: Set(totals.tax),
            coupon_code: Set(applied_coupon),
            coupon_discount: Set(totals.discount),
            total_price: Set(totals.total),
            currency: Set(currency),
            shipping_address: Set(shipping_address),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let saved = order_model.insert(txn).await?;

        let mut items = Vec::with_capacity(item_models.len());
        for mut item in item_models {
            item.order_id = Set(order_id);
            items.push(item.insert(txn).await?);
        }

        append_history(
            txn,
            order_id,
            OrderStatus::Pending.as_str(),
            Some("Order created".to_string()),
        )
        .await?;

        Ok(OrderDetails {
            order: saved,
            items,
        })
    }

    /// Post-commit side effects: event publication and the fire-and-forget
    /// confirmation. The order stands even if either fails.
    async fn after_commit(&self, details: &OrderDetails) {
        info!(
            order_id = %details.order.id,
            order_number = %details.order.order_number,
            customer_id = %details.order.customer_id,
            total = %details.order.total_price,
            "Created order"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated(details.order.id))
            .await;

        let notifier = Arc::clone(&self.notifier);
        let order = details.order.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.order_confirmation(&order).await {
                warn!(order_id = %order.id, "Order confirmation failed: {}", err);
            }
        });
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.with_items(order).await
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })?;
        self.with_items(order).await
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(customer_id) = customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Records a successful payment and moves a pending order to confirmed.
    #[instrument(skip(self, input))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        input: ConfirmPaymentInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "order is already paid".to_string(),
            ));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "cannot pay for a cancelled order".to_string(),
            ));
        }

        let was_pending = order.status == OrderStatus::Pending;
        let now = Utc::now();
        let mut model: order::ActiveModel = order.into();
        model.payment_status = Set(PaymentStatus::Paid);
        model.payment_reference = Set(Some(input.payment_reference));
        if was_pending {
            model.status = Set(OrderStatus::Confirmed);
        }
        model.updated_at = Set(now);
        let updated = model.update(&txn).await?;

        if was_pending {
            append_history(
                &txn,
                order_id,
                OrderStatus::Confirmed.as_str(),
                Some("Payment received".to_string()),
            )
            .await?;
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                status: PaymentStatus::Paid.to_string(),
            })
            .await;
        if was_pending {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: OrderStatus::Pending.to_string(),
                    new_status: OrderStatus::Confirmed.to_string(),
                })
                .await;
        }
        Ok(updated)
    }

    /// Records a failed payment attempt. Fulfillment status is untouched, so
    /// a later successful callback can still confirm the order.
    #[instrument(skip(self, input))]
    pub async fn fail_payment(
        &self,
        order_id: Uuid,
        input: FailPaymentInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;

        let order = Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status != PaymentStatus::Pending
            && order.payment_status != PaymentStatus::Failed
        {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot record a payment failure for an order with payment status {}",
                order.payment_status
            )));
        }

        let mut model: order::ActiveModel = order.into();
        model.payment_status = Set(PaymentStatus::Failed);
        if input.payment_reference.is_some() {
            model.payment_reference = Set(input.payment_reference);
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.db.as_ref()).await?;

        warn!(
            order_id = %order_id,
            reason = input.reason.as_deref().unwrap_or("unspecified"),
            "Payment failed"
        );
        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                status: PaymentStatus::Failed.to_string(),
            })
            .await;
        Ok(updated)
    }

    async fn with_items(&self, order: order::Model) -> Result<OrderDetails, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await?;
        Ok(OrderDetails { order, items })
    }
}

/// Takes stock with a guarded decrement. The `stock >= qty` filter makes the
/// write race-safe: of two concurrent orders for the last unit, exactly one
/// sees a row update and the other gets `rows_affected == 0`.
async fn take_stock<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
    variant: Option<&product_variant::Model>,
    quantity: i32,
) -> Result<(), ServiceError> {
    if let Some(variant) = variant {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(
                product_variant::Column::SoldCount,
                Expr::col(product_variant::Column::SoldCount).add(quantity),
            )
            .filter(product_variant::Column::Id.eq(variant.id))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "variant '{}' sold out concurrently",
                variant.sku
            )));
        }
        // Keep the product aggregate in step with its variant.
        Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).add(quantity),
            )
            .filter(product::Column::Id.eq(product.id))
            .exec(conn)
            .await?;
        return Ok(());
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(
            product::Column::SoldCount,
            Expr::col(product::Column::SoldCount).add(quantity),
        )
        .filter(product::Column::Id.eq(product.id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "'{}' sold out concurrently",
            product.name
        )));
    }
    Ok(())
}

/// Formats an order number from a date and a 4-digit suffix.
fn format_order_number(now: chrono::DateTime<Utc>, suffix: u32) -> String {
    format!("ORD-{}-{:04}", now.format("%Y%m%d"), suffix)
}

/// Generates an order number unique among existing orders.
///
/// The random suffix gives 10,000 slots per day; a handful of retries keeps
/// the collision probability negligible at this scale, and the unique index
/// on the column backstops the final insert regardless.
async fn generate_unique_order_number<C: ConnectionTrait>(
    conn: &C,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        let candidate = format_order_number(now, suffix);
        let taken = Order::find()
            .filter(order::Column::OrderNumber.eq(candidate.clone()))
            .one(conn)
            .await?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
    }
    error!("Exhausted order number attempts");
    Err(ServiceError::InternalError(
        "could not allocate a unique order number".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(format_order_number(at, 7), "ORD-20250309-0007");
        assert_eq!(format_order_number(at, 9999), "ORD-20250309-9999");
    }
}
