use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::{cart, cart_item, coupon, product, product_variant, Cart, CartItem, Coupon, Product, ProductVariant};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing::{self, CartTotals, PricedLine};

/// Service for cart management.
///
/// Carts never trust their stored prices: every read re-resolves each line
/// against the live catalog, so sale windows opening or closing and stock
/// changes are always reflected without any background job.
#[derive(Debug, Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub variant_sku: Option<String>,
    pub quantity: i32,
}

/// A cart line as presented to clients, after repricing.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_sku: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub in_stock: bool,
    pub available_stock: i32,
}

/// The full cart response: repriced lines plus freshly computed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub currency: String,
    pub items: Vec<CartItemView>,
    pub coupon_code: Option<String>,
    pub totals: CartTotals,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Fetches the customer's cart, creating an empty one on first touch.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(self.db.as_ref())
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set(self.config.currency.clone()),
            coupon_code: Set(None),
            coupon_discount: Set(Decimal::ZERO),
            subtotal: Set(Decimal::ZERO),
            tax_total: Set(Decimal::ZERO),
            shipping_total: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let saved = model.insert(self.db.as_ref()).await?;
        info!(cart_id = %saved.id, customer_id = %customer_id, "Created cart");
        self.event_sender
            .send_or_log(Event::CartCreated(saved.id))
            .await;
        Ok(saved)
    }

    /// Returns the repriced cart. This is the only read path; stored prices
    /// are refreshed as a side effect so the cached columns stay honest.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let txn = self.db.begin().await?;
        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;
        Ok(view)
    }

    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        if input.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(customer_id).await?;

        let product = Product::find_by_id(input.product_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_purchasable() {
            return Err(ServiceError::InvalidOperation(format!(
                "product '{}' is not available for purchase",
                product.name
            )));
        }
        if let Some(sku) = &input.variant_sku {
            let variant = ProductVariant::find()
                .filter(product_variant::Column::Sku.eq(sku.clone()))
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::VariantNotFound(sku.clone()))?;
            if variant.product_id != product.id {
                return Err(ServiceError::VariantNotFound(format!(
                    "variant '{}' does not belong to product {}",
                    sku, product.id
                )));
            }
        }

        let txn = self.db.begin().await?;

        // Merge with an existing line for the same product and variant.
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(match &input.variant_sku {
                Some(sku) => cart_item::Column::VariantSku.eq(sku.clone()),
                None => cart_item::Column::VariantSku.is_null(),
            })
            .one(&txn)
            .await?;

        let now = Utc::now();
        match existing {
            Some(item) => {
                let quantity = item.quantity.saturating_add(input.quantity);
                let mut model: cart_item::ActiveModel = item.into();
                model.quantity = Set(quantity);
                model.updated_at = Set(now);
                model.update(&txn).await?;
            }
            None => {
                let model = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    variant_sku: Set(input.variant_sku.clone()),
                    quantity: Set(input.quantity),
                    unit_price: Set(Decimal::ZERO),
                    line_total: Set(Decimal::ZERO),
                    in_stock: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                model.insert(&txn).await?;
            }
        }

        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: view.id,
                product_id: input.product_id,
            })
            .await;
        Ok(view)
    }

    /// Sets a line's quantity. A quantity of zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity <= 0 {
            item.delete(&txn).await?;
            let view = self.reprice_cart(&txn, cart).await?;
            txn.commit().await?;
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: view.id,
                    item_id,
                })
                .await;
            return Ok(view);
        }

        let mut model: cart_item::ActiveModel = item.into();
        model.quantity = Set(quantity);
        model.updated_at = Set(Utc::now());
        model.update(&txn).await?;

        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;
        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: view.id,
                item_id,
            })
            .await;
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.update_item_quantity(customer_id, item_id, 0).await
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let mut model: cart::ActiveModel = cart.clone().into();
        model.coupon_code = Set(None);
        model.coupon_discount = Set(Decimal::ZERO);
        let cart = model.update(&txn).await?;

        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;
        self.event_sender
            .send_or_log(Event::CartCleared(view.id))
            .await;
        Ok(view)
    }

    /// Applies a coupon code after a dry-run evaluation against the current
    /// subtotal. Nothing is consumed until checkout.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        customer_id: Uuid,
        code: &str,
    ) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let code = code.trim().to_uppercase();

        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::CouponNotValid(code.clone()))?;

        let txn = self.db.begin().await?;
        let view = self.reprice_cart(&txn, cart.clone()).await?;

        // Evaluate against the repriced, undiscounted item subtotal.
        coupon.calculate_discount(view.totals.subtotal, Utc::now())?;

        let mut model: cart::ActiveModel = Cart::find_by_id(cart.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart.id)))?
            .into();
        model.coupon_code = Set(Some(code.clone()));
        let cart = model.update(&txn).await?;

        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponApplied {
                cart_id: view.id,
                code,
            })
            .await;
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, customer_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(customer_id).await?;
        let txn = self.db.begin().await?;

        let mut model: cart::ActiveModel = cart.into();
        model.coupon_code = Set(None);
        model.coupon_discount = Set(Decimal::ZERO);
        let cart = model.update(&txn).await?;

        let view = self.reprice_cart(&txn, cart).await?;
        txn.commit().await?;
        self.event_sender
            .send_or_log(Event::CouponRemoved { cart_id: view.id })
            .await;
        Ok(view)
    }

    /// Reprices every line against the live catalog and recomputes totals.
    ///
    /// Lines whose product or variant is gone, or whose product is no longer
    /// active, are flagged out of stock and contribute nothing to the
    /// subtotal; they are not removed without the customer acting. An applied
    /// coupon that no longer evaluates (expired, exhausted, subtotal under
    /// its minimum) contributes zero discount but stays on the cart.
    async fn reprice_cart(
        &self,
        txn: &DatabaseTransaction,
        cart: cart::Model,
    ) -> Result<CartView, ServiceError> {
        let now = Utc::now();
        let pricing_config = self.config.pricing();

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(txn)
            .await?;

        let mut views = Vec::with_capacity(items.len());
        let mut line_totals = Vec::with_capacity(items.len());

        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(txn)
                .await?
                .filter(|p| p.is_purchasable());

            let variant = match (&product, &item.variant_sku) {
                (Some(_), Some(sku)) => {
                    ProductVariant::find()
                        .filter(product_variant::Column::Sku.eq(sku.clone()))
                        .one(txn)
                        .await?
                }
                _ => None,
            };
            let variant_missing = item.variant_sku.is_some() && variant.is_none();

            let line: PricedLine = match (&product, variant_missing) {
                (Some(product), false) => {
                    pricing::price_line(product, variant.as_ref(), item.quantity, now)
                }
                // Unavailable line: keep it visible but worthless.
                _ => PricedLine {
                    unit_price: item.unit_price,
                    requested_quantity: item.quantity,
                    quantity: 0,
                    available_stock: 0,
                    line_total: Decimal::ZERO,
                    in_stock: false,
                },
            };

            let item_id = item.id;
            let product_id = item.product_id;
            let variant_sku = item.variant_sku.clone();
            let mut model: cart_item::ActiveModel = item.into();
            model.unit_price = Set(line.unit_price);
            model.line_total = Set(line.line_total);
            model.in_stock = Set(line.in_stock);
            model.updated_at = Set(now);
            model.update(txn).await?;

            line_totals.push(line.line_total);
            views.push(CartItemView {
                id: item_id,
                product_id,
                product_name: product
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "(unavailable)".to_string()),
                variant_sku,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total.round_dp(2),
                in_stock: line.in_stock,
                available_stock: line.available_stock,
            });
        }

        let subtotal: Decimal = line_totals.iter().copied().sum();

        let coupon_code = cart.coupon_code.clone();
        let mut discount = Decimal::ZERO;
        if let Some(code) = &coupon_code {
            let coupon = Coupon::find()
                .filter(coupon::Column::Code.eq(code.clone()))
                .one(txn)
                .await?;
            if let Some(Ok(value)) = coupon.map(|c| c.calculate_discount(subtotal, now)) {
                discount = value;
            }
        }

        let totals = pricing::summarize(&line_totals, discount, &pricing_config);

        let cart_id = cart.id;
        let customer_id = cart.customer_id;
        let currency = cart.currency.clone();
        let mut model: cart::ActiveModel = cart.into();
        model.coupon_discount = Set(totals.discount);
        model.subtotal = Set(totals.subtotal);
        model.tax_total = Set(totals.tax);
        model.shipping_total = Set(totals.shipping);
        model.total = Set(totals.total);
        model.updated_at = Set(now);
        model.update(txn).await?;

        Ok(CartView {
            id: cart_id,
            customer_id,
            currency,
            items: views,
            coupon_code,
            totals,
        })
    }
}
