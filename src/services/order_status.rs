use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    order, order_item, order_status_history, Order, OrderItem, OrderStatusHistory, Product,
    ProductVariant,
};
use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{product, product_variant};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Returns whether a fulfillment transition is allowed.
///
/// The forward path is strictly linear; cancellation branches off the two
/// pre-fulfillment states only. Delivered and cancelled are terminal.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, Processing)
            | (Confirmed, Cancelled)
            | (Processing, Shipped)
            | (Shipped, Delivered)
    )
}

/// Service for order lifecycle management
#[derive(Debug, Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Advances an order along the forward path. Cancellation is not
    /// accepted here; it has its own operation with stock restoration.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        if new_status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "use the cancel operation to cancel an order".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !is_valid_transition(old_status, new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot move order from {} to {}",
                old_status, new_status
            )));
        }

        let now = Utc::now();
        let mut model: order::ActiveModel = order.into();
        model.status = Set(new_status);
        if new_status == OrderStatus::Delivered {
            model.delivered_at = Set(Some(now));
        }
        model.updated_at = Set(now);
        let updated = model.update(&txn).await?;

        append_history(&txn, order_id, new_status.as_str(), note).await?;
        txn.commit().await?;

        info!(order_id = %order_id, from = %old_status, to = %new_status, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        if new_status == OrderStatus::Delivered {
            self.event_sender
                .send_or_log(Event::OrderDelivered(order_id))
                .await;
        }
        Ok(updated)
    }

    /// Cancels an order, returning every line's quantity to stock.
    ///
    /// Only pending and confirmed orders can be cancelled; once fulfillment
    /// has started the stock has physically left the shelf.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !is_valid_transition(old_status, OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot cancel order in status {}",
                old_status
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in &items {
            restore_stock(&txn, item).await?;
        }

        let now = Utc::now();
        let mut model: order::ActiveModel = order.into();
        model.status = Set(OrderStatus::Cancelled);
        model.cancelled_at = Set(Some(now));
        model.cancellation_reason = Set(reason.clone());
        model.updated_at = Set(now);
        let updated = model.update(&txn).await?;

        append_history(&txn, order_id, OrderStatus::Cancelled.as_str(), reason).await?;
        txn.commit().await?;

        info!(order_id = %order_id, from = %old_status, "Order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        Ok(updated)
    }

    /// Refunds a paid order on the payment axis. Fulfillment status is
    /// untouched.
    ///
    /// With no amount (or the full total) the order becomes refunded; an
    /// amount below the total records a partial refund, and further partial
    /// refunds may follow until a full one closes the order out.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status != PaymentStatus::Paid
            && order.payment_status != PaymentStatus::PartiallyRefunded
        {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot refund an order with payment status {}",
                order.payment_status
            )));
        }

        let new_status = match amount {
            None => PaymentStatus::Refunded,
            Some(amount) if amount <= Decimal::ZERO => {
                return Err(ServiceError::ValidationError(
                    "refund amount must be positive".to_string(),
                ));
            }
            Some(amount) if amount > order.total_price => {
                return Err(ServiceError::ValidationError(format!(
                    "refund amount {} exceeds the order total {}",
                    amount, order.total_price
                )));
            }
            Some(amount) if amount == order.total_price => PaymentStatus::Refunded,
            Some(_) => PaymentStatus::PartiallyRefunded,
        };

        let mut model: order::ActiveModel = order.into();
        model.payment_status = Set(new_status);
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.db.as_ref()).await?;

        info!(order_id = %order_id, status = %new_status, "Refund recorded");
        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                status: new_status.to_string(),
            })
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        if history.is_empty() {
            // Distinguish "no such order" from "no history yet".
            Order::find_by_id(order_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        }
        Ok(history)
    }
}

/// Appends one row to the status audit trail.
pub(crate) async fn append_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: &str,
    note: Option<String>,
) -> Result<(), ServiceError> {
    let model = order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status.to_string()),
        note: Set(note),
        created_at: Set(Utc::now()),
    };
    model.insert(conn).await?;
    Ok(())
}

/// Returns an order line's quantity to the catalog. Cancellation restores
/// unconditionally; stock only grows here, so no guard is needed.
async fn restore_stock<C: ConnectionTrait>(
    conn: &C,
    item: &order_item::Model,
) -> Result<(), ServiceError> {
    if let Some(sku) = &item.variant_sku {
        ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(item.quantity),
            )
            .col_expr(
                product_variant::Column::SoldCount,
                Expr::col(product_variant::Column::SoldCount).sub(item.quantity),
            )
            .filter(product_variant::Column::Sku.eq(sku.clone()))
            .exec(conn)
            .await?;
    }
    Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(item.quantity),
        )
        .col_expr(
            product::Column::SoldCount,
            Expr::col(product::Column::SoldCount).sub(item.quantity),
        )
        .filter(product::Column::Id.eq(item.product_id))
        .exec(conn)
        .await?;
    Ok(())
}
