use async_trait::async_trait;
use tracing::info;

use crate::entities::order;
use crate::errors::ServiceError;

/// Outbound notification channel for order events. The order assembler calls
/// this fire-and-forget after commit; a failure here never affects the order.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn order_confirmation(&self, order: &order::Model) -> Result<(), ServiceError>;
}

/// Default sender that writes notifications to the log. Swapped out for a
/// real mail or webhook sender in deployment.
#[derive(Debug, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn order_confirmation(&self, order: &order::Model) -> Result<(), ServiceError> {
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            total = %order.total_price,
            "Order confirmation notification"
        );
        Ok(())
    }
}
