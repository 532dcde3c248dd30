use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    VariantCreated { product_id: Uuid, variant_id: Uuid },

    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),
    CouponApplied { cart_id: Uuid, code: String },
    CouponRemoved { cart_id: Uuid },

    // Coupon events
    CouponCreated(Uuid),
    CouponDeactivated(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderDelivered(Uuid),
    PaymentStatusChanged { order_id: Uuid, status: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging (rather than propagating) any failure.
    /// Event publication is best-effort and never fails the calling operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Dropped event: {}", err);
        }
    }
}

/// Processes incoming events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, from = %old_status, to = %new_status, "Order status changed");
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "Order cancelled");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
