pub mod carts;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod products;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    CartService, CouponService, LogNotificationSender, NotificationSender, OrderService,
    OrderStatusService, ProductService,
};

/// All domain services, wired once at startup and shared via [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub products: ProductService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub order_status: OrderStatusService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let notifier: Arc<dyn NotificationSender> = Arc::new(LogNotificationSender);
        Self::with_notifier(db, event_sender, config, notifier)
    }

    pub fn with_notifier(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        let products = ProductService::new(Arc::clone(&db), Arc::clone(&event_sender));
        let carts = CartService::new(
            Arc::clone(&db),
            Arc::clone(&event_sender),
            Arc::clone(&config),
        );
        let coupons = CouponService::new(Arc::clone(&db), Arc::clone(&event_sender));
        let orders = OrderService::new(
            Arc::clone(&db),
            Arc::clone(&event_sender),
            Arc::clone(&config),
            carts.clone(),
            coupons.clone(),
            notifier,
        );
        let order_status = OrderStatusService::new(Arc::clone(&db), Arc::clone(&event_sender));

        Self {
            products,
            carts,
            coupons,
            orders,
            order_status,
        }
    }
}
