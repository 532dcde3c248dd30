pub mod carts;
pub mod coupons;
pub mod notifications;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod products;

pub use carts::CartService;
pub use coupons::CouponService;
pub use notifications::{LogNotificationSender, NotificationSender};
pub use order_status::OrderStatusService;
pub use orders::OrderService;
pub use products::ProductService;
