pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod product;
pub mod product_variant;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use coupon::Entity as Coupon;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use order_status_history::Entity as OrderStatusHistory;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
