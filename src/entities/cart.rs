use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cart entity. One cart per customer; the monetary columns cache the most
/// recently computed totals for display and are recomputed on every read.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub customer_id: Uuid,
    pub currency: String,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub coupon_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub shipping_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
