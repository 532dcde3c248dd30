use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line item. This is a point-in-time snapshot of the product as
/// purchased; it carries its own copy of the name, image, and prices rather
/// than foreign-keyed lookups into the mutable catalog.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    #[sea_orm(nullable)]
    pub variant_sku: Option<String>,
    #[sea_orm(nullable)]
    pub variant_name: Option<String>,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub line_total: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
