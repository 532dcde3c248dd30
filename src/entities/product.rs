use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product entity for the catalog system.
///
/// `stock` holds the aggregate stock: the sum of variant stocks when variants
/// exist, a plain counter otherwise. `sold_count` accumulates units sold
/// across all variants.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub status: ProductStatus,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub sale_price: Option<Decimal>,
    pub is_on_sale: bool,
    #[sea_orm(nullable)]
    pub sale_starts_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub sale_ends_at: Option<DateTime<Utc>>,
    pub stock: i32,
    pub sold_count: i32,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_variant::Entity")]
    ProductVariants,
}

impl Related<super::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductVariants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Product status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl Model {
    /// Whether the sale price applies right now. A missing window bound is
    /// treated as open-ended on that side.
    pub fn sale_active(&self, now: DateTime<Utc>) -> bool {
        if !self.is_on_sale || self.sale_price.is_none() {
            return false;
        }
        if let Some(start) = self.sale_starts_at {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.sale_ends_at {
            if now > end {
                return false;
            }
        }
        true
    }

    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn base_product() -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            name: "Widget".to_string(),
            slug: "widget".to_string(),
            description: "A widget".to_string(),
            status: ProductStatus::Active,
            price: dec!(100.00),
            sale_price: None,
            is_on_sale: false,
            sale_starts_at: None,
            sale_ends_at: None,
            stock: 5,
            sold_count: 0,
            image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sale_inactive_without_flag_or_price() {
        let now = Utc::now();
        let mut product = base_product();
        assert!(!product.sale_active(now));

        product.is_on_sale = true;
        assert!(!product.sale_active(now), "no sale price set");

        product.sale_price = Some(dec!(80.00));
        assert!(product.sale_active(now), "open-ended window counts as active");
    }

    #[test]
    fn sale_window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut product = base_product();
        product.is_on_sale = true;
        product.sale_price = Some(dec!(80.00));
        product.sale_starts_at = Some(now - Duration::days(1));
        product.sale_ends_at = Some(now + Duration::days(1));
        assert!(product.sale_active(now));

        product.sale_starts_at = Some(now + Duration::hours(1));
        assert!(!product.sale_active(now), "sale not started yet");

        product.sale_starts_at = Some(now - Duration::days(2));
        product.sale_ends_at = Some(now - Duration::days(1));
        assert!(!product.sale_active(now), "sale already over");
    }
}
