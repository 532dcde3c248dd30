use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{coupon, Coupon};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Service for coupon administration and evaluation
#[derive(Debug, Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub discount_type: coupon::DiscountType,
    pub discount_value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<i32>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input.validate()?;

        if input.discount_value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "discount_value must be positive".to_string(),
            ));
        }
        if input.discount_type == coupon::DiscountType::Percentage
            && input.discount_value > Decimal::from(100)
        {
            return Err(ServiceError::ValidationError(
                "percentage discount cannot exceed 100".to_string(),
            ));
        }
        if input.ends_at <= input.starts_at {
            return Err(ServiceError::ValidationError(
                "ends_at must be after starts_at".to_string(),
            ));
        }
        if let Some(limit) = input.usage_limit {
            if limit <= 0 {
                return Err(ServiceError::ValidationError(
                    "usage_limit must be positive".to_string(),
                ));
            }
        }

        let code = input.code.trim().to_uppercase();
        let existing = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::DuplicateKey(format!(
                "coupon '{}' already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            min_purchase: Set(input.min_purchase.unwrap_or(Decimal::ZERO)),
            max_discount: Set(input.max_discount),
            starts_at: Set(input.starts_at),
            ends_at: Set(input.ends_at),
            usage_limit: Set(input.usage_limit),
            used_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let saved = model.insert(self.db.as_ref()).await?;
        info!(coupon_id = %saved.id, code = %saved.code, "Created coupon");
        self.event_sender
            .send_or_log(Event::CouponCreated(saved.id))
            .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let code = code.trim().to_uppercase();
        Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(self.db.as_ref())
            .await?
            .ok_or(ServiceError::CouponNotValid(code))
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((coupons, total))
    }

    #[instrument(skip(self))]
    pub async fn deactivate_coupon(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        let existing = self.get_by_code(code).await?;
        let id = existing.id;
        let mut model: coupon::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.db.as_ref()).await?;
        self.event_sender
            .send_or_log(Event::CouponDeactivated(id))
            .await;
        Ok(updated)
    }

    /// Dry-run evaluation: what discount would this code grant against
    /// `total` right now. Nothing is consumed.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, code: &str, total: Decimal) -> Result<Decimal, ServiceError> {
        let coupon = self.get_by_code(code).await?;
        coupon.calculate_discount(total, Utc::now())
    }

    /// Consumes one use of the coupon with a conditional increment, so two
    /// concurrent redemptions of the last remaining use cannot both succeed.
    /// Runs on the supplied connection so it can join an order transaction.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::CouponNotValid(
                "coupon usage limit reached".to_string(),
            ));
        }
        Ok(())
    }
}
