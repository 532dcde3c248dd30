use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Coupon entity. Codes are stored upper-cased and matched exactly.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_purchase: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub max_discount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Discount type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Where a coupon sits relative to its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponState {
    Scheduled,
    Active,
    Expired,
}

impl Model {
    pub fn state(&self, now: DateTime<Utc>) -> CouponState {
        if now < self.starts_at {
            CouponState::Scheduled
        } else if now > self.ends_at {
            CouponState::Expired
        } else {
            CouponState::Active
        }
    }

    pub fn is_usage_exhausted(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.used_count >= limit,
            None => false,
        }
    }

    /// A coupon is redeemable when the active flag is set, `now` falls inside
    /// the validity window, and the usage limit has headroom.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.state(now) == CouponState::Active && !self.is_usage_exhausted()
    }

    /// Computes the discount this coupon grants against `total`.
    ///
    /// The minimum-purchase check runs first, so a short total reports
    /// `BelowMinimumPurchase` even when the coupon is also unredeemable.
    /// Percentage coupons take `discount_value` percent of the total, capped
    /// by `max_discount` when one is set; fixed coupons take `discount_value`
    /// outright. The result is always clamped into `[0, total]`.
    pub fn calculate_discount(
        &self,
        total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        if total < self.min_purchase {
            return Err(ServiceError::BelowMinimumPurchase(format!(
                "coupon {} requires a minimum purchase of {}",
                self.code, self.min_purchase
            )));
        }
        if !self.is_redeemable(now) {
            return Err(ServiceError::CouponNotValid(self.code.clone()));
        }

        let discount = match self.discount_type {
            DiscountType::Percentage => {
                let raw = total * self.discount_value / Decimal::from(100);
                match self.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            DiscountType::Fixed => self.discount_value,
        };

        Ok(discount.max(Decimal::ZERO).min(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(discount_type: DiscountType, value: Decimal) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            discount_type,
            discount_value: value,
            min_purchase: Decimal::ZERO,
            max_discount: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount() {
        let c = coupon(DiscountType::Percentage, dec!(10));
        let discount = c.calculate_discount(dec!(200.00), Utc::now()).unwrap();
        assert_eq!(discount, dec!(20.00));
    }

    #[test]
    fn fixed_discount_clamped_to_total() {
        let c = coupon(DiscountType::Fixed, dec!(50.00));
        let discount = c.calculate_discount(dec!(30.00), Utc::now()).unwrap();
        assert_eq!(discount, dec!(30.00), "fixed discount never exceeds the total");
    }

    #[test]
    fn max_discount_caps_percentage() {
        let mut c = coupon(DiscountType::Percentage, dec!(50));
        c.max_discount = Some(dec!(25.00));
        let discount = c.calculate_discount(dec!(200.00), Utc::now()).unwrap();
        assert_eq!(discount, dec!(25.00));
    }

    #[test]
    fn min_purchase_enforced() {
        let mut c = coupon(DiscountType::Fixed, dec!(5.00));
        c.min_purchase = dec!(100.00);
        let err = c.calculate_discount(dec!(99.99), Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::BelowMinimumPurchase(_)));

        // Exactly at the minimum qualifies.
        assert!(c.calculate_discount(dec!(100.00), Utc::now()).is_ok());
    }

    #[test]
    fn scheduled_and_expired_coupons_rejected() {
        let now = Utc::now();

        let mut c = coupon(DiscountType::Fixed, dec!(5.00));
        c.starts_at = now + Duration::days(1);
        c.ends_at = now + Duration::days(2);
        assert_eq!(c.state(now), CouponState::Scheduled);
        assert!(c.calculate_discount(dec!(100.00), now).is_err());

        c.starts_at = now - Duration::days(2);
        c.ends_at = now - Duration::days(1);
        assert_eq!(c.state(now), CouponState::Expired);
        assert!(c.calculate_discount(dec!(100.00), now).is_err());
    }

    #[test]
    fn short_total_reported_before_validity() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, dec!(5.00));
        c.min_purchase = dec!(100.00);
        c.starts_at = now - Duration::days(2);
        c.ends_at = now - Duration::days(1);

        // Expired and under the minimum: the minimum wins.
        let err = c.calculate_discount(dec!(50.00), now).unwrap_err();
        assert!(matches!(err, ServiceError::BelowMinimumPurchase(_)));

        // At the minimum the expiry is what remains.
        let err = c.calculate_discount(dec!(100.00), now).unwrap_err();
        assert!(matches!(err, ServiceError::CouponNotValid(_)));
    }

    #[test]
    fn usage_limit_exhaustion() {
        let mut c = coupon(DiscountType::Fixed, dec!(5.00));
        c.usage_limit = Some(3);
        c.used_count = 2;
        assert!(!c.is_usage_exhausted());

        c.used_count = 3;
        assert!(c.is_usage_exhausted());
        assert!(matches!(
            c.calculate_discount(dec!(100.00), Utc::now()),
            Err(ServiceError::CouponNotValid(_))
        ));
    }

    #[test]
    fn inactive_coupon_rejected() {
        let mut c = coupon(DiscountType::Fixed, dec!(5.00));
        c.is_active = false;
        assert!(c.calculate_discount(dec!(100.00), Utc::now()).is_err());
    }
}
