use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{product, product_variant};

/// Pricing settings shared by the cart aggregator and order assembler.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub currency: String,
    /// Tax rate as a fraction (0.08 = 8%), applied to the item subtotal.
    pub tax_rate: Decimal,
    /// Subtotals at or above this ship free.
    pub free_shipping_threshold: Decimal,
    /// Flat fee charged below the free-shipping threshold.
    pub flat_shipping_fee: Decimal,
}

/// One priced line: the effective unit price and the quantity actually
/// sellable after clamping against available stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLine {
    pub unit_price: Decimal,
    /// Quantity the caller asked for.
    pub requested_quantity: i32,
    /// Quantity after clamping into `[0, available_stock]`.
    pub quantity: i32,
    pub available_stock: i32,
    /// Full-precision `unit_price * quantity`; rounded only at summary level.
    pub line_total: Decimal,
    /// False when the clamp reduced the requested quantity.
    pub in_stock: bool,
}

/// Resolves the effective unit price. An active sale wins outright, even
/// over a selected variant's own price; otherwise the variant price applies
/// when one is selected, else the base price.
pub fn unit_price(
    product: &product::Model,
    variant: Option<&product_variant::Model>,
    now: DateTime<Utc>,
) -> Decimal {
    if product.sale_active(now) {
        if let Some(sale_price) = product.sale_price {
            return sale_price;
        }
    }
    match variant {
        Some(v) => v.price,
        None => product.price,
    }
}

/// Stock available for purchase: the variant's own stock when a variant is
/// selected, the product's aggregate stock otherwise.
pub fn available_stock(
    product: &product::Model,
    variant: Option<&product_variant::Model>,
) -> i32 {
    match variant {
        Some(v) => v.stock,
        None => product.stock,
    }
}

/// Prices a single requested line against the current catalog state.
/// The requested quantity is clamped rather than rejected so a cart can
/// always be displayed; order assembly applies the strict check separately.
pub fn price_line(
    product: &product::Model,
    variant: Option<&product_variant::Model>,
    requested_quantity: i32,
    now: DateTime<Utc>,
) -> PricedLine {
    let stock = available_stock(product, variant).max(0);
    let quantity = requested_quantity.clamp(0, stock);
    let price = unit_price(product, variant, now);

    PricedLine {
        unit_price: price,
        requested_quantity,
        quantity,
        available_stock: stock,
        line_total: price * Decimal::from(quantity),
        in_stock: quantity >= requested_quantity,
    }
}

/// Aggregated cart totals, all rounded to 2 decimal places.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Computes totals from full-precision line totals and an already-evaluated
/// coupon discount.
///
/// Shipping is zero for an empty cart, zero once the subtotal reaches the
/// free-shipping threshold, and the flat fee otherwise. Tax applies to the
/// undiscounted subtotal. Rounding to cents happens here, once, so repeated
/// recomputation from the same lines is stable.
pub fn summarize(
    line_totals: &[Decimal],
    discount: Decimal,
    config: &PricingConfig,
) -> CartTotals {
    let subtotal: Decimal = line_totals.iter().copied().sum();

    let shipping = if subtotal <= Decimal::ZERO {
        Decimal::ZERO
    } else if subtotal >= config.free_shipping_threshold {
        Decimal::ZERO
    } else {
        config.flat_shipping_fee
    };

    let tax = subtotal * config.tax_rate;
    let discount = discount.max(Decimal::ZERO).min(subtotal);

    let subtotal = subtotal.round_dp(2);
    let discount = discount.round_dp(2);
    let shipping = shipping.round_dp(2);
    let tax = tax.round_dp(2);
    let total = (subtotal - discount + shipping + tax).max(Decimal::ZERO);

    CartTotals {
        subtotal,
        discount,
        shipping,
        tax,
        total,
    }
}
