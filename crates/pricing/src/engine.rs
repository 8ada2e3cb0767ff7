//! Cart pricing and discount proration.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::offer::{OfferKind, OfferTerms};

/// A cart line as seen by the pricing engine: a price, a quantity, and the
/// identifiers needed for offer-scope checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub category_id: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
    /// Creates a cart line without a category.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            category_id: None,
            quantity,
            unit_price,
        }
    }

    /// Returns the line total (`unit_price * quantity`).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Per-line pricing result. `line_discount` is exact; `discount_per_unit` is
/// its per-unit share rounded to whole cents, which is the figure frozen onto
/// the order item and later used for refund math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line_total: Money,
    pub line_discount: Money,
    pub discount_per_unit: Money,
}

/// Cart-level pricing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedCart {
    pub subtotal: Money,
    pub discount_total: Money,
    pub final_total: Money,
    pub lines: Vec<PricedLine>,
}

/// Integer division rounding half away from zero; operands are non-negative.
fn div_round(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator / 2) / denominator
}

/// Prices a cart against an optional offer.
///
/// The discount is prorated across lines in proportion to each line's share of
/// the subtotal. Because proration rounds each line to whole cents, the line
/// discounts can drift from the cart-level discount by a few cents in total;
/// the residual is assigned to the last line so that
/// `sum(line_discount) == discount_total` holds exactly.
pub fn price_cart(lines: &[CartLine], offer: Option<&OfferTerms>) -> PricedCart {
    let subtotal: Money = lines.iter().map(CartLine::line_total).sum();

    let discount_total = offer
        .map(|terms| compute_discount(subtotal, terms))
        .unwrap_or_else(Money::zero);

    let mut priced: Vec<PricedLine> = Vec::with_capacity(lines.len());
    let mut allocated = Money::zero();

    for line in lines {
        let line_total = line.line_total();
        let line_discount = if subtotal.is_zero() || discount_total.is_zero() {
            Money::zero()
        } else {
            Money::from_cents(div_round(
                discount_total.cents() * line_total.cents(),
                subtotal.cents(),
            ))
        };
        allocated += line_discount;
        priced.push(PricedLine {
            line_total,
            line_discount,
            discount_per_unit: per_unit(line_discount, line.quantity),
        });
    }

    // Rounding residual lands on the last line so the cart-level total stays
    // exact and partial refunds settle against the same shares.
    if let Some(last) = priced.last_mut()
        && allocated != discount_total
    {
        last.line_discount += discount_total - allocated;
        let quantity = lines[lines.len() - 1].quantity;
        last.discount_per_unit = per_unit(last.line_discount, quantity);
    }

    PricedCart {
        subtotal,
        discount_total,
        final_total: subtotal - discount_total,
        lines: priced,
    }
}

fn compute_discount(subtotal: Money, terms: &OfferTerms) -> Money {
    if subtotal < terms.min_amount {
        return Money::zero();
    }

    let raw = match terms.kind {
        OfferKind::Percentage { percent } => Money::from_cents(div_round(
            subtotal.cents() * i64::from(percent),
            100,
        )),
        OfferKind::Fixed { amount } => amount,
    };

    let capped = match terms.max_discount {
        Some(cap) => raw.min(cap),
        None => raw,
    };

    // Discount never exceeds the subtotal and never goes negative.
    capped.min(subtotal).clamp_non_negative()
}

fn per_unit(line_discount: Money, quantity: u32) -> Money {
    if quantity == 0 {
        return Money::zero();
    }
    Money::from_cents(div_round(line_discount.cents(), i64::from(quantity)))
}
