//! Coupon eligibility checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::CartLine;
use crate::offer::{Offer, OfferScope, OfferTerms};

/// Why a coupon code was rejected for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferRejection {
    /// No offer exists with the given code.
    #[error("coupon code not found")]
    NotFound,

    /// The current time is outside the offer's validity window.
    #[error("coupon has expired or is not yet active")]
    Expired,

    /// The offer's redemption limit has been reached.
    #[error("coupon usage limit reached")]
    UsageExceeded,

    /// The cart subtotal is below the offer's minimum order amount.
    #[error("cart is below the coupon's minimum order amount")]
    MinAmountNotMet,

    /// The offer targets products/categories not present in the cart.
    #[error("coupon does not apply to any item in the cart")]
    ScopeMismatch,
}

/// Re-checks every eligibility predicate for an offer against a cart.
///
/// Side-effect free: the usage counter is only incremented at payment
/// confirmation, through the store's guarded increment.
pub fn check(
    offer: &Offer,
    lines: &[CartLine],
    now: DateTime<Utc>,
) -> Result<OfferTerms, OfferRejection> {
    if offer.valid_from.is_some_and(|from| now < from)
        || offer.valid_until.is_some_and(|until| now > until)
    {
        return Err(OfferRejection::Expired);
    }

    if offer.usage_exhausted() {
        return Err(OfferRejection::UsageExceeded);
    }

    if !scope_matches(&offer.scope, lines) {
        return Err(OfferRejection::ScopeMismatch);
    }

    let subtotal: common::Money = lines.iter().map(CartLine::line_total).sum();
    if subtotal < offer.terms.min_amount {
        return Err(OfferRejection::MinAmountNotMet);
    }

    Ok(offer.terms.clone())
}

/// Returns the offers currently applicable to a cart. Read-only.
pub fn find_applicable<'a>(
    offers: &'a [Offer],
    lines: &[CartLine],
    now: DateTime<Utc>,
) -> Vec<&'a Offer> {
    offers
        .iter()
        .filter(|offer| check(offer, lines, now).is_ok())
        .collect()
}

fn scope_matches(scope: &OfferScope, lines: &[CartLine]) -> bool {
    match scope {
        OfferScope::All => true,
        OfferScope::Categories { ids } => lines
            .iter()
            .any(|line| line.category_id.as_ref().is_some_and(|c| ids.contains(c))),
        OfferScope::Products { ids } => lines.iter().any(|line| ids.contains(&line.product_id)),
    }
}
