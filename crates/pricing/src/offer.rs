//! Offer/coupon descriptors.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// How an offer's discount is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferKind {
    /// Percentage of the cart subtotal.
    Percentage { percent: u32 },
    /// Fixed amount off the cart subtotal.
    Fixed { amount: Money },
}

/// Which products an offer targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferScope {
    /// Applies to any cart.
    #[default]
    All,
    /// Applies when the cart contains an item from one of these categories.
    Categories { ids: HashSet<String> },
    /// Applies when the cart contains one of these products.
    Products { ids: HashSet<ProductId> },
}

/// The subset of an offer the pricing engine needs.
///
/// Produced by a successful eligibility check so placed orders never depend on
/// the mutable parts of the offer (usage counter, validity window) again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub kind: OfferKind,
    /// Minimum cart subtotal for the discount to apply.
    pub min_amount: Money,
    /// Upper bound on the computed discount, if any.
    pub max_discount: Option<Money>,
}

/// A promotional rule. Read-mostly; only `usage_count` mutates after creation,
/// and only through the store's guarded increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub code: String,
    #[serde(flatten)]
    pub terms: OfferTerms,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    #[serde(flatten)]
    pub scope: OfferScope,
}

impl Offer {
    /// Creates an always-valid, unscoped offer with the given terms.
    pub fn new(code: impl Into<String>, kind: OfferKind) -> Self {
        Self {
            code: code.into(),
            terms: OfferTerms {
                kind,
                min_amount: Money::zero(),
                max_discount: None,
            },
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            usage_count: 0,
            scope: OfferScope::All,
        }
    }

    /// Sets the minimum cart subtotal.
    pub fn with_min_amount(mut self, min: Money) -> Self {
        self.terms.min_amount = min;
        self
    }

    /// Sets the discount cap.
    pub fn with_max_discount(mut self, cap: Money) -> Self {
        self.terms.max_discount = Some(cap);
        self
    }

    /// Sets the validity window.
    pub fn with_window(
        mut self,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Sets the redemption limit.
    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    /// Restricts the offer to a scope.
    pub fn with_scope(mut self, scope: OfferScope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns true if the redemption limit has been reached.
    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }
}
