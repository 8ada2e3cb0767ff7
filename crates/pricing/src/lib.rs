//! Pure pricing layer: cart totals, discount proration, coupon eligibility.
//!
//! Nothing in this crate performs I/O. The engine takes a cart and an optional
//! offer and produces exact per-line discount shares; the validator decides
//! whether an offer applies to a cart at a point in time. Persistence of
//! offers (and the atomic usage-counter increment at confirmation) lives in
//! the `store` crate.

mod engine;
mod offer;
mod validator;

pub use engine::{CartLine, PricedCart, PricedLine, price_cart};
pub use offer::{Offer, OfferKind, OfferScope, OfferTerms};
pub use validator::{OfferRejection, check, find_applicable};
