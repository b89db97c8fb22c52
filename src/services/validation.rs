// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entity validators.
//!
//! Pure predicates over a proposed mutation and the persisted state. The
//! caller supplies `now`.

use crate::config::MarketPolicy;
use crate::error::{BidError, ProductError, RatingError};
use crate::models::Product;
use chrono::{DateTime, Duration, Utc};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

pub fn validate_bid_submission(
    product: &Product,
    bidder_id: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<(), BidError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(BidError::InvalidAmount);
    }
    if bidder_id == product.owner.id {
        return Err(BidError::OwnerCannotBid);
    }
    if now > product.close_date {
        return Err(BidError::PastCloseDate);
    }
    let floor = product.price_floor();
    if amount <= floor {
        return Err(BidError::AmountTooLow { amount, floor });
    }
    Ok(())
}

pub fn validate_product_creation(
    close_date: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &MarketPolicy,
) -> Result<(), ProductError> {
    if close_date < now {
        return Err(ProductError::CloseDateInPast);
    }
    // A window too large to represent can never be met.
    let earliest = Duration::try_days(policy.min_listing_days)
        .and_then(|window| now.checked_add_signed(window));
    match earliest {
        Some(earliest) if close_date >= earliest => Ok(()),
        _ => Err(ProductError::CloseDateTooSoon {
            min_days: policy.min_listing_days,
        }),
    }
}

/// Prices and weights must be finite and non-negative.
pub fn validate_price(value: f64) -> Result<(), ProductError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ProductError::InvalidPrice)
    }
}

pub fn validate_product_resolution(
    product: &Product,
    buyer_id: &str,
    now: DateTime<Utc>,
) -> Result<(), ProductError> {
    if now < product.close_date {
        return Err(ProductError::NotClosedYet);
    }
    match product.highest_bidder() {
        Some(bidder) if bidder.id == buyer_id => Ok(()),
        _ => Err(ProductError::BuyerMismatch),
    }
}

pub fn validate_rating(value: f64) -> Result<(), RatingError> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(())
    } else {
        Err(RatingError::ValueOutOfRange)
    }
}
