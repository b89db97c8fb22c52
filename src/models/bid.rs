// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use super::product::ProductBid;
use super::refs::{ProductRef, UserBrief, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A bid document. Source of truth, mirrored into `Product.bids[]` and
/// the bidder's `User.bids[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Bid {
    pub id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub product: ProductRef,
    /// Owner of the product at submission time.
    pub owner: UserRef,
    pub bidder: UserBrief,
}

impl Bid {
    pub fn product_entry(&self) -> ProductBid {
        ProductBid {
            id: self.id.clone(),
            amount: self.amount,
            timestamp: self.timestamp,
            bidder: self.bidder.clone(),
        }
    }

    pub fn user_entry(&self) -> UserBid {
        UserBid {
            id: self.id.clone(),
            amount: self.amount,
            timestamp: self.timestamp,
            product: self.product.clone(),
        }
    }
}

/// Bid entry embedded in the bidder's `User.bids[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserBid {
    pub id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub product: ProductRef,
}
