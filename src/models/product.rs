// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Product listings and their embedded bid entries.

use super::refs::{ProductRef, UserBrief, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A listing. Source of truth for its `bids` ordering and for `buyer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub initial_price: f64,
    pub initial_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
    #[serde(default)]
    pub weight: f64,
    pub owner: UserRef,
    #[serde(default)]
    pub buyer: Option<UserRef>,
    /// Append-only, in submission order.
    #[serde(default)]
    pub bids: Vec<ProductBid>,
    /// Amount a new bid has to beat.
    pub current_price: f64,
}

impl Product {
    /// The highest bid; on equal amounts the later one wins.
    pub fn highest_bid(&self) -> Option<&ProductBid> {
        self.bids.iter().fold(None, |best, bid| match best {
            Some(b) if b.amount > bid.amount => Some(b),
            _ => Some(bid),
        })
    }

    pub fn highest_bidder(&self) -> Option<&UserBrief> {
        self.highest_bid().map(|bid| &bid.bidder)
    }

    /// Highest bid amount, or the initial price before any bid.
    pub fn price_floor(&self) -> f64 {
        self.highest_bid()
            .map_or(self.initial_price, |bid| bid.amount)
    }

    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        now > self.close_date
    }

    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            close_date: self.close_date,
            buyer: self.buyer.as_ref().map(UserRef::brief),
        }
    }

    pub fn product_ref(&self) -> ProductRef {
        ProductRef {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// Bid entry embedded in `Product.bids[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProductBid {
    pub id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub bidder: UserBrief,
}

/// Listing entry embedded in the owner's `User.products[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProductSummary {
    pub id: String,
    pub title: String,
    pub close_date: DateTime<Utc>,
    #[serde(default)]
    pub buyer: Option<UserBrief>,
}

/// Attributes supplied when listing a product.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub initial_price: f64,
    pub close_date: DateTime<Utc>,
    pub weight: f64,
}

/// Owner-editable fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub initial_price: Option<f64>,
    pub weight: Option<f64>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.initial_price.is_none()
            && self.weight.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::refs::Location;
    use chrono::TimeZone;

    fn bid(id: &str, amount: f64, bidder: &str) -> ProductBid {
        ProductBid {
            id: id.to_string(),
            amount,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            bidder: UserBrief {
                id: bidder.to_string(),
                username: bidder.to_string(),
            },
        }
    }

    fn listing(bids: Vec<ProductBid>) -> Product {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: "p1".to_string(),
            title: "Lamp".to_string(),
            description: String::new(),
            initial_price: 100.0,
            initial_date: now,
            close_date: now + chrono::Duration::days(10),
            weight: 1.0,
            owner: UserRef {
                id: "owner".to_string(),
                username: "owner".to_string(),
                location: Location::default(),
            },
            buyer: None,
            bids,
            current_price: 100.0,
        }
    }

    #[test]
    fn test_price_floor_without_bids_is_initial_price() {
        let product = listing(vec![]);
        assert_eq!(product.price_floor(), 100.0);
        assert!(product.highest_bidder().is_none());
    }

    #[test]
    fn test_highest_bid_prefers_later_on_tie() {
        let product = listing(vec![bid("a", 150.0, "x"), bid("b", 200.0, "y"), bid("c", 200.0, "z")]);
        assert_eq!(product.highest_bid().unwrap().id, "c");
        assert_eq!(product.price_floor(), 200.0);
        assert_eq!(product.highest_bidder().unwrap().id, "z");
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(ProductPatch::default().is_empty());
        let patch = ProductPatch {
            weight: Some(2.0),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
