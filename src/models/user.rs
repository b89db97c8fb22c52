// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use super::bid::UserBid;
use super::product::ProductSummary;
use super::rating::Rating;
use super::refs::{Location, UserBrief, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User profile. The embedded arrays are caches of Product/Bid state,
/// except `ratings`, which only lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub location: Location,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub products: Vec<ProductSummary>,
    #[serde(default)]
    pub bids: Vec<UserBid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Snapshot used as product owner/buyer.
    pub fn as_owner(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            username: self.username.clone(),
            location: self.location,
        }
    }

    pub fn brief(&self) -> UserBrief {
        UserBrief {
            id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub location: Location,
}

/// Identity fields that are mirrored elsewhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub location: Option<Location>,
}
