// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat threads between a listing owner and an interested user.

use super::refs::{IdRef, ProductRef, UserBrief};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Chat {
    pub id: String,
    /// Owner of the product.
    pub vendor: UserBrief,
    pub interested: UserBrief,
    pub product: ProductRef,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.vendor.id == user_id || self.interested.id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Message {
    pub id: String,
    pub chat: IdRef,
    pub timestamp: DateTime<Utc>,
    pub origin: UserBrief,
    pub text: String,
}
