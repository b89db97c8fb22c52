// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod bids;
pub mod chats;
pub mod engine;
pub mod identity;
pub mod outcome;
pub mod products;
pub(crate) mod propagation;
pub mod query;
pub mod ratings;
pub mod reconcile;
pub mod users;
pub mod validation;

pub use engine::{Clock, MarketEngine};
pub use identity::{IdentityError, JwtVerifier, RemoteVerifier, TokenVerifier};
pub use outcome::{MirrorFailure, Outcome, RepairTarget};
pub use products::BidderProducts;
pub use query::{BidQuery, Page, ProductQuery, ProductSort};
pub use reconcile::{Reconciler, RepairError, RepairLog, SweepReport};
