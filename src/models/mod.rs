// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod bid;
pub mod chat;
pub mod product;
pub mod rating;
pub mod refs;
pub mod user;

pub use bid::{Bid, UserBid};
pub use chat::{Chat, Message};
pub use product::{NewProduct, Product, ProductBid, ProductPatch, ProductSummary};
pub use rating::Rating;
pub use refs::{IdRef, Location, ProductRef, UserBrief, UserRef};
pub use user::{NewUser, User, UserPatch};
