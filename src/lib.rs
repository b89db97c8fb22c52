// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Rastro: a denormalized auction marketplace backend
//!
//! Users, products and bids are stored as documents that embed copies of
//! each other. This crate owns the write protocol that keeps those copies
//! consistent, plus the validators, list queries and rating aggregation
//! built on top of it.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::{MarketEngine, TokenVerifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: MarketEngine,
    pub verifier: Arc<dyn TokenVerifier>,
}
