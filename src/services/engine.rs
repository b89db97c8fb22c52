// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The marketplace consistency engine.
//!
//! `MarketEngine` mediates every write to users, products and bids. The
//! operations live next to their resource (`bids.rs`, `products.rs`, ...);
//! this module holds the shared state and helpers.

use crate::config::MarketPolicy;
use crate::db::{fetch, is_valid_id, DocumentStore};
use crate::error::{MarketError, MarketResult};
use crate::services::reconcile::{Reconciler, RepairLog};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;

/// Source of "now" for validators.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct MarketEngine {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) policy: MarketPolicy,
    pub(crate) repairs: RepairLog,
    admins: Arc<HashSet<String>>,
    clock: Clock,
}

impl MarketEngine {
    pub fn new(store: Arc<dyn DocumentStore>, policy: MarketPolicy, admins: Vec<String>) -> Self {
        Self {
            store,
            policy,
            repairs: RepairLog::default(),
            admins: Arc::new(admins.into_iter().collect()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to move past a listing's close date.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn policy(&self) -> &MarketPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Entities with mirror writes still pending repair.
    pub fn repairs(&self) -> &RepairLog {
        &self.repairs
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.store.clone(), self.repairs.clone(), self.clock.clone())
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }

    pub(crate) fn require_admin(&self, actor: &str) -> MarketResult<()> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(
                "administrator privileges required".to_string(),
            ))
        }
    }

    /// Load a document that must exist.
    pub(crate) async fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        entity: &'static str,
        id: &str,
    ) -> MarketResult<T> {
        check_id(id)?;
        fetch(self.store.as_ref(), collection, id)
            .await?
            .ok_or_else(|| MarketError::not_found(entity, id))
    }
}

/// Reject malformed identifiers before touching the store.
pub fn check_id(id: &str) -> MarketResult<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(MarketError::InvalidReference(id.to_string()))
    }
}
