// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-repair for denormalized mirrors.
//!
//! Mirrors are a materialized view of the source collections. When a mirror
//! write fails the engine records the affected entity in the [`RepairLog`];
//! [`Reconciler::sweep`] recomputes those mirrors from the sources of truth.
//!
//! A product rewrite only commits if the product still holds what the
//! repair read; otherwise the target goes back on the queue. Bid documents
//! younger than [`ORPHAN_GRACE_SECS`] may still have a claim in flight and
//! are left alone until a later sweep.

use crate::db::collections;
use crate::db::{
    encode, fetch, fetch_all, DocumentStore, Filter, FindOptions, SortKey, StoreError, Update,
};
use crate::models::{Bid, Product, User};
use crate::services::engine::Clock;
use crate::services::outcome::RepairTarget;
use crate::services::propagation::{identity_writes, title_writes};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use std::sync::Arc;

const MAX_CONCURRENT_REPAIRS: usize = 8;

/// Age below which an unclaimed bid document is treated as in flight.
pub const ORPHAN_GRACE_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("product {0} changed while its mirrors were rebuilt")]
    Contended(String),

    #[error("product {0} has bids younger than the grace window")]
    Pending(String),
}

/// Entities whose mirrors are known to be stale.
#[derive(Clone, Default)]
pub struct RepairLog {
    pending: Arc<DashMap<RepairTarget, DateTime<Utc>>>,
}

impl RepairLog {
    /// Queue a target. The first failure time is kept.
    pub fn record(&self, target: RepairTarget) {
        self.pending.entry(target).or_insert_with(Utc::now);
    }

    pub fn contains(&self, target: &RepairTarget) -> bool {
        self.pending.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every queued target, oldest first.
    pub fn drain(&self) -> Vec<RepairTarget> {
        let mut queued: Vec<(RepairTarget, DateTime<Utc>)> = self
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        queued.sort_by_key(|(_, at)| *at);
        for (target, _) in &queued {
            self.pending.remove(target);
        }
        queued.into_iter().map(|(target, _)| target).collect()
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub repaired: usize,
    pub requeued: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    repairs: RepairLog,
    clock: Clock,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>, repairs: RepairLog, clock: Clock) -> Self {
        Self {
            store,
            repairs,
            clock,
        }
    }

    /// Repair every queued target. Targets that fail again are re-queued.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let results: Vec<(RepairTarget, Result<(), RepairError>)> =
            stream::iter(self.repairs.drain())
                .map(|target| async move {
                    let result = self.repair(&target).await;
                    (target, result)
                })
                .buffered(MAX_CONCURRENT_REPAIRS)
                .collect()
                .await;
        for (target, result) in results {
            match result {
                Ok(()) => report.repaired += 1,
                Err(e @ RepairError::Store(_)) => {
                    tracing::warn!(target_entity = ?target, error = %e, "Repair failed; re-queued");
                    self.repairs.record(target);
                    report.requeued += 1;
                }
                Err(e) => {
                    tracing::debug!(target_entity = ?target, error = %e, "Repair deferred");
                    self.repairs.record(target);
                    report.requeued += 1;
                }
            }
        }
        if report.repaired + report.requeued > 0 {
            tracing::info!(
                repaired = report.repaired,
                requeued = report.requeued,
                "Reconciliation sweep finished"
            );
        }
        report
    }

    pub async fn repair(&self, target: &RepairTarget) -> Result<(), RepairError> {
        match target {
            RepairTarget::Product(id) => self.repair_product(id).await,
            RepairTarget::User(id) => Ok(self.repair_user(id).await?),
            RepairTarget::Bid(id) => self.repair_bid(id).await,
        }
    }

    /// Rebuild every mirror of a product from the product and bid documents.
    pub async fn repair_product(&self, product_id: &str) -> Result<(), RepairError> {
        let store = self.store.as_ref();
        let Some(mut product) = fetch::<Product>(store, collections::PRODUCTS, product_id).await?
        else {
            return Ok(self.purge_product(product_id).await?);
        };
        let read_price = product.current_price;
        let read_ids: Vec<String> = product.bids.iter().map(|entry| entry.id.clone()).collect();
        let grace_cutoff = (self.clock)() - Duration::seconds(ORPHAN_GRACE_SECS);

        let bids: Vec<Bid> = fetch_all(
            store,
            collections::BIDS,
            &Filter::eq("product.id", product_id),
            &FindOptions::sorted(vec![SortKey::asc("timestamp").as_instants()]),
        )
        .await?;

        // Entries already claimed on the product stay in claim order. Bid
        // documents that never landed there are appended while they still
        // beat the floor; the rest lost a race and were never acknowledged.
        let (mut accepted, orphans): (Vec<Bid>, Vec<Bid>) = bids
            .into_iter()
            .partition(|bid| product.bids.iter().any(|entry| entry.id == bid.id));
        let (pending, orphans): (Vec<Bid>, Vec<Bid>) = orphans
            .into_iter()
            .partition(|bid| bid.timestamp > grace_cutoff);
        accepted.sort_by_key(|bid| {
            product
                .bids
                .iter()
                .position(|entry| entry.id == bid.id)
                .unwrap_or(usize::MAX)
        });
        let mut floor = accepted
            .iter()
            .map(|bid| bid.amount)
            .fold(product.initial_price, f64::max);
        let mut dropped = Vec::new();
        for bid in orphans {
            if bid.amount > floor {
                floor = bid.amount;
                accepted.push(bid);
            } else {
                dropped.push(bid);
            }
        }

        product.bids = accepted.iter().map(Bid::product_entry).collect();
        product.current_price = product.price_floor();
        let unchanged = Filter::and([
            Filter::id(product_id),
            Filter::eq("current_price", read_price),
            Filter::not(Filter::elem_match("bids", Filter::not(Filter::any_id(read_ids)))),
        ]);
        let written = store
            .update_one(
                collections::PRODUCTS,
                &unchanged,
                &[
                    Update::set("bids", encode(&product.bids)?),
                    Update::set("current_price", product.current_price),
                ],
            )
            .await?;
        if !written.matched_any() {
            return Err(RepairError::Contended(product_id.to_string()));
        }

        for bid in &dropped {
            tracing::info!(bid_id = %bid.id, product_id, "Dropping unaccepted bid");
            store
                .delete_one(collections::BIDS, &Filter::id(bid.id.as_str()))
                .await?;
        }

        for write in title_writes(&product) {
            write.apply(store).await?;
        }

        let summary = product.summary();
        store
            .update_one(
                collections::USERS,
                &Filter::id(product.owner.id.as_str()),
                &[
                    Update::set_each(
                        "products",
                        Filter::id(product_id),
                        "close_date",
                        encode(&summary.close_date)?,
                    ),
                    Update::set_each(
                        "products",
                        Filter::id(product_id),
                        "buyer",
                        encode(&summary.buyer)?,
                    ),
                    Update::push_unique("products", encode(&summary)?),
                ],
            )
            .await?;

        let kept_ids: Vec<&str> = accepted
            .iter()
            .chain(&pending)
            .map(|b| b.id.as_str())
            .collect();
        store
            .update_many(
                collections::USERS,
                &Filter::elem_match("bids", Filter::eq("product.id", product_id)),
                &[Update::pull(
                    "bids",
                    Filter::and([
                        Filter::eq("product.id", product_id),
                        Filter::not(Filter::any_id(kept_ids)),
                    ]),
                )],
            )
            .await?;
        for bid in &accepted {
            store
                .update_one(
                    collections::USERS,
                    &Filter::id(bid.bidder.id.as_str()),
                    &[
                        Update::set_each("bids", Filter::id(bid.id.as_str()), "amount", bid.amount),
                        Update::push_unique("bids", encode(&bid.user_entry())?),
                    ],
                )
                .await?;
        }

        tracing::debug!(product_id, bids = accepted.len(), "Product mirrors rebuilt");
        if pending.is_empty() {
            Ok(())
        } else {
            Err(RepairError::Pending(product_id.to_string()))
        }
    }

    /// Remove every trace of a product that no longer exists.
    async fn purge_product(&self, product_id: &str) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        store
            .delete_many(collections::BIDS, &Filter::eq("product.id", product_id))
            .await?;
        store
            .update_many(
                collections::USERS,
                &Filter::elem_match("products", Filter::id(product_id)),
                &[Update::pull("products", Filter::id(product_id))],
            )
            .await?;
        store
            .update_many(
                collections::USERS,
                &Filter::elem_match("bids", Filter::eq("product.id", product_id)),
                &[Update::pull("bids", Filter::eq("product.id", product_id))],
            )
            .await?;
        tracing::debug!(product_id, "Purged mirrors of deleted product");
        Ok(())
    }

    async fn repair_user(&self, user_id: &str) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        let Some(user) = fetch::<User>(store, collections::USERS, user_id).await? else {
            return Ok(());
        };
        for write in identity_writes(&user)? {
            write.apply(store).await?;
        }
        store
            .delete_many(
                collections::USERNAMES,
                &Filter::and([
                    Filter::eq("user_id", user_id),
                    Filter::ne("username", user.username.as_str()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn repair_bid(&self, bid_id: &str) -> Result<(), RepairError> {
        let store = self.store.as_ref();
        match fetch::<Bid>(store, collections::BIDS, bid_id).await? {
            Some(bid) => self.repair_product(&bid.product.id).await,
            None => {
                for collection in [collections::PRODUCTS, collections::USERS] {
                    store
                        .update_many(
                            collection,
                            &Filter::elem_match("bids", Filter::id(bid_id)),
                            &[Update::pull("bids", Filter::id(bid_id))],
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}
