// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bid write protocol.
//!
//! Write order for a new bid: the `bids` document (source of truth), then
//! `Product.bids[]` through a conditional claim, then the bidder's
//! `User.bids[]`. The claim only lands while no embedded bid is at or
//! above the new amount, which makes price monotonicity hold under
//! concurrent submissions.

use crate::db::collections;
use crate::db::{encode, fetch, fetch_all, new_object_id, Filter, Update};
use crate::error::{BidError, ConflictReason, MarketError, MarketResult};
use crate::models::{Bid, Product, User};
use crate::services::engine::{check_id, MarketEngine};
use crate::services::outcome::{MirrorSteps, Outcome, RepairTarget};
use crate::services::query::{BidQuery, Page};
use crate::services::validation::validate_bid_submission;

/// Claim attempts before a submission is reported as a conflict.
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Condition under which `amount` may still be appended to the product.
fn claim_filter(product_id: &str, amount: f64, now: chrono::DateTime<chrono::Utc>) -> Filter {
    Filter::and([
        Filter::id(product_id),
        Filter::lt("initial_price", amount),
        Filter::not(Filter::elem_match("bids", Filter::gte("amount", amount))),
        Filter::at_or_after("close_date", now),
    ])
}

impl MarketEngine {
    /// Place a bid on a product.
    pub async fn submit_bid(
        &self,
        product_id: &str,
        bidder_id: &str,
        amount: f64,
    ) -> MarketResult<Outcome<Bid>> {
        let product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        let bidder: User = self.load(collections::USERS, "user", bidder_id).await?;
        let now = self.now();
        validate_bid_submission(&product, bidder_id, amount, now)?;

        let bid = Bid {
            id: new_object_id()?,
            amount,
            timestamp: now,
            product: product.product_ref(),
            owner: product.owner.clone(),
            bidder: bidder.brief(),
        };
        let entry = encode(&bid.product_entry())?;
        let user_entry = encode(&bid.user_entry())?;
        self.store
            .insert_one(collections::BIDS, encode(&bid)?)
            .await?;

        let mut steps = MirrorSteps::new(&self.repairs);
        let target = RepairTarget::Bid(bid.id.clone());
        let claim = [
            Update::set("current_price", amount),
            Update::push_unique("bids", entry),
        ];

        let mut attempt = 1;
        loop {
            let result = self
                .store
                .update_one(
                    collections::PRODUCTS,
                    &claim_filter(product_id, amount, self.now()),
                    &claim,
                )
                .await;

            match result {
                Ok(outcome) if outcome.matched_any() => break,
                Ok(_) => {
                    // Someone else's bid landed first, or the product changed.
                    let rejection = match self.recheck_claim(product_id, bidder_id, amount).await {
                        Ok(_) if attempt < MAX_CLAIM_ATTEMPTS => {
                            attempt += 1;
                            continue;
                        }
                        Ok(floor) => MarketError::Conflict(ConflictReason::ConcurrentBid {
                            amount,
                            current_price: floor,
                        }),
                        Err(e) => e,
                    };
                    self.withdraw_bid(&bid).await;
                    return Err(rejection);
                }
                Err(e) => {
                    // The bid document is committed; the product mirror is stale.
                    steps
                        .run(&target, collections::PRODUCTS, "claim_product", async {
                            Err::<(), _>(e)
                        })
                        .await;
                    break;
                }
            }
        }

        steps
            .run(
                &target,
                collections::USERS,
                "push_bidder_entry",
                self.store.update_one(
                    collections::USERS,
                    &Filter::id(bidder_id),
                    &[Update::push_unique("bids", user_entry)],
                ),
            )
            .await;

        tracing::info!(
            bid_id = %bid.id,
            product_id,
            bidder_id,
            amount,
            attempts = attempt,
            "Bid recorded"
        );
        Ok(steps.finish(bid))
    }

    /// Revalidate after a lost claim. `Ok` carries the current price floor
    /// and means retrying may succeed.
    async fn recheck_claim(
        &self,
        product_id: &str,
        bidder_id: &str,
        amount: f64,
    ) -> MarketResult<f64> {
        let product: Product = fetch(self.store.as_ref(), collections::PRODUCTS, product_id)
            .await?
            .ok_or_else(|| MarketError::not_found("product", product_id))?;

        match validate_bid_submission(&product, bidder_id, amount, self.now()) {
            Ok(()) => Ok(product.price_floor()),
            Err(BidError::AmountTooLow { amount, floor }) => {
                Err(MarketError::Conflict(ConflictReason::ConcurrentBid {
                    amount,
                    current_price: floor,
                }))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Remove a bid document whose claim failed.
    async fn withdraw_bid(&self, bid: &Bid) {
        if let Err(e) = self
            .store
            .delete_one(collections::BIDS, &Filter::id(bid.id.as_str()))
            .await
        {
            // Left behind; the product repair drops it as unaccepted.
            tracing::warn!(bid_id = %bid.id, error = %e, "Failed to withdraw rejected bid");
            self.repairs
                .record(RepairTarget::Product(bid.product.id.clone()));
        }
    }

    /// Administrative correction of a bid amount.
    pub async fn update_bid(
        &self,
        actor: &str,
        bid_id: &str,
        new_amount: f64,
    ) -> MarketResult<Outcome<Bid>> {
        self.require_admin(actor)?;
        if !new_amount.is_finite() || new_amount <= 0.0 {
            return Err(BidError::InvalidAmount.into());
        }
        let mut bid: Bid = self.load(collections::BIDS, "bid", bid_id).await?;

        let outcome = self
            .store
            .update_one(
                collections::BIDS,
                &Filter::id(bid_id),
                &[Update::set("amount", new_amount)],
            )
            .await?;
        if !outcome.matched_any() {
            return Err(MarketError::not_found("bid", bid_id));
        }
        bid.amount = new_amount;

        let mut steps = MirrorSteps::new(&self.repairs);
        let target = RepairTarget::Bid(bid.id.clone());
        steps
            .run(
                &target,
                collections::PRODUCTS,
                "set_product_entry_amount",
                self.store.update_one(
                    collections::PRODUCTS,
                    &Filter::id(bid.product.id.as_str()),
                    &[Update::set_each("bids", Filter::id(bid_id), "amount", new_amount)],
                ),
            )
            .await;
        steps
            .run(
                &target,
                collections::PRODUCTS,
                "refresh_current_price",
                self.refresh_price(&bid.product.id),
            )
            .await;
        steps
            .run(
                &target,
                collections::USERS,
                "set_bidder_entry_amount",
                self.store.update_one(
                    collections::USERS,
                    &Filter::id(bid.bidder.id.as_str()),
                    &[Update::set_each("bids", Filter::id(bid_id), "amount", new_amount)],
                ),
            )
            .await;

        tracing::info!(bid_id, actor, amount = new_amount, "Bid amount corrected");
        Ok(steps.finish(bid))
    }

    /// Administrative removal of a bid. Removing an absent bid succeeds.
    ///
    /// The value is whether a bid document was deleted.
    pub async fn delete_bid(&self, actor: &str, bid_id: &str) -> MarketResult<Outcome<bool>> {
        self.require_admin(actor)?;
        check_id(bid_id)?;

        let bid: Option<Bid> = fetch(self.store.as_ref(), collections::BIDS, bid_id).await?;
        let deleted = self
            .store
            .delete_one(collections::BIDS, &Filter::id(bid_id))
            .await?
            > 0;

        let mut steps = MirrorSteps::new(&self.repairs);
        let target = RepairTarget::Bid(bid_id.to_string());
        let holding = Filter::elem_match("bids", Filter::id(bid_id));
        let pull = [Update::pull("bids", Filter::id(bid_id))];

        steps
            .run(
                &target,
                collections::PRODUCTS,
                "pull_product_entry",
                self.store.update_many(collections::PRODUCTS, &holding, &pull),
            )
            .await;
        if let Some(bid) = &bid {
            steps
                .run(
                    &target,
                    collections::PRODUCTS,
                    "refresh_current_price",
                    self.refresh_price(&bid.product.id),
                )
                .await;
        }
        steps
            .run(
                &target,
                collections::USERS,
                "pull_bidder_entry",
                self.store.update_many(collections::USERS, &holding, &pull),
            )
            .await;

        tracing::info!(bid_id, actor, deleted, "Bid removed");
        Ok(steps.finish(deleted))
    }

    /// Recompute `current_price` from the embedded bids.
    ///
    /// Conditional on the price not having moved since the read, so a
    /// concurrent claim is never overwritten.
    async fn refresh_price(&self, product_id: &str) -> Result<(), crate::db::StoreError> {
        let Some(product) =
            fetch::<Product>(self.store.as_ref(), collections::PRODUCTS, product_id).await?
        else {
            return Ok(());
        };
        let floor = product.price_floor();
        if floor != product.current_price {
            self.store
                .update_one(
                    collections::PRODUCTS,
                    &Filter::and([
                        Filter::id(product_id),
                        Filter::eq("current_price", product.current_price),
                    ]),
                    &[Update::set("current_price", floor)],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_bid(&self, bid_id: &str) -> MarketResult<Bid> {
        self.load(collections::BIDS, "bid", bid_id).await
    }

    pub async fn list_bids(&self, query: &BidQuery) -> MarketResult<Page<Bid>> {
        let spec = query.to_spec(&self.policy)?;
        let total = self.store.count(collections::BIDS, &spec.filter).await?;
        let items = fetch_all(
            self.store.as_ref(),
            collections::BIDS,
            &spec.filter,
            &spec.options,
        )
        .await?;
        Ok(Page {
            items,
            page: spec.page,
            page_size: spec.page_size,
            total,
        })
    }
}
