// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Product write protocol and product queries.

use crate::db::collections;
use crate::db::{encode, fetch, fetch_all, new_object_id, Filter, FindOptions, SortKey, Update};
use crate::error::{ConflictReason, MarketError, MarketResult, ProductError};
use crate::models::{NewProduct, Product, ProductPatch, User, UserBrief};
use crate::services::engine::MarketEngine;
use crate::services::outcome::{MirrorSteps, Outcome, RepairTarget};
use crate::services::propagation::title_writes;
use crate::services::query::{Page, ProductQuery};
use crate::services::validation::{
    validate_price, validate_product_creation, validate_product_resolution,
};
use serde::Serialize;

/// Listings shown next to a product.
const RELATED_LIMIT: u64 = 10;

/// Products a user has bid on, by state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BidderProducts {
    pub open: Vec<Product>,
    pub won: Vec<Product>,
    pub lost: Vec<Product>,
}

impl MarketEngine {
    pub async fn create_product(
        &self,
        owner_id: &str,
        attrs: NewProduct,
    ) -> MarketResult<Outcome<Product>> {
        let now = self.now();
        validate_price(attrs.initial_price)?;
        validate_price(attrs.weight)?;
        validate_product_creation(attrs.close_date, now, &self.policy)?;
        if attrs.title.trim().is_empty() {
            return Err(MarketError::input("title must not be empty"));
        }
        let owner: User = self.load(collections::USERS, "user", owner_id).await?;

        let product = Product {
            id: new_object_id()?,
            title: attrs.title,
            description: attrs.description,
            initial_price: attrs.initial_price,
            initial_date: now,
            close_date: attrs.close_date,
            weight: attrs.weight,
            owner: owner.as_owner(),
            buyer: None,
            bids: Vec::new(),
            current_price: attrs.initial_price,
        };
        let summary = encode(&product.summary())?;
        self.store
            .insert_one(collections::PRODUCTS, encode(&product)?)
            .await?;

        let mut steps = MirrorSteps::new(&self.repairs);
        steps
            .run(
                &RepairTarget::Product(product.id.clone()),
                collections::USERS,
                "push_owner_summary",
                self.store.update_one(
                    collections::USERS,
                    &Filter::id(owner_id),
                    &[Update::push_unique("products", summary)],
                ),
            )
            .await;

        tracing::info!(product_id = %product.id, owner_id, "Product listed");
        Ok(steps.finish(product))
    }

    /// Owner edit of title, description, price or weight.
    pub async fn update_product(
        &self,
        actor: &str,
        product_id: &str,
        patch: ProductPatch,
    ) -> MarketResult<Outcome<Product>> {
        if patch.is_empty() {
            return Err(MarketError::input("nothing to update"));
        }
        let mut product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        if product.owner.id != actor {
            return Err(MarketError::Unauthorized(
                "only the owner can edit a product".to_string(),
            ));
        }
        if product.is_closed(self.now()) {
            return Err(ProductError::ClosedForEdits.into());
        }

        let mut updates = Vec::new();
        let mut conditions = vec![Filter::id(product_id)];
        let title_changed = match &patch.title {
            Some(title) if title.trim().is_empty() => {
                return Err(MarketError::input("title must not be empty"));
            }
            Some(title) if *title != product.title => {
                updates.push(Update::set("title", title.as_str()));
                product.title = title.clone();
                true
            }
            _ => false,
        };
        if let Some(description) = patch.description {
            updates.push(Update::set("description", description.as_str()));
            product.description = description;
        }
        if let Some(weight) = patch.weight {
            validate_price(weight)?;
            updates.push(Update::set("weight", weight));
            product.weight = weight;
        }
        if let Some(price) = patch.initial_price {
            validate_price(price)?;
            if !product.bids.is_empty() {
                return Err(ProductError::PriceLocked.into());
            }
            // Only while still unbid; a concurrent claim makes this miss.
            conditions.push(Filter::array_empty("bids"));
            updates.push(Update::set("initial_price", price));
            updates.push(Update::set("current_price", price));
            product.initial_price = price;
            product.current_price = price;
        }

        let outcome = self
            .store
            .update_one(collections::PRODUCTS, &Filter::and(conditions), &updates)
            .await?;
        if !outcome.matched_any() {
            let still_there: Option<Product> =
                fetch(self.store.as_ref(), collections::PRODUCTS, product_id).await?;
            return Err(match still_there {
                Some(_) => ProductError::PriceLocked.into(),
                None => MarketError::not_found("product", product_id),
            });
        }

        let mut steps = MirrorSteps::new(&self.repairs);
        if title_changed {
            let target = RepairTarget::Product(product.id.clone());
            for write in title_writes(&product) {
                steps
                    .run(&target, write.collection, write.step, write.apply(self.store.as_ref()))
                    .await;
            }
        }

        tracing::info!(product_id, title_changed, "Product updated");
        Ok(steps.finish(product))
    }

    /// Delete a product and cascade to its bids and every summary of it.
    pub async fn delete_product(&self, actor: &str, product_id: &str) -> MarketResult<Outcome<()>> {
        let product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        if product.owner.id != actor {
            return Err(MarketError::Unauthorized(
                "only the owner can delete a product".to_string(),
            ));
        }

        self.store
            .delete_one(collections::PRODUCTS, &Filter::id(product_id))
            .await?;

        let mut steps = MirrorSteps::new(&self.repairs);
        let target = RepairTarget::Product(product_id.to_string());
        let of_product = Filter::eq("product.id", product_id);

        let removed = steps
            .run(
                &target,
                collections::BIDS,
                "cascade_bids",
                self.store.delete_many(collections::BIDS, &of_product),
            )
            .await;
        steps
            .run(
                &target,
                collections::USERS,
                "pull_owner_summary",
                self.store.update_one(
                    collections::USERS,
                    &Filter::id(product.owner.id.as_str()),
                    &[Update::pull("products", Filter::id(product_id))],
                ),
            )
            .await;
        steps
            .run(
                &target,
                collections::USERS,
                "pull_bidder_entries",
                self.store.update_many(
                    collections::USERS,
                    &Filter::elem_match("bids", of_product.clone()),
                    &[Update::pull("bids", of_product.clone())],
                ),
            )
            .await;

        tracing::info!(
            product_id,
            bids_removed = removed.unwrap_or(0),
            "Product deleted"
        );
        Ok(steps.finish(()))
    }

    /// Record the winning bidder as buyer once the product has closed.
    ///
    /// The owner or the buyer may resolve. Resolving again with the same
    /// buyer is a no-op.
    pub async fn resolve_product(
        &self,
        actor: &str,
        product_id: &str,
        buyer_id: &str,
    ) -> MarketResult<Outcome<Product>> {
        let mut product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        if actor != product.owner.id && actor != buyer_id {
            return Err(MarketError::Unauthorized(
                "only the owner or the buyer can resolve a product".to_string(),
            ));
        }
        if let Some(existing) = &product.buyer {
            return if existing.id == buyer_id {
                Ok(Outcome::consistent(product))
            } else {
                Err(MarketError::Conflict(ConflictReason::AlreadyResolved))
            };
        }
        validate_product_resolution(&product, buyer_id, self.now())?;
        let buyer: User = self.load(collections::USERS, "user", buyer_id).await?;
        let buyer_ref = buyer.as_owner();

        let outcome = self
            .store
            .update_one(
                collections::PRODUCTS,
                &Filter::and([Filter::id(product_id), Filter::is_null("buyer")]),
                &[Update::set("buyer", encode(&buyer_ref)?)],
            )
            .await?;
        if !outcome.matched_any() {
            // Lost to a concurrent resolution.
            let current: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
            return match &current.buyer {
                Some(existing) if existing.id == buyer_id => Ok(Outcome::consistent(current)),
                _ => Err(MarketError::Conflict(ConflictReason::AlreadyResolved)),
            };
        }
        product.buyer = Some(buyer_ref);

        let mut steps = MirrorSteps::new(&self.repairs);
        steps
            .run(
                &RepairTarget::Product(product.id.clone()),
                collections::USERS,
                "owner_summary_buyer",
                self.store.update_one(
                    collections::USERS,
                    &Filter::id(product.owner.id.as_str()),
                    &[Update::set_each(
                        "products",
                        Filter::id(product_id),
                        "buyer",
                        encode(&buyer.brief())?,
                    )],
                ),
            )
            .await;

        tracing::info!(product_id, buyer_id, "Product resolved");
        Ok(steps.finish(product))
    }

    pub async fn get_product(&self, product_id: &str) -> MarketResult<Product> {
        self.load(collections::PRODUCTS, "product", product_id).await
    }

    pub async fn list_products(&self, query: &ProductQuery) -> MarketResult<Page<Product>> {
        let spec = query.to_spec(&self.policy, self.now())?;
        let total = self.store.count(collections::PRODUCTS, &spec.filter).await?;
        let items = fetch_all(
            self.store.as_ref(),
            collections::PRODUCTS,
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

    /// A user's listings, latest close date first.
    pub async fn owner_products(&self, user_id: &str) -> MarketResult<Vec<Product>> {
        let _: User = self.load(collections::USERS, "user", user_id).await?;
        Ok(fetch_all(
            self.store.as_ref(),
            collections::PRODUCTS,
            &Filter::eq("owner.id", user_id),
            &FindOptions::sorted(vec![SortKey::desc("close_date").as_instants()]),
        )
        .await?)
    }

    /// Other listings by the same owner.
    pub async fn related_products(&self, product_id: &str) -> MarketResult<Vec<Product>> {
        let product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        Ok(fetch_all(
            self.store.as_ref(),
            collections::PRODUCTS,
            &Filter::and([
                Filter::eq("owner.id", product.owner.id.as_str()),
                Filter::ne("id", product_id),
            ]),
            &FindOptions::sorted(vec![SortKey::asc("close_date").as_instants()])
                .limit(RELATED_LIMIT),
        )
        .await?)
    }

    /// Products the user bid on: still open, won, or lost.
    pub async fn bidder_products(&self, user_id: &str) -> MarketResult<BidderProducts> {
        let _: User = self.load(collections::USERS, "user", user_id).await?;
        let products: Vec<Product> = fetch_all(
            self.store.as_ref(),
            collections::PRODUCTS,
            &Filter::elem_match("bids", Filter::eq("bidder.id", user_id)),
            &FindOptions::sorted(vec![SortKey::desc("close_date").as_instants()]),
        )
        .await?;

        let now = self.now();
        let mut split = BidderProducts::default();
        for product in products {
            let winner = match &product.buyer {
                Some(buyer) => Some(buyer.id.as_str()),
                None => product.highest_bidder().map(|b| b.id.as_str()),
            };
            if !product.is_closed(now) && product.buyer.is_none() {
                split.open.push(product);
            } else if winner == Some(user_id) {
                split.won.push(product);
            } else {
                split.lost.push(product);
            }
        }
        Ok(split)
    }

    /// Number of the user's listings that have a buyer.
    pub async fn sold_count(&self, user_id: &str) -> MarketResult<u64> {
        let _: User = self.load(collections::USERS, "user", user_id).await?;
        Ok(self
            .store
            .count(
                collections::PRODUCTS,
                &Filter::and([
                    Filter::eq("owner.id", user_id),
                    Filter::not(Filter::is_null("buyer")),
                ]),
            )
            .await?)
    }

    /// Distinct users who bought one of the user's listings, earliest
    /// sale first.
    pub async fn buyers(&self, user_id: &str) -> MarketResult<Vec<UserBrief>> {
        let _: User = self.load(collections::USERS, "user", user_id).await?;
        let sold: Vec<Product> = fetch_all(
            self.store.as_ref(),
            collections::PRODUCTS,
            &Filter::and([
                Filter::eq("owner.id", user_id),
                Filter::not(Filter::is_null("buyer")),
            ]),
            &FindOptions::sorted(vec![SortKey::asc("close_date").as_instants()]),
        )
        .await?;

        let mut buyers: Vec<UserBrief> = Vec::new();
        for buyer in sold.iter().filter_map(|p| p.buyer.as_ref()) {
            if !buyers.iter().any(|b| b.id == buyer.id) {
                buyers.push(buyer.brief());
            }
        }
        Ok(buyers)
    }
}
