// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fan-out writes that copy an entity's current fields into every
//! embedded mirror. The engine runs them after a source write; the
//! reconciler reruns them to heal drift.

use crate::db::collections;
use crate::db::{encode, DocumentStore, Filter, StoreError, Update, UpdateOutcome};
use crate::models::{Product, User};

/// One update against a mirror collection.
#[derive(Debug, Clone)]
pub(crate) struct MirrorWrite {
    pub collection: &'static str,
    pub step: &'static str,
    pub filter: Filter,
    pub updates: Vec<Update>,
}

impl MirrorWrite {
    fn new(
        collection: &'static str,
        step: &'static str,
        filter: Filter,
        updates: Vec<Update>,
    ) -> Self {
        Self {
            collection,
            step,
            filter,
            updates,
        }
    }

    pub async fn apply(&self, store: &dyn DocumentStore) -> Result<UpdateOutcome, StoreError> {
        store
            .update_many(self.collection, &self.filter, &self.updates)
            .await
    }
}

/// Copies of a user's username and location.
pub(crate) fn identity_writes(user: &User) -> Result<Vec<MirrorWrite>, StoreError> {
    let id = user.id.as_str();
    let username = user.username.as_str();
    let location = encode(&user.location)?;

    Ok(vec![
        MirrorWrite::new(
            collections::PRODUCTS,
            "product_owner",
            Filter::eq("owner.id", id),
            vec![
                Update::set("owner.username", username),
                Update::set("owner.location", location.clone()),
            ],
        ),
        MirrorWrite::new(
            collections::PRODUCTS,
            "product_buyer",
            Filter::eq("buyer.id", id),
            vec![
                Update::set("buyer.username", username),
                Update::set("buyer.location", location.clone()),
            ],
        ),
        MirrorWrite::new(
            collections::PRODUCTS,
            "product_bid_bidder",
            Filter::elem_match("bids", Filter::eq("bidder.id", id)),
            vec![Update::set_each(
                "bids",
                Filter::eq("bidder.id", id),
                "bidder.username",
                username,
            )],
        ),
        MirrorWrite::new(
            collections::BIDS,
            "bid_owner",
            Filter::eq("owner.id", id),
            vec![
                Update::set("owner.username", username),
                Update::set("owner.location", location),
            ],
        ),
        MirrorWrite::new(
            collections::BIDS,
            "bid_bidder",
            Filter::eq("bidder.id", id),
            vec![Update::set("bidder.username", username)],
        ),
        MirrorWrite::new(
            collections::USERS,
            "summary_buyer",
            Filter::elem_match("products", Filter::eq("buyer.id", id)),
            vec![Update::set_each(
                "products",
                Filter::eq("buyer.id", id),
                "buyer.username",
                username,
            )],
        ),
        MirrorWrite::new(
            collections::USERS,
            "rating_rater",
            Filter::elem_match("ratings", Filter::eq("user.id", id)),
            vec![Update::set_each(
                "ratings",
                Filter::eq("user.id", id),
                "user.username",
                username,
            )],
        ),
        MirrorWrite::new(
            collections::CHATS,
            "chat_vendor",
            Filter::eq("vendor.id", id),
            vec![Update::set("vendor.username", username)],
        ),
        MirrorWrite::new(
            collections::CHATS,
            "chat_interested",
            Filter::eq("interested.id", id),
            vec![Update::set("interested.username", username)],
        ),
        MirrorWrite::new(
            collections::MESSAGES,
            "message_origin",
            Filter::eq("origin.id", id),
            vec![Update::set("origin.username", username)],
        ),
    ])
}

/// Copies of a product's title.
pub(crate) fn title_writes(product: &Product) -> Vec<MirrorWrite> {
    let id = product.id.as_str();
    let title = product.title.as_str();

    vec![
        MirrorWrite::new(
            collections::BIDS,
            "bid_product_title",
            Filter::eq("product.id", id),
            vec![Update::set("product.title", title)],
        ),
        MirrorWrite::new(
            collections::USERS,
            "owner_summary_title",
            Filter::id(product.owner.id.as_str()),
            vec![Update::set_each("products", Filter::id(id), "title", title)],
        ),
        // Every entry, not just the first one per user.
        MirrorWrite::new(
            collections::USERS,
            "bidder_summary_title",
            Filter::elem_match("bids", Filter::eq("product.id", id)),
            vec![Update::set_each(
                "bids",
                Filter::eq("product.id", id),
                "product.title",
                title,
            )],
        ),
        MirrorWrite::new(
            collections::CHATS,
            "chat_product_title",
            Filter::eq("product.id", id),
            vec![Update::set("product.title", title)],
        ),
    ]
}
