// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ratings between a product's owner and its buyer (or highest bidder).

use crate::db::collections;
use crate::db::{encode, Filter, Update};
use crate::error::{ConflictReason, MarketError, MarketResult, RatingError};
use crate::models::{IdRef, Product, Rating, User};
use crate::services::engine::MarketEngine;
use crate::services::validation::validate_rating;

/// Overall rating of a user nobody has rated yet.
pub const NO_RATING: f64 = 0.0;

/// Arithmetic mean of the rating values, or [`NO_RATING`] when empty.
pub fn mean(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return NO_RATING;
    }
    ratings.iter().map(|r| r.value).sum::<f64>() / ratings.len() as f64
}

impl MarketEngine {
    /// Rate the other party of a product.
    ///
    /// The owner rates the counterpart (the buyer, or the highest bidder
    /// before resolution); the counterpart rates the owner.
    pub async fn record_rating(
        &self,
        product_id: &str,
        rater_id: &str,
        value: f64,
    ) -> MarketResult<Rating> {
        validate_rating(value)?;
        let product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        let rater: User = self.load(collections::USERS, "user", rater_id).await?;

        let counterpart = match &product.buyer {
            Some(buyer) => buyer.id.clone(),
            None => product
                .highest_bidder()
                .map(|b| b.id.clone())
                .ok_or(RatingError::NoCounterpart)?,
        };
        let rated_id = if rater_id == product.owner.id {
            counterpart
        } else if rater_id == counterpart {
            product.owner.id.clone()
        } else {
            return Err(MarketError::Unauthorized(
                "only the owner and the buyer of a product can rate each other".to_string(),
            ));
        };

        let rating = Rating {
            value,
            product: IdRef {
                id: product_id.to_string(),
            },
            timestamp: self.now(),
            user: rater.brief(),
        };

        // The uniqueness check and the push are one conditional write.
        let already_rated = Filter::elem_match(
            "ratings",
            Filter::and([
                Filter::eq("product.id", product_id),
                Filter::eq("user.id", rater_id),
            ]),
        );
        let outcome = self
            .store
            .update_one(
                collections::USERS,
                &Filter::and([Filter::id(rated_id.as_str()), Filter::not(already_rated)]),
                &[Update::push("ratings", encode(&rating)?)],
            )
            .await?;

        if !outcome.matched_any() {
            return Err(
                match self.store.get_by_id(collections::USERS, &rated_id).await? {
                    Some(_) => MarketError::Conflict(ConflictReason::DuplicateRating),
                    None => MarketError::not_found("user", &rated_id),
                },
            );
        }

        tracing::info!(product_id, rater_id, rated_id = %rated_id, value, "Rating recorded");
        Ok(rating)
    }

    pub async fn overall_rating(&self, user_id: &str) -> MarketResult<f64> {
        let user: User = self.load(collections::USERS, "user", user_id).await?;
        Ok(mean(&user.ratings))
    }

    pub async fn list_ratings(&self, user_id: &str) -> MarketResult<Vec<Rating>> {
        let user: User = self.load(collections::USERS, "user", user_id).await?;
        Ok(user.ratings)
    }
}
