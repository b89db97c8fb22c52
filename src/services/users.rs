// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User registration, lookup and identity-change propagation.

use crate::db::collections;
use crate::db::{
    decode, encode, fetch, fetch_all, new_object_id, Filter, FindOptions, SortKey, StoreError,
    Update,
};
use crate::error::{ConflictReason, MarketError, MarketResult};
use crate::models::{NewUser, User, UserBrief, UserPatch};
use crate::services::engine::MarketEngine;
use crate::services::outcome::{MirrorSteps, Outcome, RepairTarget};
use crate::services::propagation::identity_writes;
use crate::services::query::{paginate, Page};
use serde::{Deserialize, Serialize};

const MAX_USERNAME_LEN: usize = 50;

fn check_username(username: &str) -> MarketResult<()> {
    if username.trim().is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(MarketError::input(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

/// Ownership record for a username. Creating it is the atomic step that
/// makes a name unique; the store rejects a second document with the same id.
#[derive(Debug, Serialize, Deserialize)]
struct UsernameClaim {
    id: String,
    username: String,
    user_id: String,
}

fn username_claim_id(username: &str) -> String {
    hex::encode(username.as_bytes())
}

fn claim_held_by(username: &str, user_id: &str) -> Filter {
    Filter::and([
        Filter::id(username_claim_id(username)),
        Filter::eq("user_id", user_id),
    ])
}

impl MarketEngine {
    /// Take `username` for `user_id`. Succeeds if the user already holds it.
    async fn claim_username(&self, username: &str, user_id: &str) -> MarketResult<()> {
        let claim = UsernameClaim {
            id: username_claim_id(username),
            username: username.to_string(),
            user_id: user_id.to_string(),
        };
        match self
            .store
            .insert_one(collections::USERNAMES, encode(&claim)?)
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::DuplicateId(id)) => {
                let holder: Option<UsernameClaim> =
                    fetch(self.store.as_ref(), collections::USERNAMES, &id).await?;
                if holder.is_some_and(|h| h.user_id == user_id) {
                    Ok(())
                } else {
                    Err(MarketError::Conflict(ConflictReason::UsernameTaken(
                        username.to_string(),
                    )))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop a claim after the write it guarded failed.
    async fn release_username(&self, username: &str, user_id: &str) {
        if let Err(e) = self
            .store
            .delete_one(collections::USERNAMES, &claim_held_by(username, user_id))
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to release username claim");
        }
    }

    /// Register a user. Usernames are unique.
    pub async fn create_user(&self, new_user: NewUser) -> MarketResult<User> {
        check_username(&new_user.username)?;
        if self.find_by_username(&new_user.username).await?.is_some() {
            return Err(MarketError::Conflict(ConflictReason::UsernameTaken(
                new_user.username,
            )));
        }

        let user_id = new_object_id()?;
        self.claim_username(&new_user.username, &user_id).await?;

        let user = User {
            id: user_id,
            username: new_user.username,
            email: new_user.email,
            location: new_user.location,
            ratings: Vec::new(),
            products: Vec::new(),
            bids: Vec::new(),
            created_at: self.now(),
        };
        let inserted = match encode(&user) {
            Ok(doc) => self
                .store
                .insert_one(collections::USERS, doc)
                .await
                .map_err(MarketError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = inserted {
            self.release_username(&user.username, &user.id).await;
            return Err(e);
        }

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> MarketResult<User> {
        self.load(collections::USERS, "user", user_id).await
    }

    pub async fn find_by_username(&self, username: &str) -> MarketResult<Option<User>> {
        self.store
            .find_one(collections::USERS, &Filter::eq("username", username))
            .await?
            .map(decode)
            .transpose()
            .map_err(MarketError::from)
    }

    pub async fn list_users(
        &self,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> MarketResult<Page<UserBrief>> {
        let (page, page_size) = paginate(page, page_size, &self.policy)?;
        let total = self.store.count(collections::USERS, &Filter::All).await?;
        let users: Vec<User> = fetch_all(
            self.store.as_ref(),
            collections::USERS,
            &Filter::All,
            &FindOptions::sorted(vec![SortKey::asc("username")])
                .skip(u64::from(page - 1) * u64::from(page_size))
                .limit(u64::from(page_size)),
        )
        .await?;
        Ok(Page {
            items: users.iter().map(User::brief).collect(),
            page,
            page_size,
            total,
        })
    }

    /// Change a user's username or location and refresh every copy of it.
    pub async fn update_user(
        &self,
        user_id: &str,
        patch: UserPatch,
    ) -> MarketResult<Outcome<User>> {
        let mut user: User = self.load(collections::USERS, "user", user_id).await?;

        let mut updates = Vec::new();
        if let Some(location) = patch.location.filter(|l| *l != user.location) {
            updates.push(Update::set("location", encode(&location)?));
            user.location = location;
        }
        let mut renamed_from = None;
        if let Some(username) = patch.username.filter(|u| *u != user.username) {
            check_username(&username)?;
            if let Some(other) = self.find_by_username(&username).await? {
                if other.id != user.id {
                    return Err(MarketError::Conflict(ConflictReason::UsernameTaken(username)));
                }
            }
            self.claim_username(&username, &user.id).await?;
            updates.push(Update::set("username", username.as_str()));
            renamed_from = Some(std::mem::replace(&mut user.username, username));
        }
        if updates.is_empty() {
            return Ok(Outcome::consistent(user));
        }

        let written = self
            .store
            .update_one(collections::USERS, &Filter::id(user_id), &updates)
            .await;
        let matched = matches!(&written, Ok(outcome) if outcome.matched_any());
        if !matched {
            if renamed_from.is_some() {
                self.release_username(&user.username, &user.id).await;
            }
            written?;
            return Err(MarketError::not_found("user", user_id));
        }

        let mut steps = MirrorSteps::new(&self.repairs);
        let target = RepairTarget::User(user.id.clone());
        if let Some(old) = &renamed_from {
            steps
                .run(
                    &target,
                    collections::USERNAMES,
                    "release_old_username",
                    self.store
                        .delete_one(collections::USERNAMES, &claim_held_by(old, &user.id)),
                )
                .await;
        }
        for write in identity_writes(&user)? {
            steps
                .run(&target, write.collection, write.step, write.apply(self.store.as_ref()))
                .await;
        }

        tracing::info!(user_id, "User identity updated");
        Ok(steps.finish(user))
    }
}
