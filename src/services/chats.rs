// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Buyer/vendor chat threads attached to a product.

use crate::db::collections;
use crate::db::{decode, encode, fetch_all, new_object_id, Filter, FindOptions, SortKey};
use crate::error::{MarketError, MarketResult};
use crate::models::{Chat, IdRef, Message, Product, User};
use crate::services::engine::MarketEngine;

const MAX_MESSAGE_LEN: usize = 2000;

impl MarketEngine {
    /// Open (or return the existing) thread between `actor` and the owner
    /// of a product.
    pub async fn open_chat(&self, actor: &str, product_id: &str) -> MarketResult<Chat> {
        let product: Product = self.load(collections::PRODUCTS, "product", product_id).await?;
        if product.owner.id == actor {
            return Err(MarketError::input("cannot open a chat on your own product"));
        }
        let interested: User = self.load(collections::USERS, "user", actor).await?;

        let existing = Filter::and([
            Filter::eq("product.id", product_id),
            Filter::eq("interested.id", actor),
        ]);
        if let Some(doc) = self.store.find_one(collections::CHATS, &existing).await? {
            return Ok(decode(doc)?);
        }

        let chat = Chat {
            id: new_object_id()?,
            vendor: product.owner.brief(),
            interested: interested.brief(),
            product: product.product_ref(),
            created_at: self.now(),
        };
        self.store
            .insert_one(collections::CHATS, encode(&chat)?)
            .await?;

        tracing::info!(chat_id = %chat.id, product_id, interested_id = actor, "Chat opened");
        Ok(chat)
    }

    /// Threads the user takes part in, newest first.
    pub async fn list_chats(&self, user_id: &str) -> MarketResult<Vec<Chat>> {
        Ok(fetch_all(
            self.store.as_ref(),
            collections::CHATS,
            &Filter::or([
                Filter::eq("vendor.id", user_id),
                Filter::eq("interested.id", user_id),
            ]),
            &FindOptions::sorted(vec![SortKey::desc("created_at").as_instants()]),
        )
        .await?)
    }

    pub async fn get_chat(&self, actor: &str, chat_id: &str) -> MarketResult<Chat> {
        let chat: Chat = self.load(collections::CHATS, "chat", chat_id).await?;
        if !chat.has_participant(actor) {
            return Err(MarketError::Unauthorized(
                "not a participant of this chat".to_string(),
            ));
        }
        Ok(chat)
    }

    /// Messages of a thread, oldest first.
    pub async fn list_messages(&self, actor: &str, chat_id: &str) -> MarketResult<Vec<Message>> {
        self.get_chat(actor, chat_id).await?;
        Ok(fetch_all(
            self.store.as_ref(),
            collections::MESSAGES,
            &Filter::eq("chat.id", chat_id),
            &FindOptions::sorted(vec![SortKey::asc("timestamp").as_instants()]),
        )
        .await?)
    }

    pub async fn send_message(
        &self,
        actor: &str,
        chat_id: &str,
        text: &str,
    ) -> MarketResult<Message> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_MESSAGE_LEN {
            return Err(MarketError::input(format!(
                "message must be 1 to {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        let chat = self.get_chat(actor, chat_id).await?;
        let origin = if chat.vendor.id == actor {
            chat.vendor
        } else {
            chat.interested
        };

        let message = Message {
            id: new_object_id()?,
            chat: IdRef {
                id: chat.id.clone(),
            },
            timestamp: self.now(),
            origin,
            text: text.to_string(),
        };
        self.store
            .insert_one(collections::MESSAGES, encode(&message)?)
            .await?;

        tracing::debug!(chat_id, message_id = %message.id, "Message sent");
        Ok(message)
    }

    pub async fn last_message(&self, actor: &str, chat_id: &str) -> MarketResult<Option<Message>> {
        self.get_chat(actor, chat_id).await?;
        let mut latest: Vec<Message> = fetch_all(
            self.store.as_ref(),
            collections::MESSAGES,
            &Filter::eq("chat.id", chat_id),
            &FindOptions::sorted(vec![SortKey::desc("timestamp").as_instants()]).limit(1),
        )
        .await?;
        Ok(latest.pop())
    }
}
