// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store.
//!
//! Each collection is a `Vec<Value>` in insertion order behind a `DashMap`
//! shard lock. Every call completes under that lock, so a conditional
//! `update_one` is an atomic compare-and-set.

use super::query::{apply_updates, Filter, FindOptions, Update};
use super::{ensure_id, DocumentStore, StoreError, UpdateOutcome};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every document in a collection, in insertion order.
    pub fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    fn update_matching(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        first_only: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        // Stage every change before touching the collection.
        let mut staged = Vec::new();
        let mut outcome = UpdateOutcome::default();
        for (index, doc) in docs.iter().enumerate() {
            if !filter.matches(doc) {
                continue;
            }
            outcome.matched += 1;
            let mut updated = doc.clone();
            if apply_updates(&mut updated, updates)? {
                outcome.modified += 1;
                staged.push((index, updated));
            }
            if first_only {
                break;
            }
        }

        for (index, updated) in staged {
            docs[index] = updated;
        }
        Ok(outcome)
    }

    fn delete_matching(&self, collection: &str, filter: &Filter, first_only: bool) -> u64 {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return 0;
        };
        if first_only {
            return match docs.iter().position(|doc| filter.matches(doc)) {
                Some(index) => {
                    docs.remove(index);
                    1
                }
                None => 0,
            };
        }
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        (before - docs.len()) as u64
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)).cloned()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let matching: Vec<Value> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(options.apply(matching))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(&self, collection: &str, mut doc: Value) -> Result<String, StoreError> {
        let id = ensure_id(&mut doc)?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get("id").and_then(Value::as_str) == Some(id.as_str())) {
            return Err(StoreError::DuplicateId(id));
        }
        docs.push(doc);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.update_matching(collection, filter, updates, true)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.update_matching(collection, filter, updates, false)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.delete_matching(collection, filter, true))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.delete_matching(collection, filter, false))
    }
}
