// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document store layer.
//!
//! The engine talks to storage only through [`DocumentStore`]. Two backends
//! exist: [`FirestoreStore`] for deployments and [`MemoryStore`] for local
//! runs and tests.

pub mod firestore;
pub mod memory;
pub mod query;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use query::{FindOptions, Filter, SortDirection, SortKey, Update};

use async_trait::async_trait;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PRODUCTS: &str = "products";
    pub const BIDS: &str = "bids";
    pub const CHATS: &str = "chats";
    pub const MESSAGES: &str = "messages";
    /// One document per taken username, keyed by the hex-encoded name.
    pub const USERNAMES: &str = "usernames";
}

/// Longest accepted document id, in bytes.
const MAX_ID_LEN: usize = 128;

/// Errors raised by a store backend. "Not found" is never an error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid update on `{path}`: {reason}")]
    InvalidUpdate { path: String, reason: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document {0} already exists")]
    DuplicateId(String),
}

/// Result of an update call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents that satisfied the filter.
    pub matched: u64,
    /// Documents whose content changed.
    pub modified: u64,
}

impl UpdateOutcome {
    pub fn matched_any(&self) -> bool {
        self.matched > 0
    }
}

/// Minimal document store the marketplace engine is written against.
///
/// A conditional `update_one` (a filter carrying more than the id) must be
/// applied atomically per document: the engine uses it as compare-and-set.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.find_one(collection, &Filter::id(id)).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter)
        -> Result<Option<Value>, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Insert a document, assigning an id when it has none. Returns the id.
    async fn insert_one(&self, collection: &str, doc: Value) -> Result<String, StoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;
}

/// Generate a new opaque id: 24 lowercase hex characters.
pub fn new_object_id() -> Result<String, StoreError> {
    let mut bytes = [0u8; 12];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StoreError::Unavailable("system random source failed".to_string()))?;
    Ok(hex::encode(bytes))
}

/// Whether a string is acceptable as a document id.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id
            .chars()
            .any(|c| c == '/' || c.is_whitespace() || c.is_control())
}

/// Make sure `doc` is an object with an id, generating one if missing.
pub(crate) fn ensure_id(doc: &mut Value) -> Result<String, StoreError> {
    let Value::Object(map) = doc else {
        return Err(StoreError::InvalidDocument("not an object".to_string()));
    };
    match map.get("id") {
        Some(Value::String(id)) if is_valid_id(id) => Ok(id.clone()),
        None | Some(Value::Null) => {
            let id = new_object_id()?;
            map.insert("id".to_string(), Value::String(id.clone()));
            Ok(id)
        }
        Some(other) => Err(StoreError::InvalidDocument(format!("bad id {}", other))),
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

pub fn decode<T: DeserializeOwned>(doc: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(doc)?)
}

/// Load and decode a document by id.
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get_by_id(collection, id)
        .await?
        .map(decode)
        .transpose()
}

/// Run a query and decode every result.
pub async fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
    options: &FindOptions,
) -> Result<Vec<T>, StoreError> {
    store
        .find(collection, filter, options)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ids_are_24_hex_chars() {
        let a = new_object_id().unwrap();
        let b = new_object_id().unwrap();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_validation() {
        assert!(is_valid_id("65f1c0ffee0000000000abcd"));
        assert!(is_valid_id("any-opaque_string"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id(&"x".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn test_ensure_id_assigns_when_missing() {
        let mut doc = json!({ "title": "x" });
        let id = ensure_id(&mut doc).unwrap();
        assert_eq!(doc["id"], id.as_str());

        let mut keep = json!({ "id": "fixed" });
        assert_eq!(ensure_id(&mut keep).unwrap(), "fixed");

        let mut bad = json!([1, 2]);
        assert!(ensure_id(&mut bad).is_err());
    }
}
