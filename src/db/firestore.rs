// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed document store.
//!
//! String equalities at the top level of a filter are pushed down as a
//! Firestore query; the rest of the filter, sorting and pagination run in
//! process over the returned documents.
//!
//! Updates read their target documents inside a read-write transaction and
//! commit the rewritten documents in the same transaction, so a concurrent
//! writer invalidates the commit rather than the condition. Contended
//! commits are retried a bounded number of times. Inserts use Firestore's
//! create operation and fail if the id is taken.

use super::query::{apply_updates, Filter, FindOptions, Update};
use super::{ensure_id, DocumentStore, StoreError, UpdateOutcome};
use async_trait::async_trait;
use serde_json::Value;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempts at a contended update transaction before giving up.
const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Firestore document store.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline store for testing.
    ///
    /// All operations will return `StoreError::Unavailable`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client.as_ref().ok_or_else(|| {
            StoreError::Unavailable("Database not connected (offline mode)".to_string())
        })
    }

    /// Fetch the candidate documents for a filter.
    ///
    /// Id lookups are a direct get; otherwise top-level string equalities
    /// become the Firestore query. Results still need `filter.matches`.
    /// Pass a transaction-scoped client to register the reads with that
    /// transaction.
    async fn candidates(
        client: &firestore::FirestoreDb,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(id) = filter.id_equality() {
            let doc: Option<Value> = client
                .fluent()
                .select()
                .by_id_in(collection)
                .obj()
                .one(id)
                .await
                .map_err(store_error)?;
            return Ok(doc.into_iter().collect());
        }

        let pushdown: Vec<(String, String)> = filter
            .string_equalities()
            .into_iter()
            .map(|(path, value)| (path.to_string(), value.to_string()))
            .collect();

        let query = client.fluent().select().from(collection);
        let result: firestore::FirestoreResult<Vec<Value>> = if pushdown.is_empty() {
            query.obj().query().await
        } else {
            query
                .filter(move |q| {
                    q.for_all(
                        pushdown
                            .iter()
                            .map(|(path, value)| q.field(path.as_str()).eq(value.clone())),
                    )
                })
                .obj()
                .query()
                .await
        };

        result.map_err(store_error)
    }

    async fn matching(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let mut docs = Self::candidates(self.get_client()?, collection, filter).await?;
        docs.retain(|doc| filter.matches(doc));
        Ok(docs)
    }

    /// Delete documents in transactional batches.
    async fn batch_delete(&self, collection: &str, docs: &[Value]) -> Result<(), StoreError> {
        let client = self.get_client()?;

        for chunk in docs.chunks(BATCH_SIZE) {
            let mut transaction = client.begin_transaction().await.map_err(|e| {
                StoreError::Unavailable(format!("Failed to begin transaction: {}", e))
            })?;

            for doc in chunk {
                let id = doc_id(doc)?;
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        StoreError::Unavailable(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                StoreError::Unavailable(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    async fn update_matching(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        first_only: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let client = self.get_client()?;
        let mut last_error = None;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            match Self::try_update(client, collection, filter, updates, first_only).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_contention(&e) => {
                    tracing::debug!(
                        collection,
                        attempt,
                        error = %e,
                        "Update transaction contended, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(store_error(e)),
            }
        }

        Err(StoreError::Unavailable(format!(
            "update on {} still contended after {} attempts: {}",
            collection,
            MAX_TRANSACTION_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// One read-modify-write attempt inside a single transaction.
    ///
    /// The filter is evaluated against documents read through the
    /// transaction, so the commit fails if any of them changed meanwhile.
    async fn try_update(
        client: &firestore::FirestoreDb,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
        first_only: bool,
    ) -> Result<UpdateOutcome, TransactionError> {
        let mut transaction = client.begin_transaction().await?;
        let scoped = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        let read = Self::candidates(&scoped, collection, filter).await;
        let mut docs = match read {
            Ok(docs) => docs,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(TransactionError::Store(e));
            }
        };
        docs.retain(|doc| filter.matches(doc));
        if first_only {
            docs.truncate(1);
        }

        let mut outcome = UpdateOutcome {
            matched: docs.len() as u64,
            modified: 0,
        };
        let mut changed = Vec::new();
        for mut doc in docs {
            match apply_updates(&mut doc, updates) {
                Ok(true) => changed.push(doc),
                Ok(false) => {}
                Err(e) => {
                    let _ = transaction.rollback().await;
                    return Err(TransactionError::Store(e));
                }
            }
        }
        outcome.modified = changed.len() as u64;

        if changed.is_empty() {
            transaction.rollback().await?;
            return Ok(outcome);
        }
        if changed.len() > BATCH_SIZE {
            let _ = transaction.rollback().await;
            return Err(TransactionError::Store(StoreError::Unavailable(format!(
                "update touches {} documents in {}, more than one transaction allows",
                changed.len(),
                collection
            ))));
        }

        for doc in &changed {
            let id = match doc_id(doc) {
                Ok(id) => id,
                Err(e) => {
                    let _ = transaction.rollback().await;
                    return Err(TransactionError::Store(e));
                }
            };
            client
                .fluent()
                .update()
                .in_col(collection)
                .document_id(id)
                .object(doc)
                .add_to_transaction(&mut transaction)?;
        }

        transaction.commit().await?;
        Ok(outcome)
    }
}

/// Failure of one update transaction attempt.
#[derive(Debug, thiserror::Error)]
enum TransactionError {
    #[error(transparent)]
    Firestore(#[from] firestore::errors::FirestoreError),

    #[error(transparent)]
    Store(StoreError),
}

fn is_contention(error: &TransactionError) -> bool {
    match error {
        TransactionError::Firestore(firestore::errors::FirestoreError::DatabaseError(e)) => {
            e.retry_possible
        }
        TransactionError::Firestore(firestore::errors::FirestoreError::DataConflictError(_)) => {
            true
        }
        _ => false,
    }
}

fn store_error<E>(error: E) -> StoreError
where
    E: Into<TransactionError>,
{
    match error.into() {
        TransactionError::Store(e) => e,
        TransactionError::Firestore(e) => StoreError::Unavailable(e.to_string()),
    }
}

impl From<StoreError> for TransactionError {
    fn from(e: StoreError) -> Self {
        TransactionError::Store(e)
    }
}

fn doc_id(doc: &Value) -> Result<&str, StoreError> {
    doc.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document without id".to_string()))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(store_error)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.matching(collection, filter).await?.into_iter().next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let docs = self.matching(collection, filter).await?;
        Ok(options.apply(docs))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.matching(collection, filter).await?.len() as u64)
    }

    async fn insert_one(&self, collection: &str, mut doc: Value) -> Result<String, StoreError> {
        let id = ensure_id(&mut doc)?;

        let created: firestore::FirestoreResult<Value> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(&id)
            .object(&doc)
            .execute()
            .await;

        match created {
            Ok(_) => Ok(id),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                Err(StoreError::DuplicateId(id))
            }
            Err(e) => Err(store_error(e)),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.update_matching(collection, filter, updates, true).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.update_matching(collection, filter, updates, false)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut docs = self.matching(collection, filter).await?;
        docs.truncate(1);
        self.batch_delete(collection, &docs).await?;
        Ok(docs.len() as u64)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let docs = self.matching(collection, filter).await?;
        self.batch_delete(collection, &docs).await?;
        Ok(docs.len() as u64)
    }
}
