// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashSet;
use futures_util::future::BoxFuture;
use rastro_market::config::Config;
use rastro_market::db::{
    DocumentStore, Filter, FindOptions, FirestoreStore, MemoryStore, StoreError, Update,
    UpdateOutcome,
};
use rastro_market::middleware::auth::Claims;
use rastro_market::models::{Location, NewProduct, NewUser, Product, User};
use rastro_market::routes::create_router;
use rastro_market::services::{Clock, JwtVerifier, MarketEngine};
use rastro_market::AppState;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreStore {
    FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Wall clock that tests can push forward.
#[derive(Clone, Default)]
pub struct TestClock {
    offset_secs: Arc<AtomicI64>,
}

#[allow(dead_code)]
impl TestClock {
    pub fn clock(&self) -> Clock {
        let offset = self.offset_secs.clone();
        Arc::new(move || Utc::now() + Duration::seconds(offset.load(Ordering::SeqCst)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock())()
    }

    pub fn advance_days(&self, days: i64) {
        self.advance_secs(days * 24 * 60 * 60);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

/// Engine over a fresh in-memory store.
#[allow(dead_code)]
pub fn test_engine() -> (MarketEngine, MemoryStore, TestClock) {
    let store = MemoryStore::new();
    let clock = TestClock::default();
    let engine = engine_over(Arc::new(store.clone()), &clock);
    (engine, store, clock)
}

/// Engine over a store whose updates can be made to fail.
#[allow(dead_code)]
pub fn flaky_engine() -> (MarketEngine, Arc<FlakyStore>, TestClock) {
    let store = Arc::new(FlakyStore::default());
    let clock = TestClock::default();
    let engine = engine_over(store.clone(), &clock);
    (engine, store, clock)
}

/// Engine over a store that can interleave other work with its reads.
#[allow(dead_code)]
pub fn hooked_engine() -> (MarketEngine, Arc<HookStore>, TestClock) {
    let store = Arc::new(HookStore::default());
    let clock = TestClock::default();
    let engine = engine_over(store.clone(), &clock);
    (engine, store, clock)
}

fn engine_over(store: Arc<dyn DocumentStore>, clock: &TestClock) -> MarketEngine {
    let config = Config::default();
    MarketEngine::new(store, config.policy.clone(), config.admin_ids.clone())
        .with_clock(clock.clock())
}

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(Arc::new(MemoryStore::new()))
}

#[allow(dead_code)]
pub fn create_test_app_with(store: Arc<dyn DocumentStore>) -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let verifier = Arc::new(JwtVerifier::new(&config.jwt_signing_key));
    let engine = MarketEngine::new(store, config.policy.clone(), config.admin_ids.clone());

    let state = Arc::new(AppState {
        config,
        engine,
        verifier,
    });

    (create_router(state.clone()), state)
}

/// Sign an HS256 session token for `user_id`, valid for 30 days.
#[allow(dead_code)]
pub fn create_jwt(user_id: &str, signing_key: &[u8]) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 30 * 24 * 60 * 60,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(signing_key),
    )
    .expect("Failed to sign test JWT")
}

/// Bearer token for `user_id`, signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str) -> String {
    create_jwt(user_id, &Config::default().jwt_signing_key)
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

#[allow(dead_code)]
pub async fn seed_user(engine: &MarketEngine, username: &str) -> User {
    engine
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            location: Location {
                lat: 40.4168,
                lon: -3.7038,
            },
        })
        .await
        .expect("Failed to seed user")
}

/// A listing closing in six days.
#[allow(dead_code)]
pub async fn seed_product(engine: &MarketEngine, owner_id: &str, title: &str, price: f64) -> Product {
    engine
        .create_product(
            owner_id,
            NewProduct {
                title: title.to_string(),
                description: format!("{} in good condition", title),
                initial_price: price,
                close_date: engine.now() + Duration::days(6),
                weight: 1.5,
            },
        )
        .await
        .expect("Failed to seed product")
        .value
}

/// Memory store that fails updates on selected collections.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: DashSet<String>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn fail_updates(&self, collection: &str) {
        self.failing.insert(collection.to_string());
    }

    pub fn heal(&self) {
        self.failing.clear();
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        if self.failing.contains(collection) {
            Err(StoreError::Unavailable(format!(
                "injected failure on {}",
                collection
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        self.inner.find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        self.inner.insert_one(collection, doc).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.check(collection)?;
        self.inner.update_one(collection, filter, updates).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.check(collection)?;
        self.inner.update_many(collection, filter, updates).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.delete_many(collection, filter).await
    }
}

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Memory store that can run a hook between a read and its caller, or
/// yield after point reads so concurrent tasks interleave.
#[derive(Default)]
pub struct HookStore {
    inner: MemoryStore,
    after_find: Mutex<Option<(String, Hook)>>,
    yield_after_find_one: AtomicBool,
}

#[allow(dead_code)]
impl HookStore {
    /// Run `hook` once, after the next `find` on `collection` has read.
    pub fn after_next_find<F, Fut>(&self, collection: &str, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Box::new(move || -> BoxFuture<'static, ()> { Box::pin(hook()) });
        *self.after_find.lock().unwrap() = Some((collection.to_string(), hook));
    }

    pub fn yield_after_find_one(&self) {
        self.yield_after_find_one.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn take_hook(&self, collection: &str) -> Option<Hook> {
        let mut slot = self.after_find.lock().unwrap();
        match slot.as_ref() {
            Some((target, _)) if target == collection => slot.take().map(|(_, hook)| hook),
            _ => None,
        }
    }
}

#[async_trait]
impl DocumentStore for HookStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>, StoreError> {
        let found = self.inner.find_one(collection, filter).await;
        if self.yield_after_find_one.load(Ordering::SeqCst) {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }
        found
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let docs = self.inner.find(collection, filter, options).await;
        if let Some(hook) = self.take_hook(collection) {
            hook().await;
        }
        docs
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        self.inner.insert_one(collection, doc).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.inner.update_one(collection, filter, updates).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        updates: &[Update],
    ) -> Result<UpdateOutcome, StoreError> {
        self.inner.update_many(collection, filter, updates).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.delete_many(collection, filter).await
    }
}
