// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Product write protocol tests: listing window, edits, cascade delete
//! and resolution.

use chrono::Duration;
use rastro_market::db::collections;
use rastro_market::db::{fetch, Filter};
use rastro_market::error::{ConflictReason, MarketError, ProductError, ValidationFailure};
use rastro_market::models::{Bid, NewProduct, Product, ProductPatch, User};
use rastro_market::services::ProductQuery;

mod common;
use common::{seed_product, seed_user, test_engine};

fn product_error(err: &MarketError) -> Option<&ProductError> {
    match err {
        MarketError::ValidationFailed(ValidationFailure::Product(e)) => Some(e),
        _ => None,
    }
}

fn listing(title: &str, close_in_days: i64, engine: &rastro_market::services::MarketEngine) -> NewProduct {
    NewProduct {
        title: title.to_string(),
        description: String::new(),
        initial_price: 10.0,
        close_date: engine.now() + Duration::days(close_in_days),
        weight: 1.0,
    }
}

#[tokio::test]
async fn test_listing_window() {
    let (engine, _store, _clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;

    let err = engine
        .create_product(&owner.id, listing("Past", -1, &engine))
        .await
        .unwrap_err();
    assert_eq!(product_error(&err), Some(&ProductError::CloseDateInPast));

    let err = engine
        .create_product(&owner.id, listing("Soon", 2, &engine))
        .await
        .unwrap_err();
    assert!(matches!(
        product_error(&err),
        Some(ProductError::CloseDateTooSoon { min_days: 5 })
    ));

    let created = engine
        .create_product(&owner.id, listing("Fine", 6, &engine))
        .await
        .unwrap();
    assert!(created.is_consistent());
    assert_eq!(created.value.current_price, 10.0);

    let stored_owner = engine.get_user(&owner.id).await.unwrap();
    assert_eq!(stored_owner.products.len(), 1);
    assert_eq!(stored_owner.products[0].id, created.value.id);
    assert_eq!(stored_owner.products[0].title, "Fine");
}

#[tokio::test]
async fn test_listing_requires_existing_owner() {
    let (engine, _store, _clock) = test_engine();
    let err = engine
        .create_product("ghost", listing("Orphan", 6, &engine))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotFound { entity: "user", .. }));
}

#[tokio::test]
async fn test_title_change_reaches_every_copy() {
    let (engine, store, _clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;
    let bidder = seed_user(&engine, "bidder").await;
    let product = seed_product(&engine, &owner.id, "Old title", 10.0).await;

    engine.submit_bid(&product.id, &bidder.id, 20.0).await.unwrap();
    engine.submit_bid(&product.id, &bidder.id, 30.0).await.unwrap();

    let updated = engine
        .update_product(
            &owner.id,
            &product.id,
            ProductPatch {
                title: Some("New title".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_consistent());

    let stored_owner: User = fetch(&store, collections::USERS, &owner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_owner.products[0].title, "New title");

    // Both of the bidder's entries follow, not just the first one.
    let stored_bidder: User = fetch(&store, collections::USERS, &bidder.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_bidder.bids.len(), 2);
    assert!(stored_bidder
        .bids
        .iter()
        .all(|b| b.product.title == "New title"));

    for doc in store.snapshot(collections::BIDS) {
        assert_eq!(doc["product"]["title"], "New title");
    }
}

#[tokio::test]
async fn test_edit_rules() {
    let (engine, _store, clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;
    let bidder = seed_user(&engine, "bidder").await;
    let product = seed_product(&engine, &owner.id, "Table", 10.0).await;

    let err = engine
        .update_product(&bidder.id, &product.id, ProductPatch {
            weight: Some(2.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(_)));

    let err = engine
        .update_product(&owner.id, &product.id, ProductPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::ValidationFailed(ValidationFailure::Input(_))
    ));

    let repriced = engine
        .update_product(&owner.id, &product.id, ProductPatch {
            initial_price: Some(15.0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(repriced.value.current_price, 15.0);

    engine.submit_bid(&product.id, &bidder.id, 20.0).await.unwrap();
    let err = engine
        .update_product(&owner.id, &product.id, ProductPatch {
            initial_price: Some(5.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(product_error(&err), Some(&ProductError::PriceLocked));

    clock.advance_days(7);
    let err = engine
        .update_product(&owner.id, &product.id, ProductPatch {
            description: Some("late".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(product_error(&err), Some(&ProductError::ClosedForEdits));
}

#[tokio::test]
async fn test_delete_cascades() {
    let (engine, store, _clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;
    let x = seed_user(&engine, "x").await;
    let y = seed_user(&engine, "y").await;
    let doomed = seed_product(&engine, &owner.id, "Doomed", 10.0).await;
    let kept = seed_product(&engine, &owner.id, "Kept", 10.0).await;

    engine.submit_bid(&doomed.id, &x.id, 20.0).await.unwrap();
    engine.submit_bid(&doomed.id, &y.id, 30.0).await.unwrap();
    engine.submit_bid(&kept.id, &x.id, 40.0).await.unwrap();

    let err = engine.delete_product(&x.id, &doomed.id).await.unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(_)));

    let outcome = engine.delete_product(&owner.id, &doomed.id).await.unwrap();
    assert!(outcome.is_consistent());

    let referencing = Filter::eq("product.id", doomed.id.as_str());
    assert!(store
        .snapshot(collections::BIDS)
        .iter()
        .all(|doc| !referencing.matches(doc)));
    assert_eq!(store.snapshot(collections::BIDS).len(), 1);

    for user in store.snapshot(collections::USERS) {
        let user: User = serde_json::from_value(user).unwrap();
        assert!(user.products.iter().all(|p| p.id != doomed.id));
        assert!(user.bids.iter().all(|b| b.product.id != doomed.id));
    }

    let stored_x: User = fetch(&store, collections::USERS, &x.id).await.unwrap().unwrap();
    assert_eq!(stored_x.bids.len(), 1);
    assert_eq!(stored_x.bids[0].product.id, kept.id);

    let err = engine.get_product(&doomed.id).await.unwrap_err();
    assert!(matches!(err, MarketError::NotFound { .. }));
}

#[tokio::test]
async fn test_resolution_rules() {
    let (engine, store, clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;
    let low = seed_user(&engine, "low").await;
    let high = seed_user(&engine, "high").await;
    let product = seed_product(&engine, &owner.id, "Piano", 500.0).await;

    engine.submit_bid(&product.id, &low.id, 600.0).await.unwrap();
    engine.submit_bid(&product.id, &high.id, 700.0).await.unwrap();

    let err = engine
        .resolve_product(&owner.id, &product.id, &high.id)
        .await
        .unwrap_err();
    assert_eq!(product_error(&err), Some(&ProductError::NotClosedYet));

    clock.advance_days(7);
    let err = engine
        .resolve_product(&owner.id, &product.id, &low.id)
        .await
        .unwrap_err();
    assert_eq!(product_error(&err), Some(&ProductError::BuyerMismatch));

    let err = engine
        .resolve_product(&low.id, &product.id, &high.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(_)));

    let resolved = engine
        .resolve_product(&high.id, &product.id, &high.id)
        .await
        .unwrap();
    assert_eq!(resolved.value.buyer.as_ref().unwrap().id, high.id);

    // Same buyer again is a no-op; a different one conflicts.
    let again = engine
        .resolve_product(&owner.id, &product.id, &high.id)
        .await
        .unwrap();
    assert_eq!(again.value.buyer.unwrap().id, high.id);
    let err = engine
        .resolve_product(&owner.id, &product.id, &low.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::Conflict(ConflictReason::AlreadyResolved)
    ));

    let stored_owner: User = fetch(&store, collections::USERS, &owner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored_owner.products[0].buyer.as_ref().map(|b| b.id.as_str()),
        Some(high.id.as_str())
    );
    assert_eq!(engine.sold_count(&owner.id).await.unwrap(), 1);

    let split = engine.bidder_products(&high.id).await.unwrap();
    assert_eq!(split.won.len(), 1);
    let split = engine.bidder_products(&low.id).await.unwrap();
    assert_eq!(split.lost.len(), 1);
}

#[tokio::test]
async fn test_buyers_lists_each_buyer_once_in_sale_order() {
    let (engine, _store, clock) = test_engine();
    let owner = seed_user(&engine, "owner").await;
    let ana = seed_user(&engine, "ana").await;
    let bea = seed_user(&engine, "bea").await;

    let mut sales = Vec::new();
    for (title, days, buyer) in [("Kettle", 5, &ana), ("Rug", 6, &bea), ("Mirror", 7, &ana)] {
        let product = engine
            .create_product(&owner.id, listing(title, days, &engine))
            .await
            .unwrap()
            .value;
        engine.submit_bid(&product.id, &buyer.id, 20.0).await.unwrap();
        sales.push((product, buyer));
    }
    engine
        .create_product(&owner.id, listing("Unsold", 6, &engine))
        .await
        .unwrap();
    assert!(engine.buyers(&owner.id).await.unwrap().is_empty());

    clock.advance_days(8);
    for (product, buyer) in &sales {
        engine
            .resolve_product(&owner.id, &product.id, &buyer.id)
            .await
            .unwrap();
    }

    let buyers = engine.buyers(&owner.id).await.unwrap();
    let names: Vec<&str> = buyers.iter().map(|b| b.username.as_str()).collect();
    assert_eq!(names, vec!["ana", "bea"]);
    assert_eq!(buyers[0].id, ana.id);
    assert_eq!(engine.sold_count(&owner.id).await.unwrap(), 3);
    assert!(engine.buyers(&ana.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_product_listing_queries() {
    let (engine, _store, _clock) = test_engine();
    let alice = seed_user(&engine, "alice").await;
    let bob = seed_user(&engine, "bob").await;
    let lamp = seed_product(&engine, &alice.id, "Brass lamp", 10.0).await;
    let sofa = seed_product(&engine, &alice.id, "Sofa", 100.0).await;
    let bike = seed_product(&engine, &bob.id, "Bike", 50.0).await;

    // The lamp's price is now its bid.
    engine.submit_bid(&lamp.id, &bob.id, 80.0).await.unwrap();

    let page = engine
        .list_products(&ProductQuery {
            min_price: Some(60.0),
            max_price: Some(120.0),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut ids: Vec<&str> = page.items.iter().map(|p| p.id.as_str()).collect();
    ids.sort();
    let mut expected = vec![lamp.id.as_str(), sofa.id.as_str()];
    expected.sort();
    assert_eq!(ids, expected);

    let by_owner = engine
        .list_products(&ProductQuery {
            owner: Some("ALI".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_owner.total, 2);

    let err = engine
        .list_products(&ProductQuery {
            min_price: Some(100.0),
            max_price: Some(10.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationFailed(ValidationFailure::Query(_))));

    let related = engine.related_products(&lamp.id).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].id, sofa.id);

    let owned = engine.owner_products(&bob.id).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, bike.id);

    let open = engine.bidder_products(&bob.id).await.unwrap();
    assert_eq!(open.open.len(), 1);
    assert!(open.won.is_empty());

    let stored: Product = engine.get_product(&lamp.id).await.unwrap();
    let bid: Bid = engine.get_bid(&stored.bids[0].id).await.unwrap();
    assert_eq!(bid.product.title, "Brass lamp");
}
