use criterion::{criterion_group, criterion_main, Criterion};
use rastro_market::db::{Filter, FindOptions, SortKey};
use rastro_market::models::{IdRef, Rating, UserBrief};
use rastro_market::services::ratings::mean;
use serde_json::{json, Value};
use std::hint::black_box;

/// Product documents shaped like the stored ones, with a growing bid list.
fn products(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let bids: Vec<Value> = (0..(i % 12))
                .map(|b| {
                    json!({
                        "id": format!("bid{}_{}", i, b),
                        "amount": 100.0 + (b * 10) as f64,
                        "timestamp": "2026-03-01T10:00:00Z",
                        "bidder": {"id": format!("user{}", b), "username": format!("user{}", b)}
                    })
                })
                .collect();
            json!({
                "id": format!("product{}", i),
                "title": format!("Vintage item number {}", i),
                "initial_price": 50.0 + (i % 40) as f64,
                "close_date": format!("2026-04-{:02}T12:00:00Z", 1 + i % 28),
                "owner": {"id": format!("owner{}", i % 50), "username": format!("seller{}", i % 50)},
                "bids": bids,
            })
        })
        .collect()
}

fn benchmark_filters(c: &mut Criterion) {
    let docs = products(2_000);
    let march_15 = chrono::DateTime::parse_from_rfc3339("2026-03-15T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let claim = Filter::and([
        Filter::id("product1500"),
        Filter::lt("initial_price", 180.0),
        Filter::not(Filter::elem_match("bids", Filter::gte("amount", 180.0))),
        Filter::at_or_after("close_date", march_15),
    ]);
    let price_range = Filter::or([
        Filter::and([
            Filter::array_empty("bids"),
            Filter::gte("initial_price", 60.0),
            Filter::lte("initial_price", 80.0),
        ]),
        Filter::elem_match(
            "bids",
            Filter::and([Filter::gte("amount", 60.0), Filter::lte("amount", 80.0)]),
        ),
    ]);
    let text = Filter::and([
        Filter::contains_text("title", "ITEM NUMBER 1"),
        Filter::contains_text("owner.username", "seller4"),
    ]);

    let mut group = c.benchmark_group("filter_matches");

    group.bench_function("bid_claim_condition", |b| {
        b.iter(|| docs.iter().filter(|d| black_box(&claim).matches(d)).count())
    });

    group.bench_function("price_range", |b| {
        b.iter(|| docs.iter().filter(|d| black_box(&price_range).matches(d)).count())
    });

    group.bench_function("text_search", |b| {
        b.iter(|| docs.iter().filter(|d| black_box(&text).matches(d)).count())
    });

    group.finish();

    let options = FindOptions::sorted(vec![SortKey::desc("close_date").as_instants(), SortKey::asc("title")])
        .skip(40)
        .limit(20);
    c.bench_function("sort_and_page", |b| {
        b.iter(|| options.apply(black_box(docs.clone())))
    });
}

fn benchmark_rating_mean(c: &mut Criterion) {
    let ratings: Vec<Rating> = (0..500)
        .map(|i| Rating {
            value: 1.0 + (i % 5) as f64,
            product: IdRef {
                id: format!("product{}", i),
            },
            timestamp: chrono::Utc::now(),
            user: UserBrief {
                id: format!("user{}", i),
                username: format!("user{}", i),
            },
        })
        .collect();

    c.bench_function("rating_mean", |b| b.iter(|| mean(black_box(&ratings))));
}

criterion_group!(benches, benchmark_filters, benchmark_rating_mean);
criterion_main!(benches);
