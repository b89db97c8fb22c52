// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query/projection helpers for list endpoints.
//!
//! Optional request parameters become a store [`Filter`] plus sort and
//! pagination. Text parameters are case-insensitive substring matches.

use crate::config::MarketPolicy;
use crate::db::{Filter, FindOptions, SortDirection, SortKey};
use crate::error::QueryError;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A fully-built store query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub options: FindOptions,
    pub page: u32,
    pub page_size: u32,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total: u64,
}

/// Resolve 1-based page parameters, clamping the size to the policy maximum.
pub fn paginate(
    page: Option<u32>,
    page_size: Option<u32>,
    policy: &MarketPolicy,
) -> Result<(u32, u32), QueryError> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(policy.default_page_size);
    if page == 0 || page_size == 0 {
        return Err(QueryError::InvalidPage);
    }
    Ok((page, page_size.min(policy.max_page_size)))
}

fn window(sort: Vec<SortKey>, page: u32, page_size: u32) -> FindOptions {
    FindOptions::sorted(sort)
        .skip(u64::from(page - 1) * u64::from(page_size))
        .limit(u64::from(page_size))
}

/// `min <= path <= max` for whichever bounds are present.
fn range(
    path: &str,
    min: Option<f64>,
    max: Option<f64>,
    field: &'static str,
) -> Result<Filter, QueryError> {
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(QueryError::InvertedRange { field });
        }
    }
    Ok(Filter::and(
        min.map(|lo| Filter::gte(path, lo))
            .into_iter()
            .chain(max.map(|hi| Filter::lte(path, hi))),
    ))
}

fn text(path: &str, needle: &Option<String>) -> Filter {
    match needle.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => Filter::contains_text(path, n),
        _ => Filter::All,
    }
}

fn exact(path: &str, value: &Option<String>) -> Filter {
    match value {
        Some(v) => Filter::eq(path, v.as_str()),
        None => Filter::All,
    }
}

// ─── Products ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    /// Close date, then initial date.
    #[default]
    CloseDate,
    InitialDate,
    Price,
    Title,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Substring of the title
    pub title: Option<String>,
    /// Substring of the owner's username
    pub owner: Option<String>,
    pub owner_id: Option<String>,
    /// Only listings whose close date has not passed
    pub open: Option<bool>,
    pub sort: Option<ProductSort>,
    pub order: Option<SortDirection>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ProductQuery {
    pub fn to_spec(
        &self,
        policy: &MarketPolicy,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<QuerySpec, QueryError> {
        let (page, page_size) = paginate(self.page, self.page_size, policy)?;

        // Unbid listings match on their initial price, bid listings when
        // any bid amount falls in range.
        let price = if self.min_price.is_some() || self.max_price.is_some() {
            Filter::or([
                Filter::and([
                    Filter::array_empty("bids"),
                    range("initial_price", self.min_price, self.max_price, "price")?,
                ]),
                Filter::elem_match(
                    "bids",
                    range("amount", self.min_price, self.max_price, "price")?,
                ),
            ])
        } else {
            Filter::All
        };

        let open = if self.open == Some(true) {
            Filter::at_or_after("close_date", now)
        } else {
            Filter::All
        };

        let filter = Filter::and([
            price,
            text("title", &self.title),
            text("owner.username", &self.owner),
            exact("owner.id", &self.owner_id),
            open,
        ]);

        let order = self.order.unwrap_or_default();
        let sort = match self.sort.unwrap_or_default() {
            ProductSort::CloseDate => vec![
                SortKey::new("close_date", order).as_instants(),
                SortKey::new("initial_date", order).as_instants(),
            ],
            ProductSort::InitialDate => vec![SortKey::new("initial_date", order).as_instants()],
            ProductSort::Price => vec![SortKey::new("current_price", order)],
            ProductSort::Title => vec![SortKey::new("title", order)],
        };

        Ok(QuerySpec {
            filter,
            options: window(sort, page, page_size),
            page,
            page_size,
        })
    }
}

// ─── Bids ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BidQuery {
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Substring of the product title
    pub title: Option<String>,
    /// Substring of the product owner's username
    pub owner: Option<String>,
    /// Substring of the bidder's username
    pub bidder: Option<String>,
    pub product_id: Option<String>,
    pub bidder_id: Option<String>,
    /// Timestamp order
    pub order: Option<SortDirection>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl BidQuery {
    pub fn to_spec(&self, policy: &MarketPolicy) -> Result<QuerySpec, QueryError> {
        let (page, page_size) = paginate(self.page, self.page_size, policy)?;

        let filter = Filter::and([
            range("amount", self.min_amount, self.max_amount, "amount")?,
            text("product.title", &self.title),
            text("owner.username", &self.owner),
            text("bidder.username", &self.bidder),
            exact("product.id", &self.product_id),
            exact("bidder.id", &self.bidder_id),
        ]);

        let sort = vec![SortKey::new("timestamp", self.order.unwrap_or_default()).as_instants()];
        Ok(QuerySpec {
            filter,
            options: window(sort, page, page_size),
            page,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> MarketPolicy {
        MarketPolicy::default()
    }

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339("2026-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc)
    }

    #[test]
    fn test_pagination_defaults_and_clamp() {
        assert_eq!(paginate(None, None, &policy()), Ok((1, 10)));
        assert_eq!(paginate(Some(3), Some(500), &policy()), Ok((3, 20)));
        assert_eq!(paginate(Some(0), None, &policy()), Err(QueryError::InvalidPage));
        assert_eq!(paginate(None, Some(0), &policy()), Err(QueryError::InvalidPage));
    }

    #[test]
    fn test_page_window_offsets() {
        let query = BidQuery {
            page: Some(3),
            page_size: Some(7),
            ..Default::default()
        };
        let spec = query.to_spec(&policy()).unwrap();
        assert_eq!(spec.options.skip, 14);
        assert_eq!(spec.options.limit, Some(7));
    }

    #[test]
    fn test_price_range_matches_initial_price_or_any_bid() {
        let query = ProductQuery {
            min_price: Some(120.0),
            max_price: Some(180.0),
            ..Default::default()
        };
        let spec = query.to_spec(&policy(), now()).unwrap();

        let unbid_in_range = json!({ "initial_price": 150, "bids": [] });
        let unbid_out = json!({ "initial_price": 100, "bids": [] });
        let bid_in_range = json!({ "initial_price": 100, "bids": [{ "amount": 130 }] });
        let bid_out = json!({ "initial_price": 150, "bids": [{ "amount": 400 }] });

        assert!(spec.filter.matches(&unbid_in_range));
        assert!(!spec.filter.matches(&unbid_out));
        assert!(spec.filter.matches(&bid_in_range));
        // A bid listing no longer matches on its initial price.
        assert!(!spec.filter.matches(&bid_out));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let query = ProductQuery {
            min_price: Some(10.0),
            max_price: Some(5.0),
            ..Default::default()
        };
        assert_eq!(
            query.to_spec(&policy(), now()).unwrap_err(),
            QueryError::InvertedRange { field: "price" }
        );
    }

    #[test]
    fn test_text_filters_and_blank_text_ignored() {
        let query = ProductQuery {
            title: Some("LAMP".to_string()),
            owner: Some("   ".to_string()),
            ..Default::default()
        };
        let spec = query.to_spec(&policy(), now()).unwrap();
        assert_eq!(spec.filter, Filter::contains_text("title", "LAMP"));
        assert!(spec
            .filter
            .matches(&json!({ "title": "Desk lamp", "owner": { "username": "x" } })));
    }

    #[test]
    fn test_default_product_sort_is_close_then_initial_date() {
        let spec = ProductQuery::default().to_spec(&policy(), now()).unwrap();
        assert_eq!(
            spec.options.sort,
            vec![
                SortKey::asc("close_date").as_instants(),
                SortKey::asc("initial_date").as_instants()
            ]
        );
        assert_eq!(spec.filter, Filter::All);
    }

    #[test]
    fn test_bid_filters_combine() {
        let query = BidQuery {
            min_amount: Some(100.0),
            bidder: Some("bo".to_string()),
            order: Some(SortDirection::Desc),
            ..Default::default()
        };
        let spec = query.to_spec(&policy()).unwrap();
        let bid = json!({
            "amount": 150,
            "bidder": { "username": "Bob" },
            "product": { "title": "x" },
            "owner": { "username": "y" }
        });
        assert!(spec.filter.matches(&bid));
        assert_eq!(spec.options.sort, vec![SortKey::desc("timestamp").as_instants()]);
    }
}
