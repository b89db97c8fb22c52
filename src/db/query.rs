// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Field-path filter, update and sort descriptors.
//!
//! Documents are `serde_json::Value` objects. Paths are dotted
//! (`owner.username`) and resolve through nested objects only; embedded
//! arrays are addressed with [`Filter::ElemMatch`] and the array variants of
//! [`Update`]. Element filters are evaluated relative to the element.
//!
//! Strings compare byte for byte. Timestamp fields are compared as instants
//! only through [`Filter::Before`], [`Filter::AtOrAfter`] and
//! [`SortKey::as_instants`].

use super::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A predicate over a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// RFC 3339 field strictly earlier than the instant. Missing or
    /// unparsable fields never match.
    Before(String, DateTime<Utc>),
    /// RFC 3339 field at or later than the instant.
    AtOrAfter(String, DateTime<Utc>),
    /// Case-insensitive substring match on a string field.
    ContainsText(String, String),
    /// Field is absent or null.
    IsNull(String),
    /// Field is absent, null or an empty array.
    ArrayEmpty(String),
    /// Some element of the array at the path matches the inner filter.
    ElemMatch(String, Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Eq("id".to_string(), Value::String(id.into()))
    }

    /// Matches any of the given ids. An empty list matches nothing.
    pub fn any_id<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Or(ids.into_iter().map(Filter::id).collect())
    }

    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn ne(path: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(path.to_string(), value.into())
    }

    pub fn gt(path: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(path.to_string(), value.into())
    }

    pub fn gte(path: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(path.to_string(), value.into())
    }

    pub fn lt(path: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(path.to_string(), value.into())
    }

    pub fn lte(path: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(path.to_string(), value.into())
    }

    pub fn before(path: &str, instant: DateTime<Utc>) -> Self {
        Filter::Before(path.to_string(), instant)
    }

    pub fn at_or_after(path: &str, instant: DateTime<Utc>) -> Self {
        Filter::AtOrAfter(path.to_string(), instant)
    }

    pub fn contains_text(path: &str, needle: &str) -> Self {
        Filter::ContainsText(path.to_string(), needle.to_string())
    }

    pub fn is_null(path: &str) -> Self {
        Filter::IsNull(path.to_string())
    }

    pub fn array_empty(path: &str) -> Self {
        Filter::ArrayEmpty(path.to_string())
    }

    pub fn elem_match(path: &str, inner: Filter) -> Self {
        Filter::ElemMatch(path.to_string(), Box::new(inner))
    }

    /// Conjunction; flattens to the single clause when only one is given.
    pub fn and(clauses: impl IntoIterator<Item = Filter>) -> Self {
        let mut clauses: Vec<Filter> = clauses
            .into_iter()
            .filter(|c| !matches!(c, Filter::All))
            .collect();
        match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        }
    }

    pub fn or(clauses: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(clauses.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    /// Evaluate the filter against a document (or an array element).
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, v) => lookup(doc, path).is_some_and(|f| values_equal(f, v)),
            Filter::Ne(path, v) => !lookup(doc, path).is_some_and(|f| values_equal(f, v)),
            Filter::Gt(path, v) => compare_at(doc, path, v) == Some(Ordering::Greater),
            Filter::Gte(path, v) => matches!(
                compare_at(doc, path, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(path, v) => compare_at(doc, path, v) == Some(Ordering::Less),
            Filter::Lte(path, v) => matches!(
                compare_at(doc, path, v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::Before(path, instant) => instant_at(doc, path).is_some_and(|t| t < *instant),
            Filter::AtOrAfter(path, instant) => {
                instant_at(doc, path).is_some_and(|t| t >= *instant)
            }
            Filter::ContainsText(path, needle) => lookup(doc, path)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Filter::IsNull(path) => lookup(doc, path).is_none_or(Value::is_null),
            Filter::ArrayEmpty(path) => match lookup(doc, path) {
                None | Some(Value::Null) => true,
                Some(Value::Array(items)) => items.is_empty(),
                Some(_) => false,
            },
            Filter::ElemMatch(path, inner) => match lookup(doc, path) {
                Some(Value::Array(items)) => items.iter().any(|item| inner.matches(item)),
                _ => false,
            },
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }

    /// The document id this filter pins, if it is an id lookup
    /// (possibly conjoined with further conditions).
    pub fn id_equality(&self) -> Option<&str> {
        match self {
            Filter::Eq(path, Value::String(id)) if path == "id" => Some(id),
            Filter::And(clauses) => clauses.iter().find_map(Filter::id_equality),
            _ => None,
        }
    }

    /// Top-level string equalities that a backend can push down as an
    /// index query. The full filter must still be evaluated afterwards.
    pub fn string_equalities(&self) -> Vec<(&str, &str)> {
        match self {
            Filter::Eq(path, Value::String(v)) => vec![(path.as_str(), v.as_str())],
            Filter::And(clauses) => clauses
                .iter()
                .filter_map(|c| match c {
                    Filter::Eq(path, Value::String(v)) => Some((path.as_str(), v.as_str())),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A single field-path mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Set(String, Value),
    Unset(String),
    /// Append to the array at the path, creating it when absent.
    Push(String, Value),
    /// Append unless an element with the same `id` is already present.
    PushUnique(String, Value),
    /// Remove every element matching the filter. Removing nothing is fine.
    Pull(String, Filter),
    /// Set `path` on every element of `array` matching `matching`.
    SetEach {
        array: String,
        matching: Filter,
        path: String,
        value: Value,
    },
}

impl Update {
    pub fn set(path: &str, value: impl Into<Value>) -> Self {
        Update::Set(path.to_string(), value.into())
    }

    pub fn unset(path: &str) -> Self {
        Update::Unset(path.to_string())
    }

    pub fn push(path: &str, value: impl Into<Value>) -> Self {
        Update::Push(path.to_string(), value.into())
    }

    pub fn push_unique(path: &str, value: impl Into<Value>) -> Self {
        Update::PushUnique(path.to_string(), value.into())
    }

    pub fn pull(path: &str, matching: Filter) -> Self {
        Update::Pull(path.to_string(), matching)
    }

    pub fn set_each(array: &str, matching: Filter, path: &str, value: impl Into<Value>) -> Self {
        Update::SetEach {
            array: array.to_string(),
            matching,
            path: path.to_string(),
            value: value.into(),
        }
    }
}

/// Apply updates in order. Returns whether the document changed.
///
/// On error the document may be partially modified; callers apply to a copy.
pub fn apply_updates(doc: &mut Value, updates: &[Update]) -> Result<bool, StoreError> {
    let mut modified = false;
    for update in updates {
        modified |= apply_update(doc, update)?;
    }
    Ok(modified)
}

fn apply_update(doc: &mut Value, update: &Update) -> Result<bool, StoreError> {
    match update {
        Update::Set(path, value) => {
            if lookup(doc, path) == Some(value) {
                return Ok(false);
            }
            set_path(doc, path, value.clone())?;
            Ok(true)
        }
        Update::Unset(path) => Ok(unset_path(doc, path)),
        Update::Push(path, value) => {
            array_for_push(doc, path)?.push(value.clone());
            Ok(true)
        }
        Update::PushUnique(path, value) => {
            let items = array_for_push(doc, path)?;
            let id = value.get("id");
            if id.is_some() && items.iter().any(|item| item.get("id") == id) {
                return Ok(false);
            }
            items.push(value.clone());
            Ok(true)
        }
        Update::Pull(path, matching) => match existing_array_mut(doc, path)? {
            Some(items) => {
                let before = items.len();
                items.retain(|item| !matching.matches(item));
                Ok(items.len() != before)
            }
            None => Ok(false),
        },
        Update::SetEach {
            array,
            matching,
            path,
            value,
        } => {
            let Some(items) = existing_array_mut(doc, array)? else {
                return Ok(false);
            };
            let mut modified = false;
            for item in items.iter_mut().filter(|item| matching.matches(item)) {
                if lookup(item, path) != Some(value) {
                    set_path(item, path, value.clone())?;
                    modified = true;
                }
            }
            Ok(modified)
        }
    }
}

// ─── Sorting & Pagination ────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
    /// Order the field as RFC 3339 instants; missing or unparsable values
    /// sort before every instant.
    pub instants: bool,
}

impl SortKey {
    pub fn asc(path: &str) -> Self {
        Self::new(path, SortDirection::Asc)
    }

    pub fn desc(path: &str) -> Self {
        Self::new(path, SortDirection::Desc)
    }

    pub fn new(path: &str, direction: SortDirection) -> Self {
        Self {
            path: path.to_string(),
            direction,
            instants: false,
        }
    }

    pub fn as_instants(mut self) -> Self {
        self.instants = true;
        self
    }

    fn cmp_docs(&self, a: &Value, b: &Value) -> Ordering {
        let ord = if self.instants {
            instant_at(a, &self.path).cmp(&instant_at(b, &self.path))
        } else {
            sort_cmp(lookup(a, &self.path), lookup(b, &self.path))
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// Sort, skip and limit applied after filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn sorted(sort: Vec<SortKey>) -> Self {
        Self {
            sort,
            ..Default::default()
        }
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order the documents and cut the requested window.
    ///
    /// The sort is stable, so ties keep the store's natural order.
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for key in &self.sort {
                    let ord = key.cmp_docs(a, b);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        docs.into_iter().skip(skip).take(limit).collect()
    }
}

// ─── Path & Value Helpers ────────────────────────────────────

/// Resolve a dotted path through nested objects.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

/// Set a dotted path, creating intermediate objects as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return Err(StoreError::InvalidUpdate {
                path: path.to_string(),
                reason: format!("`{}` is not an object", segment),
            });
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    Err(StoreError::InvalidUpdate {
        path: path.to_string(),
        reason: "empty path".to_string(),
    })
}

fn unset_path(doc: &mut Value, path: &str) -> bool {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (lookup_mut(doc, parent), leaf),
        None => (Some(doc), path),
    };
    parent
        .and_then(Value::as_object_mut)
        .is_some_and(|map| map.remove(leaf).is_some())
}

fn lookup_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.get_mut(segment))
}

/// The array at `path`, or `None` when the field is absent or null.
pub fn existing_array_mut<'a>(
    doc: &'a mut Value,
    path: &str,
) -> Result<Option<&'a mut Vec<Value>>, StoreError> {
    match lookup_mut(doc, path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(StoreError::InvalidUpdate {
            path: path.to_string(),
            reason: "not an array".to_string(),
        }),
    }
}

fn array_for_push<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>, StoreError> {
    if existing_array_mut(doc, path)?.is_none() {
        set_path(doc, path, Value::Array(Vec::new()))?;
    }
    existing_array_mut(doc, path)?.ok_or_else(|| StoreError::InvalidUpdate {
        path: path.to_string(),
        reason: "not an array".to_string(),
    })
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn instant_at(doc: &Value, path: &str) -> Option<DateTime<Utc>> {
    lookup(doc, path).and_then(Value::as_str).and_then(parse_instant)
}

/// Equality with numbers compared by value; everything else is exact.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two values of comparable type; `None` otherwise.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_at(doc: &Value, path: &str, value: &Value) -> Option<Ordering> {
    lookup(doc, path).and_then(|field| compare(field, value))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Bool(_)) => 3,
        Some(_) => 4,
    }
}

/// Total order used for sorting: missing/null first, then by type rank.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            compare(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
