// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Results of multi-collection writes.
//!
//! The source-of-truth write either fails the whole operation or commits.
//! Mirror writes after it never roll it back; a failed mirror step is
//! logged, queued for repair and returned alongside the committed value.

use crate::db::StoreError;
use crate::error::{MarketError, MarketResult};
use crate::services::reconcile::RepairLog;
use serde::Serialize;
use std::future::Future;

/// The entity whose mirrors need recomputing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RepairTarget {
    Product(String),
    User(String),
    Bid(String),
}

/// A mirror step that failed after the primary write committed.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorFailure {
    pub target: RepairTarget,
    pub collection: &'static str,
    pub step: &'static str,
    pub error: String,
}

/// A committed value plus any mirror steps that did not land.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub stale: Vec<MirrorFailure>,
}

impl<T> Outcome<T> {
    pub fn consistent(value: T) -> Self {
        Self {
            value,
            stale: Vec::new(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.stale.is_empty()
    }

    /// Turn recorded mirror failures into a `PartialWriteFailure`.
    pub fn into_strict(self) -> MarketResult<T> {
        if self.stale.is_empty() {
            Ok(self.value)
        } else {
            Err(MarketError::PartialWriteFailure {
                source_written: true,
                failures: self.stale,
            })
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            stale: self.stale,
        }
    }
}

/// Runs mirror steps, collecting failures instead of propagating them.
pub(crate) struct MirrorSteps<'a> {
    repairs: &'a RepairLog,
    failures: Vec<MirrorFailure>,
}

impl<'a> MirrorSteps<'a> {
    pub(crate) fn new(repairs: &'a RepairLog) -> Self {
        Self {
            repairs,
            failures: Vec::new(),
        }
    }

    /// Await one mirror step. Failures are logged and queued for repair.
    pub(crate) async fn run<R>(
        &mut self,
        target: &RepairTarget,
        collection: &'static str,
        step: &'static str,
        write: impl Future<Output = Result<R, StoreError>>,
    ) -> Option<R> {
        match write.await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    target_entity = ?target,
                    collection,
                    step,
                    error = %e,
                    "Mirror write failed; queued for repair"
                );
                self.repairs.record(target.clone());
                self.failures.push(MirrorFailure {
                    target: target.clone(),
                    collection,
                    step,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    pub(crate) fn finish<T>(self, value: T) -> Outcome<T> {
        Outcome {
            value,
            stale: self.failures,
        }
    }
}
