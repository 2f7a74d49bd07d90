// crates/dataroute-core/src/interfaces/mod.rs
// ============================================================================
// Module: DataRoute Interfaces
// Description: Seam traits for expression evaluation, selection, and metrics.
// Purpose: Define the contract surfaces the routing engine is polymorphic
//          over.
// Dependencies: crate::core, dashmap, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces keep the engine independent of concrete collaborators: the
//! expression engine is injected behind [`ConditionEvaluator`], external
//! routing participants behind [`DataSourceSelector`], and diagnostics behind
//! [`RouterMetrics`]. Implementations must be deterministic and side-effect
//! free with respect to the routing decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::RoutingContext;

// ============================================================================
// SECTION: Expression Errors
// ============================================================================

/// Errors raised by expression evaluation.
///
/// # Invariants
/// - `InvalidArgument` and `TypeMismatch` are fatal to the evaluator call.
/// - `Evaluation` is recoverable for pipeline callers (rule skipped) but
///   surfaced as a typed error to direct callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// Expression source or context argument was empty or absent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Expression result type did not match the expected type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected result type label.
        expected: &'static str,
        /// Actual result type label.
        actual: &'static str,
    },
    /// Any other evaluation failure, wrapping the underlying cause.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

// ============================================================================
// SECTION: Condition Evaluator
// ============================================================================

/// Result type an expression is converted to on evaluation.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    /// Convert the result to a string.
    Text,
    /// Convert the result to a signed integer.
    Integer,
    /// Require a boolean result.
    Boolean,
}

impl ExpectedKind {
    /// Returns a stable label for the expected kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// Injected expression engine evaluated against a routing context.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluates a boolean condition.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] for empty source,
    /// [`ExprError::TypeMismatch`] when the result is not boolean, and
    /// [`ExprError::Evaluation`] for any other failure.
    fn evaluate_condition(&self, expr: &str, ctx: &RoutingContext) -> Result<bool, ExprError>;

    /// Evaluates an expression and converts the result to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidArgument`] for empty source and
    /// [`ExprError::Evaluation`] when evaluation or conversion fails.
    fn evaluate_expression(
        &self,
        expr: &str,
        ctx: &RoutingContext,
        expected: ExpectedKind,
    ) -> Result<Value, ExprError>;
}

// ============================================================================
// SECTION: Pluggable Selectors
// ============================================================================

/// External routing participant consulted after the built-in strategies.
///
/// Selectors are tried in registration order; the first that supports the
/// context and returns a non-empty data source wins.
pub trait DataSourceSelector: Send + Sync {
    /// Returns a stable selector name for diagnostics.
    fn name(&self) -> &str;

    /// Returns whether this selector applies to the context.
    fn supports(&self, ctx: &RoutingContext) -> bool;

    /// Returns the selected data source, or `None` to pass.
    fn select(&self, ctx: &RoutingContext) -> Option<String>;
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Metrics sink the engine reports decisions to.
pub trait RouterMetrics: Send + Sync {
    /// Records one routing request.
    fn record_request(&self);
    /// Records a decision-cache hit.
    fn record_cache_hit(&self);
    /// Records a decision-cache miss.
    fn record_cache_miss(&self);
    /// Records the decided data source and table.
    fn record_decision(&self, data_source: &str, table: &str);
    /// Records a custom-rule hit.
    fn record_rule_hit(&self, rule: &str);
    /// Records a recovered routing error for the named stage.
    fn record_error(&self, stage: &str);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl RouterMetrics for NoopMetrics {
    fn record_request(&self) {}

    fn record_cache_hit(&self) {}

    fn record_cache_miss(&self) {}

    fn record_decision(&self, _data_source: &str, _table: &str) {}

    fn record_rule_hit(&self, _rule: &str) {}

    fn record_error(&self, _stage: &str) {}
}

/// Point-in-time snapshot of collected routing metrics.
///
/// # Invariants
/// - Maps are sorted for stable serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total routing requests.
    pub total_requests: u64,
    /// Decision-cache hits.
    pub cache_hits: u64,
    /// Decision-cache misses.
    pub cache_misses: u64,
    /// Recovered routing errors by stage.
    pub errors: BTreeMap<String, u64>,
    /// Decisions per data source.
    pub data_source_usage: BTreeMap<String, u64>,
    /// Decisions per table.
    pub table_usage: BTreeMap<String, u64>,
    /// Hits per custom rule.
    pub rule_hits: BTreeMap<String, u64>,
}

/// In-memory metrics collector with atomic counters.
///
/// # Invariants
/// - Counter updates are individually atomic; snapshots are best-effort
///   consistent under concurrent updates.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    /// Total routing requests.
    total_requests: AtomicU64,
    /// Decision-cache hits.
    cache_hits: AtomicU64,
    /// Decision-cache misses.
    cache_misses: AtomicU64,
    /// Recovered routing errors by stage.
    errors: DashMap<String, u64>,
    /// Decisions per data source.
    data_source_usage: DashMap<String, u64>,
    /// Decisions per table.
    table_usage: DashMap<String, u64>,
    /// Hits per custom rule.
    rule_hits: DashMap<String, u64>,
}

impl InMemoryMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            errors: collect(&self.errors),
            data_source_usage: collect(&self.data_source_usage),
            table_usage: collect(&self.table_usage),
            rule_hits: collect(&self.rule_hits),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.errors.clear();
        self.data_source_usage.clear();
        self.table_usage.clear();
        self.rule_hits.clear();
    }
}

/// Copies a concurrent tally map into a sorted snapshot map.
fn collect(map: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|entry| (entry.key().clone(), *entry.value())).collect()
}

/// Increments a per-key tally.
fn bump(map: &DashMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

impl RouterMetrics for InMemoryMetrics {
    fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_decision(&self, data_source: &str, table: &str) {
        bump(&self.data_source_usage, data_source);
        bump(&self.table_usage, table);
    }

    fn record_rule_hit(&self, rule: &str) {
        bump(&self.rule_hits, rule);
    }

    fn record_error(&self, stage: &str) {
        bump(&self.errors, stage);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset_round_trip() {
        let metrics = InMemoryMetrics::new();
        metrics.record_request();
        metrics.record_cache_miss();
        metrics.record_decision("primary", "user");
        metrics.record_decision("primary", "order");
        metrics.record_rule_hit("vip");
        metrics.record_error("sharding");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.data_source_usage.get("primary"), Some(&2));
        assert_eq!(snapshot.table_usage.get("order"), Some(&1));
        assert_eq!(snapshot.rule_hits.get("vip"), Some(&1));
        assert_eq!(snapshot.errors.get("sharding"), Some(&1));

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
