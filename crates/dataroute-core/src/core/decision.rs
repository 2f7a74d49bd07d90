// crates/dataroute-core/src/core/decision.rs
// ============================================================================
// Module: Routing Decision
// Description: Resolved (data source, table name) pair for one operation.
// Purpose: Carry the pipeline outcome applied around the intercepted call.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`RoutingDecision`] is produced once per call. An absent data source
//! means "leave the current default untouched"; the table name is never
//! empty. The `reason` field is diagnostic only and never drives control
//! flow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Route Errors
// ============================================================================

/// Errors raised at the routing API boundary.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Per-strategy evaluation failures never surface here; they degrade to
///   "strategy inapplicable" inside the pipeline.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A required argument was empty or absent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// ============================================================================
// SECTION: Routing Decision
// ============================================================================

/// Resolved routing outcome for one data-access call.
///
/// # Invariants
/// - `table_name` is never empty.
/// - `reason` is diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Target data source; `None` keeps the ambient default.
    pub data_source: Option<String>,
    /// Physical table name for the call.
    pub table_name: String,
    /// Human-readable account of which strategy decided.
    pub reason: String,
}

impl RoutingDecision {
    /// Creates a decision with a data source.
    #[must_use]
    pub fn new(
        data_source: impl Into<String>,
        table_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            data_source: Some(data_source.into()),
            table_name: table_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a decision that changes only the table name.
    #[must_use]
    pub fn table_only(table_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            data_source: None,
            table_name: table_name.into(),
            reason: reason.into(),
        }
    }
}
