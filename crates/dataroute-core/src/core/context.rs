// crates/dataroute-core/src/core/context.rs
// ============================================================================
// Module: Routing Context
// Description: Immutable per-call context consumed by the routing pipeline.
// Purpose: Capture the table, operation, arguments, and headers of one call.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`RoutingContext`] is built once per intercepted data-access call and is
//! read-only thereafter. Every strategy in the pipeline consults it; no stage
//! may mutate it. The cache key derived from a context is stable: parameters
//! are rendered in sorted order so logically identical calls share one key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Operation Kind
// ============================================================================

/// Kind of data-access operation being routed.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read operation.
    Select,
    /// Single-row insert.
    Insert,
    /// Single-row update.
    Update,
    /// Single-row delete.
    Delete,
    /// Batched insert.
    BatchInsert,
    /// Batched update.
    BatchUpdate,
    /// Batched delete.
    BatchDelete,
}

impl OperationKind {
    /// Returns a stable label for the operation kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BatchInsert => "batch_insert",
            Self::BatchUpdate => "batch_update",
            Self::BatchDelete => "batch_delete",
        }
    }

    /// Returns whether the operation mutates data.
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Select)
    }

    /// Infers the operation kind from a method name.
    ///
    /// Prefixes `select`/`find`/`get`/`query`/`count`/`exists` map to reads;
    /// `insert`/`save`/`add`, `update`/`modify`, and `delete`/`remove` map to
    /// their write kinds, upgraded to the batch variant when the name
    /// mentions `batch`. Unrecognized names default to [`Self::Select`].
    #[must_use]
    pub fn infer(method_name: &str) -> Self {
        let name = method_name.to_ascii_lowercase();
        let batch = name.contains("batch");

        const READ_PREFIXES: [&str; 6] = ["select", "find", "get", "query", "count", "exists"];
        if READ_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            return Self::Select;
        }
        if ["insert", "save", "add"].iter().any(|prefix| name.starts_with(prefix)) {
            return if batch { Self::BatchInsert } else { Self::Insert };
        }
        if ["update", "modify"].iter().any(|prefix| name.starts_with(prefix)) {
            return if batch { Self::BatchUpdate } else { Self::Update };
        }
        if ["delete", "remove"].iter().any(|prefix| name.starts_with(prefix)) {
            return if batch { Self::BatchDelete } else { Self::Delete };
        }
        Self::Select
    }
}

// ============================================================================
// SECTION: Routing Context
// ============================================================================

/// Immutable context describing one intercepted data-access call.
///
/// # Invariants
/// - Exactly one context exists per call; it is never mutated after build.
/// - `parameters` preserve a deterministic (sorted) iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Logical table name targeted by the call.
    pub table_name: String,
    /// Operation kind for the call.
    pub operation: OperationKind,
    /// Call arguments by name.
    pub parameters: BTreeMap<String, Value>,
    /// Ambient request headers, when available.
    pub headers: BTreeMap<String, String>,
    /// Free-form extension attributes.
    pub attributes: BTreeMap<String, Value>,
}

impl RoutingContext {
    /// Starts building a context for the given table and operation.
    #[must_use]
    pub fn builder(table_name: impl Into<String>, operation: OperationKind) -> ContextBuilder {
        ContextBuilder {
            table_name: table_name.into(),
            operation,
            parameters: BTreeMap::new(),
            headers: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns a parameter value by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Returns a header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns an attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Derives the cache key for this context.
    ///
    /// The key is `table:operation` followed by every parameter rendered as
    /// `k=v` in sorted key order, all joined with `:`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = String::with_capacity(self.table_name.len() + 16);
        key.push_str(&self.table_name);
        key.push(':');
        key.push_str(self.operation.as_str());
        for (name, value) in &self.parameters {
            key.push(':');
            key.push_str(name);
            key.push('=');
            key.push_str(&render_value(value));
        }
        key
    }
}

/// Renders a parameter value for cache-key derivation.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Context Builder
// ============================================================================

/// Builder for [`RoutingContext`] values.
#[derive(Debug)]
pub struct ContextBuilder {
    /// Logical table name.
    table_name: String,
    /// Operation kind.
    operation: OperationKind,
    /// Accumulated parameters.
    parameters: BTreeMap<String, Value>,
    /// Accumulated headers.
    headers: BTreeMap<String, String>,
    /// Accumulated attributes.
    attributes: BTreeMap<String, Value>,
}

impl ContextBuilder {
    /// Adds a named call parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Finalizes the context.
    #[must_use]
    pub fn build(self) -> RoutingContext {
        RoutingContext {
            table_name: self.table_name,
            operation: self.operation,
            parameters: self.parameters,
            headers: self.headers,
            attributes: self.attributes,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_operation_from_method_names() {
        assert_eq!(OperationKind::infer("findUserById"), OperationKind::Select);
        assert_eq!(OperationKind::infer("countOrders"), OperationKind::Select);
        assert_eq!(OperationKind::infer("saveUser"), OperationKind::Insert);
        assert_eq!(OperationKind::infer("insertBatchUsers"), OperationKind::BatchInsert);
        assert_eq!(OperationKind::infer("modifyProfile"), OperationKind::Update);
        assert_eq!(OperationKind::infer("updateBatchRows"), OperationKind::BatchUpdate);
        assert_eq!(OperationKind::infer("removeStale"), OperationKind::Delete);
        assert_eq!(OperationKind::infer("deleteBatchStale"), OperationKind::BatchDelete);
        assert_eq!(OperationKind::infer("somethingElse"), OperationKind::Select);
    }

    #[test]
    fn cache_key_sorts_parameters() {
        let context = RoutingContext::builder("user", OperationKind::Select)
            .parameter("zeta", 1)
            .parameter("alpha", "x")
            .build();
        assert_eq!(context.cache_key(), "user:select:alpha=x:zeta=1");
    }
}
