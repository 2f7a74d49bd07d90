// crates/dataroute-core/src/lib.rs
// ============================================================================
// Module: Dataroute Core Library
// Description: Multi-strategy routing engine for data-access calls.
// Purpose: Resolve each intercepted call to a data source and physical table.
// Dependencies: dataroute-config, dashmap, rand, serde, serde_json, thiserror,
//               tracing
// ============================================================================

//! ## Overview
//! Dataroute Core decides, per intercepted data-access call, which data
//! source serves it and which physical table it targets. The
//! [`RoutingEngine`] runs a fixed strategy pipeline over an immutable
//! [`RoutingContext`]: custom rules, multi-tenancy, sharding, read/write
//! split, load balancing, pluggable selectors, then the default fallback.
//! Invariants:
//! - Strategy order is fixed; the first decision wins.
//! - Per-strategy evaluation failures degrade to the next stage; routing
//!   only fails for a malformed context.
//! - The default fallback guarantees every well-formed call resolves.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::ContextBuilder;
pub use self::core::OperationKind;
pub use self::core::RouteError;
pub use self::core::RoutingContext;
pub use self::core::RoutingDecision;
pub use interfaces::ConditionEvaluator;
pub use interfaces::DataSourceSelector;
pub use interfaces::ExpectedKind;
pub use interfaces::ExprError;
pub use interfaces::InMemoryMetrics;
pub use interfaces::MetricsSnapshot;
pub use interfaces::NoopMetrics;
pub use interfaces::RouterMetrics;
pub use runtime::CachedRoute;
pub use runtime::EngineBuilder;
pub use runtime::ExprEvaluator;
pub use runtime::RouteCache;
pub use runtime::RoutingEngine;
pub use runtime::context_store;
