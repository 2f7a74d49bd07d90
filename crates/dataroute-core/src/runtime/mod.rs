// crates/dataroute-core/src/runtime/mod.rs
// ============================================================================
// Module: Runtime
// Description: Routing engine, expression evaluator, cache, and overrides.
// Purpose: Group the stateful runtime machinery behind the core types.
// Dependencies: crate::core, crate::interfaces, dataroute-config
// ============================================================================

//! ## Overview
//! The runtime layer holds everything with state or side effects: the
//! strategy pipeline in [`engine`], the expression evaluator in [`expr`],
//! the decision cache in [`cache`], the pool selector in [`select`], and
//! the thread-scoped override slots in [`context_store`].

/// TTL + LRU decision cache with a background sweeper.
pub mod cache;
/// Thread-scoped data-source and table-mapping overrides.
pub mod context_store;
/// Multi-strategy routing engine.
pub mod engine;
/// Expression lexer, parser, and evaluator.
pub mod expr;
/// Replica selection strategies.
pub mod select;

pub use cache::CachedRoute;
pub use cache::RouteCache;
pub use engine::EngineBuilder;
pub use engine::RoutingEngine;
pub use expr::ExprEvaluator;
pub use expr::deterministic_hash;
pub use expr::expression_source;
pub use select::PoolSelector;
