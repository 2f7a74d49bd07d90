// crates/dataroute-core/src/core/mod.rs
// ============================================================================
// Module: DataRoute Core Model
// Description: Context and decision types shared across the routing runtime.
// Purpose: Define the immutable per-call model consumed by every strategy.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The core model holds the types exchanged between the interception layer
//! and the routing runtime: the per-call [`RoutingContext`], the resolved
//! [`RoutingDecision`], and the boundary error type.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod decision;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use context::ContextBuilder;
pub use context::OperationKind;
pub use context::RoutingContext;
pub use decision::RouteError;
pub use decision::RoutingDecision;
