// crates/dataroute-config/src/lib.rs
// ============================================================================
// Module: DataRoute Configuration
// Description: Typed routing configuration model, validation, and loading.
// Purpose: Provide the read-mostly configuration surface consumed by the
//          routing engine.
// Dependencies: serde, serde_json, serde_yaml, thiserror
// ============================================================================

//! ## Overview
//! This crate defines the configuration surface for DataRoute: the default
//! data source, custom selection rules, per-table sharding, multi-tenant
//! resolution, read/write split, load-balance pools, static table mappings,
//! and cache policy. Configuration is loaded once at process start, validated
//! fail-closed, and treated as read-mostly for the lifetime of the process.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod load;
mod model;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use load::ConfigError;
pub use model::CacheConfig;
pub use model::LoadBalanceConfig;
pub use model::MultiTenantConfig;
pub use model::ReadWriteSplitConfig;
pub use model::RouterConfig;
pub use model::SelectStrategy;
pub use model::SelectionRule;
pub use model::ShardRange;
pub use model::ShardStrategy;
pub use model::ShardingConfig;
pub use model::TenantResolver;
pub use model::TenantStrategy;
