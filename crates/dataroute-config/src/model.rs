// crates/dataroute-config/src/model.rs
// ============================================================================
// Module: Routing Configuration Model
// Description: Typed configuration for rules, sharding, tenancy, and pools.
// Purpose: Describe every routing strategy the engine may consult.
// Dependencies: serde, crate::load::ConfigError
// ============================================================================

//! ## Overview
//! The configuration model mirrors the strategy pipeline: custom rules,
//! multi-tenant resolution, per-table sharding, read/write split, load
//! balancing, static table mappings, and the decision cache policy.
//! Invariants:
//! - Enum wire forms are snake_case and stable for serialization.
//! - `validate` is fail-closed: a config that passes validation never causes
//!   an argument-contract failure inside the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::load::ConfigError;

// ============================================================================
// SECTION: Selection Rules
// ============================================================================

/// Custom selection rule consulted before any other strategy.
///
/// # Invariants
/// - Rules with higher `priority` are evaluated first; ties keep declaration
///   order.
/// - `condition` and `table` may be empty; `data_source` may not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionRule {
    /// Rule name used for diagnostics and per-rule hit counters.
    pub name: String,
    /// Match condition. Empty means the rule always matches. A value wrapped
    /// in `#{...}` is evaluated as an expression.
    pub condition: String,
    /// Data-source text: a literal name, or an `#{...}` expression.
    pub data_source: String,
    /// Optional table text: empty keeps the context table name; otherwise a
    /// literal or an `#{...}` expression.
    pub table: String,
    /// Evaluation priority; higher values are tried first.
    pub priority: i32,
    /// Disabled rules are skipped without evaluation.
    pub enabled: bool,
}

impl Default for SelectionRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            condition: String::new(),
            data_source: String::new(),
            table: String::new(),
            priority: 0,
            enabled: true,
        }
    }
}

// ============================================================================
// SECTION: Sharding
// ============================================================================

/// Shard-index computation strategy.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStrategy {
    /// Deterministic hash of the shard value modulo `shard_count`.
    Mod,
    /// Alias of `Mod`; kept distinct for configuration compatibility.
    Hash,
    /// First declared range whose bounds contain the shard value.
    Range,
    /// Shard index produced by a custom expression.
    Custom,
}

/// One range entry for `ShardStrategy::Range`.
///
/// # Invariants
/// - Bounds compare numerically when both parse as numbers, lexically
///   otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShardRange {
    /// Inclusive lower bound.
    pub start: String,
    /// Inclusive upper bound.
    pub end: String,
    /// Data source serving this range.
    pub data_source: String,
    /// Suffix substituted into the table template for this range.
    pub table_suffix: String,
}

/// Sharding configuration for one logical table.
///
/// # Invariants
/// - `table_template` contains the `{0}` placeholder when validation passes.
/// - `data_source_mapping` keys are decimal shard indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShardingConfig {
    /// Disabled sharding is skipped entirely.
    pub enabled: bool,
    /// Shard-index computation strategy.
    pub strategy: ShardStrategy,
    /// Parameter name supplying the shard value.
    pub sharding_key: String,
    /// Number of shards for `mod`/`hash` strategies.
    pub shard_count: u32,
    /// Physical table template with a `{0}` placeholder.
    pub table_template: String,
    /// Shard index (decimal string) to data-source name.
    pub data_source_mapping: BTreeMap<String, String>,
    /// Ordered ranges for the `range` strategy.
    pub ranges: Vec<ShardRange>,
    /// Custom `#{...}` expression producing the shard index.
    pub custom_expression: String,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: ShardStrategy::Mod,
            sharding_key: String::new(),
            shard_count: 0,
            table_template: String::new(),
            data_source_mapping: BTreeMap::new(),
            ranges: Vec::new(),
            custom_expression: String::new(),
        }
    }
}

// ============================================================================
// SECTION: Multi-Tenancy
// ============================================================================

/// Isolation strategy applied once a tenant is resolved.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStrategy {
    /// Route the tenant to a dedicated data source.
    Datasource,
    /// Prefix the table name with `tenant.`.
    Schema,
    /// Suffix the table name with `_tenant`.
    Table,
}

/// Tenant identifier resolution mechanism.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantResolver {
    /// Read the tenant id from a request header.
    Header,
    /// Read the tenant id from a call parameter.
    Parameter,
    /// Produce the tenant id with a custom expression.
    Custom,
}

/// Multi-tenant routing configuration.
///
/// # Invariants
/// - `tenant_key` names the header or parameter consulted by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultiTenantConfig {
    /// Disabled tenancy is skipped entirely.
    pub enabled: bool,
    /// Isolation strategy.
    pub strategy: TenantStrategy,
    /// Tenant resolution mechanism.
    pub resolver: TenantResolver,
    /// Header or parameter name holding the tenant id.
    pub tenant_key: String,
    /// Fallback tenant when resolution yields nothing.
    pub default_tenant: String,
    /// Tenant id to data-source name (for `datasource` strategy).
    pub tenant_mappings: BTreeMap<String, String>,
    /// Custom `#{...}` expression for the `custom` resolver.
    pub custom_expression: String,
}

impl Default for MultiTenantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: TenantStrategy::Datasource,
            resolver: TenantResolver::Header,
            tenant_key: String::new(),
            default_tenant: String::new(),
            tenant_mappings: BTreeMap::new(),
            custom_expression: String::new(),
        }
    }
}

// ============================================================================
// SECTION: Read/Write Split and Load Balancing
// ============================================================================

/// Replica selection strategy for split and load-balance pools.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectStrategy {
    /// Atomic monotonic counter modulo pool size.
    RoundRobin,
    /// Uniform random pick.
    Random,
    /// Weighted random pick; unlisted members weigh 1.
    Weight,
}

/// Read/write split configuration.
///
/// # Invariants
/// - Writes always route to `master`; reads pick from `slaves`.
/// - An empty `slaves` list falls back to `master`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadWriteSplitConfig {
    /// Disabled split is skipped entirely.
    pub enabled: bool,
    /// Data source receiving all writes.
    pub master: String,
    /// Read replicas, in declaration order.
    pub slaves: Vec<String>,
    /// Replica selection strategy.
    pub strategy: SelectStrategy,
    /// Weights for `SelectStrategy::Weight`.
    pub weights: BTreeMap<String, u32>,
}

impl Default for ReadWriteSplitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            master: String::new(),
            slaves: Vec::new(),
            strategy: SelectStrategy::RoundRobin,
            weights: BTreeMap::new(),
        }
    }
}

/// Named load-balance pool applied outside the read/write split.
///
/// # Invariants
/// - Pool members are data-source names; order matters for round robin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadBalanceConfig {
    /// Member selection strategy.
    pub strategy: SelectStrategy,
    /// Pool members, in declaration order.
    pub data_sources: Vec<String>,
    /// Weights for `SelectStrategy::Weight`.
    pub weights: BTreeMap<String, u32>,
}

impl Default for LoadBalanceConfig {
    fn default() -> Self {
        Self {
            strategy: SelectStrategy::RoundRobin,
            data_sources: Vec::new(),
            weights: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Cache Policy
// ============================================================================

/// Routing decision cache policy.
///
/// # Invariants
/// - `ttl_ms`, `max_entries`, and `sweep_interval_ms` are non-zero when the
///   cache is enabled and validation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Disabled caching bypasses lookup and store.
    pub enabled: bool,
    /// Time-to-live for cached decisions in milliseconds.
    pub ttl_ms: u64,
    /// Maximum number of cached decisions.
    pub max_entries: usize,
    /// Background expiry sweep interval in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 60_000,
            max_entries: 1_024,
            sweep_interval_ms: 60_000,
        }
    }
}

// ============================================================================
// SECTION: Router Configuration
// ============================================================================

/// Full routing configuration consumed by the engine.
///
/// # Invariants
/// - `default_data_source` is non-empty when validation passes.
/// - Loaded once at process start and treated as read-mostly thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Fallback data source when no strategy produces one.
    pub default_data_source: String,
    /// Logical data-source name to physical data-source name.
    pub aliases: BTreeMap<String, String>,
    /// Static logical table name to physical table name.
    pub table_mappings: BTreeMap<String, String>,
    /// Custom selection rules.
    pub rules: Vec<SelectionRule>,
    /// Multi-tenant configuration.
    pub multi_tenant: MultiTenantConfig,
    /// Sharding configuration keyed by logical table name.
    pub sharding: BTreeMap<String, ShardingConfig>,
    /// Read/write split configuration.
    pub read_write: ReadWriteSplitConfig,
    /// Load-balance pools keyed by logical table name; the `default` key
    /// applies to tables without a dedicated pool.
    pub load_balance: BTreeMap<String, LoadBalanceConfig>,
    /// Decision cache policy.
    pub cache: CacheConfig,
}

impl RouterConfig {
    /// Key of the load-balance pool applied when no table-specific pool
    /// exists.
    pub const DEFAULT_POOL: &'static str = "default";

    /// Validates the configuration fail-closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_data_source.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default data source must not be empty".to_string(),
            ));
        }
        self.validate_rules()?;
        self.validate_tenancy()?;
        self.validate_sharding()?;
        self.validate_pools()?;
        self.validate_cache()?;
        Ok(())
    }

    /// Validates custom selection rules.
    fn validate_rules(&self) -> Result<(), ConfigError> {
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                return Err(ConfigError::Invalid("rule name must not be empty".to_string()));
            }
            if rule.data_source.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule {} data source must not be empty",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    /// Validates the multi-tenant configuration.
    fn validate_tenancy(&self) -> Result<(), ConfigError> {
        let tenant = &self.multi_tenant;
        if !tenant.enabled {
            return Ok(());
        }
        match tenant.resolver {
            TenantResolver::Header | TenantResolver::Parameter => {
                if tenant.tenant_key.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "tenant key must not be empty for header/parameter resolvers".to_string(),
                    ));
                }
            }
            TenantResolver::Custom => {
                if tenant.custom_expression.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "tenant custom expression must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validates per-table sharding configurations.
    fn validate_sharding(&self) -> Result<(), ConfigError> {
        for (table, sharding) in &self.sharding {
            if !sharding.enabled {
                continue;
            }
            if sharding.sharding_key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sharding key for table {table} must not be empty"
                )));
            }
            match sharding.strategy {
                ShardStrategy::Mod | ShardStrategy::Hash => {
                    if sharding.shard_count == 0 {
                        return Err(ConfigError::Invalid(format!(
                            "shard count for table {table} must be at least 1"
                        )));
                    }
                }
                ShardStrategy::Range => {
                    if sharding.ranges.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "range sharding for table {table} requires at least one range"
                        )));
                    }
                }
                ShardStrategy::Custom => {
                    if sharding.custom_expression.trim().is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "custom sharding for table {table} requires an expression"
                        )));
                    }
                }
            }
            if !sharding.table_template.is_empty()
                && !sharding.table_template.contains("{0}")
            {
                return Err(ConfigError::Invalid(format!(
                    "sharding table template for table {table} must contain {{0}}"
                )));
            }
            for index in sharding.data_source_mapping.keys() {
                if index.parse::<u64>().is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "sharding data source mapping key {index} for table {table} \
                         must be a decimal shard index"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validates the read/write split and load-balance pools.
    fn validate_pools(&self) -> Result<(), ConfigError> {
        if self.read_write.enabled && self.read_write.master.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "read/write split master must not be empty".to_string(),
            ));
        }
        for weight in self.read_write.weights.values() {
            if *weight == 0 {
                return Err(ConfigError::Invalid(
                    "read/write split weights must be positive".to_string(),
                ));
            }
        }
        for (name, pool) in &self.load_balance {
            if pool.data_sources.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "load-balance pool {name} must list at least one data source"
                )));
            }
            for weight in pool.weights.values() {
                if *weight == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "load-balance pool {name} weights must be positive"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validates the cache policy.
    fn validate_cache(&self) -> Result<(), ConfigError> {
        if !self.cache.enabled {
            return Ok(());
        }
        if self.cache.ttl_ms == 0 {
            return Err(ConfigError::Invalid("cache ttl must be at least 1ms".to_string()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache capacity must be at least 1 entry".to_string(),
            ));
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "cache sweep interval must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }
}
