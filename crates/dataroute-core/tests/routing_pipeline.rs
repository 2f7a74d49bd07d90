// crates/dataroute-core/tests/routing_pipeline.rs
// ============================================================================
// Module: Routing Pipeline Tests
// Description: End-to-end strategy pipeline behavior over full configurations.
// Purpose: Ensure stage order, precedence, and fallback semantics hold.
// Dependencies: dataroute-core, dataroute-config, serde_json
// ============================================================================

//! Integration tests for the routing pipeline: rules, tenancy, sharding,
//! read/write split, load balancing, selectors, and the default fallback.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use dataroute_config::LoadBalanceConfig;
use dataroute_config::RouterConfig;
use dataroute_config::SelectStrategy;
use dataroute_config::SelectionRule;
use dataroute_config::ShardRange;
use dataroute_config::ShardStrategy;
use dataroute_config::ShardingConfig;
use dataroute_config::TenantResolver;
use dataroute_config::TenantStrategy;
use dataroute_core::DataSourceSelector;
use dataroute_core::InMemoryMetrics;
use dataroute_core::OperationKind;
use dataroute_core::RouterMetrics;
use dataroute_core::RoutingContext;
use dataroute_core::RoutingEngine;

fn base_config() -> RouterConfig {
    RouterConfig {
        default_data_source: "primary".to_string(),
        ..RouterConfig::default()
    }
}

fn engine(config: RouterConfig) -> RoutingEngine {
    RoutingEngine::builder(Arc::new(config)).build()
}

fn rule(name: &str, condition: &str, data_source: &str, priority: i32) -> SelectionRule {
    SelectionRule {
        name: name.to_string(),
        condition: condition.to_string(),
        data_source: data_source.to_string(),
        table: String::new(),
        priority,
        enabled: true,
    }
}

#[test]
fn default_fallback_routes_to_configured_default() {
    let engine = engine(base_config());
    let ctx = RoutingContext::builder("user", OperationKind::Select).build();

    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("primary"));
    assert_eq!(decision.table_name, "user");
    assert_eq!(decision.reason, "default");
}

#[test]
fn empty_table_name_is_rejected() {
    let engine = engine(base_config());
    let ctx = RoutingContext::builder("", OperationKind::Select).build();
    assert!(engine.route(&ctx).is_err());
}

#[test]
fn matching_rule_wins_over_later_stages() {
    let mut config = base_config();
    config.rules.push(rule("vip", "#{userType == 'VIP'}", "vip_db", 10));
    config.read_write.enabled = true;
    config.read_write.master = "master".to_string();
    let engine = engine(config);

    let vip = RoutingContext::builder("order", OperationKind::Select)
        .parameter("userType", "VIP")
        .build();
    let decision = engine.route(&vip).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("vip_db"));
    assert_eq!(decision.reason, "rule:vip");

    let regular = RoutingContext::builder("order", OperationKind::Select)
        .parameter("userType", "basic")
        .build();
    let decision = engine.route(&regular).unwrap();
    assert_eq!(decision.reason, "read_write:replica");
}

#[test]
fn higher_priority_rule_wins_and_ties_keep_declaration_order() {
    let mut config = base_config();
    config.rules.push(rule("low", "", "low_db", 1));
    config.rules.push(rule("high", "", "high_db", 5));
    config.rules.push(rule("tie_first", "", "tie_first_db", 5));
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    // "high" precedes "tie_first" in declaration order at equal priority.
    assert_eq!(decision.data_source.as_deref(), Some("high_db"));
}

#[test]
fn disabled_rule_is_skipped() {
    let mut config = base_config();
    let mut disabled = rule("off", "", "off_db", 10);
    disabled.enabled = false;
    config.rules.push(disabled);
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("primary"));
}

#[test]
fn broken_rule_condition_degrades_to_next_rule() {
    let mut config = base_config();
    config.rules.push(rule("broken", "#{unknownIdentifier == 1}", "broken_db", 10));
    config.rules.push(rule("fallback", "", "fallback_db", 1));
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("fallback_db"));
}

#[test]
fn rule_table_expression_renames_the_table() {
    let mut config = base_config();
    let mut archive = rule("archive", "#{year < 2024}", "archive_db", 5);
    archive.table = "#{tableName + '_' + year}".to_string();
    config.rules.push(archive);
    let engine = engine(config);

    let ctx = RoutingContext::builder("order", OperationKind::Select)
        .parameter("year", 2023)
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("archive_db"));
    assert_eq!(decision.table_name, "order_2023");
}

#[test]
fn tenant_datasource_strategy_maps_tenant_to_data_source() {
    let mut config = base_config();
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Datasource;
    config.multi_tenant.resolver = TenantResolver::Header;
    config.multi_tenant.tenant_key = "x-tenant-id".to_string();
    config
        .multi_tenant
        .tenant_mappings
        .insert("acme".to_string(), "acme_db".to_string());
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .header("x-tenant-id", "acme")
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("acme_db"));
    assert_eq!(decision.reason, "tenant:acme");
}

#[test]
fn tenant_schema_strategy_prefixes_the_table() {
    let mut config = base_config();
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Schema;
    config.multi_tenant.resolver = TenantResolver::Parameter;
    config.multi_tenant.tenant_key = "tenantId".to_string();
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .parameter("tenantId", "acme")
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source, None);
    assert_eq!(decision.table_name, "acme.user");
}

#[test]
fn tenant_table_strategy_suffixes_the_table() {
    let mut config = base_config();
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Table;
    config.multi_tenant.resolver = TenantResolver::Parameter;
    config.multi_tenant.tenant_key = "tenantId".to_string();
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .parameter("tenantId", "acme")
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.table_name, "user_acme");
}

#[test]
fn missing_tenant_falls_back_to_default_tenant() {
    let mut config = base_config();
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Table;
    config.multi_tenant.resolver = TenantResolver::Header;
    config.multi_tenant.tenant_key = "x-tenant-id".to_string();
    config.multi_tenant.default_tenant = "shared".to_string();
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.table_name, "user_shared");
}

#[test]
fn missing_tenant_without_default_skips_the_stage() {
    let mut config = base_config();
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Table;
    config.multi_tenant.resolver = TenantResolver::Header;
    config.multi_tenant.tenant_key = "x-tenant-id".to_string();
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.reason, "default");
}

fn mod_sharding(shard_count: u32) -> ShardingConfig {
    ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Mod,
        sharding_key: "userId".to_string(),
        shard_count,
        table_template: "user_{0}".to_string(),
        ..ShardingConfig::default()
    }
}

#[test]
fn mod_sharding_is_deterministic_and_in_range() {
    let mut config = base_config();
    config.sharding.insert("user".to_string(), mod_sharding(4));
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .parameter("userId", 12345)
        .build();
    let first = engine.route(&ctx).unwrap();
    let second = engine.route(&ctx).unwrap();
    assert_eq!(first.data_source, second.data_source);
    assert_eq!(first.table_name, second.table_name);

    let suffix: u64 = first
        .table_name
        .strip_prefix("user_")
        .and_then(|raw| raw.parse().ok())
        .unwrap();
    assert!(suffix < 4);
    assert_eq!(first.data_source.as_deref(), Some(format!("shard{suffix}").as_str()));
}

#[test]
fn mod_sharding_uses_explicit_index_mapping() {
    let mut config = base_config();
    let mut sharding = mod_sharding(2);
    sharding.data_source_mapping.insert("0".to_string(), "even_db".to_string());
    sharding.data_source_mapping.insert("1".to_string(), "odd_db".to_string());
    config.sharding.insert("user".to_string(), sharding);
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .parameter("userId", 7)
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert!(matches!(decision.data_source.as_deref(), Some("even_db" | "odd_db")));
}

#[test]
fn range_sharding_picks_first_containing_range() {
    let mut config = base_config();
    let sharding = ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Range,
        sharding_key: "orderId".to_string(),
        table_template: "order_{0}".to_string(),
        ranges: vec![
            ShardRange {
                start: "0".to_string(),
                end: "999".to_string(),
                data_source: "cold_db".to_string(),
                table_suffix: "cold".to_string(),
            },
            ShardRange {
                start: "1000".to_string(),
                end: "9999".to_string(),
                data_source: "hot_db".to_string(),
                table_suffix: "hot".to_string(),
            },
        ],
        ..ShardingConfig::default()
    };
    config.sharding.insert("order".to_string(), sharding);
    let engine = engine(config);

    let ctx = RoutingContext::builder("order", OperationKind::Select)
        .parameter("orderId", 1500)
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("hot_db"));
    assert_eq!(decision.table_name, "order_hot");
}

#[test]
fn custom_sharding_uses_the_expression_index() {
    let mut config = base_config();
    let sharding = ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Custom,
        sharding_key: "userId".to_string(),
        shard_count: 4,
        table_template: "user_{0}".to_string(),
        custom_expression: "#{hashMod(userId, 4)}".to_string(),
        ..ShardingConfig::default()
    };
    config.sharding.insert("user".to_string(), sharding);
    let engine = engine(config);

    for user_id in 0 .. 16 {
        let ctx = RoutingContext::builder("user", OperationKind::Select)
            .parameter("userId", user_id)
            .build();
        let decision = engine.route(&ctx).unwrap();
        let suffix: u64 = decision
            .table_name
            .strip_prefix("user_")
            .and_then(|raw| raw.parse().ok())
            .unwrap();
        assert!(suffix < 4, "shard index {suffix} out of range for userId {user_id}");
    }
}

#[test]
fn missing_shard_value_skips_sharding() {
    let mut config = base_config();
    config.sharding.insert("user".to_string(), mod_sharding(4));
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.reason, "default");
}

#[test]
fn writes_pin_to_master_and_reads_round_robin_the_replicas() {
    let mut config = base_config();
    config.cache.enabled = false;
    config.read_write.enabled = true;
    config.read_write.master = "master".to_string();
    config.read_write.slaves = vec!["s1".to_string(), "s2".to_string()];
    config.read_write.strategy = SelectStrategy::RoundRobin;
    let engine = engine(config);

    let write = RoutingContext::builder("user", OperationKind::Update).build();
    let decision = engine.route(&write).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("master"));
    assert_eq!(decision.reason, "read_write:master");

    let read = RoutingContext::builder("user", OperationKind::Select).build();
    let mut seen = BTreeSet::new();
    for _ in 0 .. 1000 {
        let decision = engine.route(&read).unwrap();
        seen.insert(decision.data_source.unwrap());
    }
    assert_eq!(seen.len(), 2, "round robin must reach every replica: {seen:?}");
}

#[test]
fn empty_replica_list_falls_back_to_master_for_reads() {
    let mut config = base_config();
    config.read_write.enabled = true;
    config.read_write.master = "master".to_string();
    let engine = engine(config);

    let read = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&read).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("master"));
}

#[test]
fn load_balance_prefers_the_table_pool_over_the_default_pool() {
    let mut config = base_config();
    config.cache.enabled = false;
    config.load_balance.insert("order".to_string(), LoadBalanceConfig {
        strategy: SelectStrategy::RoundRobin,
        data_sources: vec!["order_db".to_string()],
        weights: std::collections::BTreeMap::new(),
    });
    config
        .load_balance
        .insert(RouterConfig::DEFAULT_POOL.to_string(), LoadBalanceConfig {
            strategy: SelectStrategy::RoundRobin,
            data_sources: vec!["pool_db".to_string()],
            weights: std::collections::BTreeMap::new(),
        });
    let engine = engine(config);

    let order = RoutingContext::builder("order", OperationKind::Select).build();
    let decision = engine.route(&order).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("order_db"));

    let other = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&other).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("pool_db"));
    assert_eq!(decision.reason, "load_balance");
}

struct HintSelector;

impl DataSourceSelector for HintSelector {
    fn name(&self) -> &str {
        "hint"
    }

    fn supports(&self, ctx: &RoutingContext) -> bool {
        ctx.attribute("route_hint").is_some()
    }

    fn select(&self, ctx: &RoutingContext) -> Option<String> {
        ctx.attribute("route_hint").and_then(|value| value.as_str()).map(ToString::to_string)
    }
}

#[test]
fn pluggable_selector_decides_when_it_supports_the_context() {
    let config = base_config();
    let engine = RoutingEngine::builder(Arc::new(config)).selector(Arc::new(HintSelector)).build();

    let hinted = RoutingContext::builder("user", OperationKind::Select)
        .attribute("route_hint", "hinted_db")
        .build();
    let decision = engine.route(&hinted).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("hinted_db"));
    assert_eq!(decision.reason, "selector:hint");

    let plain = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&plain).unwrap();
    assert_eq!(decision.reason, "default");
}

#[test]
fn aliases_and_static_table_mappings_apply_to_the_final_decision() {
    let mut config = base_config();
    config.default_data_source = "primary_alias".to_string();
    config.aliases.insert("primary_alias".to_string(), "primary_phys".to_string());
    config.table_mappings.insert("user".to_string(), "user_v2".to_string());
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.data_source.as_deref(), Some("primary_phys"));
    assert_eq!(decision.table_name, "user_v2");
}

#[test]
fn static_table_mapping_is_skipped_when_a_stage_renamed_the_table() {
    let mut config = base_config();
    config.table_mappings.insert("user".to_string(), "user_v2".to_string());
    config.multi_tenant.enabled = true;
    config.multi_tenant.strategy = TenantStrategy::Table;
    config.multi_tenant.resolver = TenantResolver::Parameter;
    config.multi_tenant.tenant_key = "tenantId".to_string();
    let engine = engine(config);

    let ctx = RoutingContext::builder("user", OperationKind::Select)
        .parameter("tenantId", "acme")
        .build();
    let decision = engine.route(&ctx).unwrap();
    assert_eq!(decision.table_name, "user_acme");
}

#[test]
fn repeated_calls_hit_the_decision_cache() {
    let mut config = base_config();
    config.rules.push(rule("vip", "#{userType == 'VIP'}", "vip_db", 10));
    let metrics = Arc::new(InMemoryMetrics::new());
    let engine =
        RoutingEngine::builder(Arc::new(config)).metrics(Arc::clone(&metrics) as Arc<dyn RouterMetrics>).build();

    let ctx = RoutingContext::builder("order", OperationKind::Select)
        .parameter("userType", "VIP")
        .build();
    let first = engine.route(&ctx).unwrap();
    assert_eq!(first.reason, "rule:vip");

    let second = engine.route(&ctx).unwrap();
    assert_eq!(second.reason, "cache");
    assert_eq!(second.data_source, first.data_source);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 1);
    engine.shutdown();
}

#[test]
fn disabled_cache_re_runs_the_pipeline() {
    let mut config = base_config();
    config.cache.enabled = false;
    let metrics = Arc::new(InMemoryMetrics::new());
    let engine =
        RoutingEngine::builder(Arc::new(config)).metrics(Arc::clone(&metrics) as Arc<dyn RouterMetrics>).build();

    let ctx = RoutingContext::builder("user", OperationKind::Select).build();
    engine.route(&ctx).unwrap();
    engine.route(&ctx).unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.cache_hits, 0);
    assert_eq!(snapshot.cache_misses, 0);
    assert_eq!(snapshot.total_requests, 2);
}
