// crates/dataroute-config/tests/validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate fail-closed checks on the routing configuration.
// Purpose: Ensure misconfigurations are rejected before the engine sees them.
// =============================================================================

//! Config validation tests for dataroute-config.

use dataroute_config::LoadBalanceConfig;
use dataroute_config::MultiTenantConfig;
use dataroute_config::RouterConfig;
use dataroute_config::SelectionRule;
use dataroute_config::ShardStrategy;
use dataroute_config::ShardingConfig;
use dataroute_config::TenantResolver;

type TestResult = Result<(), String>;

fn base_config() -> RouterConfig {
    RouterConfig {
        default_data_source: "primary".to_string(),
        ..RouterConfig::default()
    }
}

fn assert_invalid(config: &RouterConfig, needle: &str) -> TestResult {
    match config.validate() {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn accepts_minimal_config() -> TestResult {
    base_config().validate().map_err(|err| err.to_string())
}

#[test]
fn rejects_empty_default_data_source() -> TestResult {
    let config = RouterConfig::default();
    assert_invalid(&config, "default data source must not be empty")
}

#[test]
fn rejects_rule_without_name() -> TestResult {
    let mut config = base_config();
    config.rules.push(SelectionRule {
        data_source: "vip_db".to_string(),
        ..SelectionRule::default()
    });
    assert_invalid(&config, "rule name must not be empty")
}

#[test]
fn rejects_rule_without_data_source() -> TestResult {
    let mut config = base_config();
    config.rules.push(SelectionRule {
        name: "vip".to_string(),
        ..SelectionRule::default()
    });
    assert_invalid(&config, "data source must not be empty")
}

#[test]
fn rejects_tenant_resolver_without_key() -> TestResult {
    let mut config = base_config();
    config.multi_tenant = MultiTenantConfig {
        enabled: true,
        resolver: TenantResolver::Header,
        ..MultiTenantConfig::default()
    };
    assert_invalid(&config, "tenant key must not be empty")
}

#[test]
fn rejects_custom_tenant_resolver_without_expression() -> TestResult {
    let mut config = base_config();
    config.multi_tenant = MultiTenantConfig {
        enabled: true,
        resolver: TenantResolver::Custom,
        ..MultiTenantConfig::default()
    };
    assert_invalid(&config, "tenant custom expression must not be empty")
}

#[test]
fn rejects_mod_sharding_with_zero_shards() -> TestResult {
    let mut config = base_config();
    config.sharding.insert("user".to_string(), ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Mod,
        sharding_key: "user_id".to_string(),
        shard_count: 0,
        ..ShardingConfig::default()
    });
    assert_invalid(&config, "shard count for table user must be at least 1")
}

#[test]
fn rejects_sharding_template_without_placeholder() -> TestResult {
    let mut config = base_config();
    config.sharding.insert("user".to_string(), ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Mod,
        sharding_key: "user_id".to_string(),
        shard_count: 4,
        table_template: "user_shard".to_string(),
        ..ShardingConfig::default()
    });
    assert_invalid(&config, "must contain {0}")
}

#[test]
fn rejects_non_numeric_shard_mapping_key() -> TestResult {
    let mut config = base_config();
    let mut sharding = ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Mod,
        sharding_key: "user_id".to_string(),
        shard_count: 4,
        table_template: "user_{0}".to_string(),
        ..ShardingConfig::default()
    };
    sharding.data_source_mapping.insert("first".to_string(), "shard0".to_string());
    config.sharding.insert("user".to_string(), sharding);
    assert_invalid(&config, "must be a decimal shard index")
}

#[test]
fn rejects_range_sharding_without_ranges() -> TestResult {
    let mut config = base_config();
    config.sharding.insert("order".to_string(), ShardingConfig {
        enabled: true,
        strategy: ShardStrategy::Range,
        sharding_key: "order_id".to_string(),
        ..ShardingConfig::default()
    });
    assert_invalid(&config, "requires at least one range")
}

#[test]
fn skips_disabled_sharding() -> TestResult {
    let mut config = base_config();
    config.sharding.insert("user".to_string(), ShardingConfig::default());
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn rejects_enabled_split_without_master() -> TestResult {
    let mut config = base_config();
    config.read_write.enabled = true;
    assert_invalid(&config, "master must not be empty")
}

#[test]
fn rejects_zero_split_weight() -> TestResult {
    let mut config = base_config();
    config.read_write.enabled = true;
    config.read_write.master = "m".to_string();
    config.read_write.weights.insert("s1".to_string(), 0);
    assert_invalid(&config, "weights must be positive")
}

#[test]
fn rejects_empty_load_balance_pool() -> TestResult {
    let mut config = base_config();
    config.load_balance.insert("default".to_string(), LoadBalanceConfig::default());
    assert_invalid(&config, "must list at least one data source")
}

#[test]
fn rejects_zero_cache_ttl() -> TestResult {
    let mut config = base_config();
    config.cache.ttl_ms = 0;
    assert_invalid(&config, "cache ttl must be at least 1ms")
}

#[test]
fn rejects_zero_cache_capacity() -> TestResult {
    let mut config = base_config();
    config.cache.max_entries = 0;
    assert_invalid(&config, "cache capacity must be at least 1 entry")
}

#[test]
fn disabled_cache_skips_policy_checks() -> TestResult {
    let mut config = base_config();
    config.cache.enabled = false;
    config.cache.ttl_ms = 0;
    config.validate().map_err(|err| err.to_string())
}
