// crates/dataroute-core/src/runtime/engine.rs
// ============================================================================
// Module: Routing Engine
// Description: Ordered strategy pipeline producing routing decisions.
// Purpose: Resolve each call to a concrete data source and physical table.
// Dependencies: crate::core, crate::interfaces, crate::runtime,
//               dataroute-config, serde_json, tracing
// ============================================================================

//! ## Overview
//! The engine consults the decision cache, then runs the strategy pipeline
//! in a fixed order: custom rules, multi-tenancy, sharding, read/write
//! split, load balancing, pluggable selectors, default fallback. The first
//! stage that produces a decision wins. Per-stage evaluation failures are
//! logged and degrade to "strategy inapplicable"; the default fallback
//! always succeeds, so `route` never fails for a well-formed context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dataroute_config::RouterConfig;
use dataroute_config::SelectionRule;
use dataroute_config::ShardRange;
use dataroute_config::ShardStrategy;
use dataroute_config::ShardingConfig;
use dataroute_config::TenantResolver;
use dataroute_config::TenantStrategy;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::core::RouteError;
use crate::core::RoutingContext;
use crate::core::RoutingDecision;
use crate::interfaces::ConditionEvaluator;
use crate::interfaces::DataSourceSelector;
use crate::interfaces::ExpectedKind;
use crate::interfaces::ExprError;
use crate::interfaces::NoopMetrics;
use crate::interfaces::RouterMetrics;
use crate::runtime::cache::CachedRoute;
use crate::runtime::cache::RouteCache;
use crate::runtime::expr::ExprEvaluator;
use crate::runtime::expr::deterministic_hash;
use crate::runtime::expr::expression_source;
use crate::runtime::select::PoolSelector;

// ============================================================================
// SECTION: Strategy Pipeline
// ============================================================================

/// One pipeline stage: a pure function over context and configuration.
type Strategy = fn(&RoutingEngine, &RoutingContext) -> Option<RoutingDecision>;

/// Ordered strategy pipeline; the first stage producing a decision wins.
/// The default fallback runs after the pipeline and always succeeds.
const PIPELINE: &[(&str, Strategy)] = &[
    ("rules", RoutingEngine::apply_rules),
    ("tenant", RoutingEngine::apply_tenant),
    ("sharding", RoutingEngine::apply_sharding),
    ("read_write", RoutingEngine::apply_read_write),
    ("load_balance", RoutingEngine::apply_load_balance),
    ("selectors", RoutingEngine::apply_selectors),
];

/// Bounded wait for the sweeper on engine shutdown.
const SWEEPER_SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Engine Builder
// ============================================================================

/// Builder for a [`RoutingEngine`].
///
/// # Invariants
/// - Omitted collaborators default to the built-in evaluator and a no-op
///   metrics sink.
pub struct EngineBuilder {
    /// Routing configuration.
    config: Arc<RouterConfig>,
    /// Injected expression engine.
    evaluator: Option<Arc<dyn ConditionEvaluator>>,
    /// Injected metrics sink.
    metrics: Option<Arc<dyn RouterMetrics>>,
    /// Pluggable selectors in registration order.
    selectors: Vec<Arc<dyn DataSourceSelector>>,
}

impl EngineBuilder {
    /// Sets the expression engine.
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn RouterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Appends a pluggable selector.
    #[must_use]
    pub fn selector(mut self, selector: Arc<dyn DataSourceSelector>) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Builds the engine and starts the cache sweeper when caching is
    /// enabled.
    #[must_use]
    pub fn build(self) -> RoutingEngine {
        // Stable sort keeps declaration order on equal priorities.
        let mut rules: Vec<SelectionRule> =
            self.config.rules.iter().filter(|rule| rule.enabled).cloned().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        let cache = RouteCache::new(self.config.cache.max_entries);
        if self.config.cache.enabled {
            cache.start_sweeper(Duration::from_millis(self.config.cache.sweep_interval_ms));
        }

        RoutingEngine {
            config: self.config,
            rules,
            evaluator: self.evaluator.unwrap_or_else(|| Arc::new(ExprEvaluator::new())),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            selectors: self.selectors,
            cache,
            pool: PoolSelector::new(),
        }
    }
}

// ============================================================================
// SECTION: Routing Engine
// ============================================================================

/// Multi-strategy routing engine.
///
/// # Invariants
/// - `route` is a side-effect-free computation over the context and the
///   read-mostly configuration (metrics and cache updates aside).
/// - The default fallback guarantees every well-formed context resolves.
pub struct RoutingEngine {
    /// Routing configuration, loaded once at process start.
    config: Arc<RouterConfig>,
    /// Enabled rules sorted by priority descending, declaration order on
    /// ties.
    rules: Vec<SelectionRule>,
    /// Injected expression engine.
    evaluator: Arc<dyn ConditionEvaluator>,
    /// Metrics sink.
    metrics: Arc<dyn RouterMetrics>,
    /// Pluggable selectors in registration order.
    selectors: Vec<Arc<dyn DataSourceSelector>>,
    /// Decision cache.
    cache: RouteCache,
    /// Shared pool selector holding the round-robin counter.
    pool: PoolSelector,
}

impl RoutingEngine {
    /// Starts building an engine over the given configuration.
    #[must_use]
    pub fn builder(config: Arc<RouterConfig>) -> EngineBuilder {
        EngineBuilder {
            config,
            evaluator: None,
            metrics: None,
            selectors: Vec::new(),
        }
    }

    /// Returns the decision cache.
    #[must_use]
    pub const fn cache(&self) -> &RouteCache {
        &self.cache
    }

    /// Stops the background cache sweeper with a bounded wait.
    pub fn shutdown(&self) {
        self.cache.shutdown_sweeper(SWEEPER_SHUTDOWN_WAIT);
    }

    /// Routes one call to a data source and physical table.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidArgument`] when the context table name is
    /// empty. Per-strategy evaluation failures never surface here.
    pub fn route(&self, ctx: &RoutingContext) -> Result<RoutingDecision, RouteError> {
        if ctx.table_name.is_empty() {
            return Err(RouteError::InvalidArgument(
                "context table name must not be empty".to_string(),
            ));
        }
        self.metrics.record_request();

        let cache_key = ctx.cache_key();
        if self.config.cache.enabled {
            if let Some(cached) = self.cache.get(&cache_key) {
                self.metrics.record_cache_hit();
                let decision = RoutingDecision {
                    data_source: cached.data_source,
                    table_name: cached.table_name,
                    reason: "cache".to_string(),
                };
                self.record(&decision);
                return Ok(decision);
            }
            self.metrics.record_cache_miss();
        }

        let mut decision = self.run_pipeline(ctx);
        self.finalize(ctx, &mut decision);

        if self.config.cache.enabled {
            self.cache.put(
                &cache_key,
                CachedRoute {
                    data_source: decision.data_source.clone(),
                    table_name: decision.table_name.clone(),
                },
                Duration::from_millis(self.config.cache.ttl_ms),
            );
        }
        self.record(&decision);
        Ok(decision)
    }

    /// Runs the pipeline, falling back to the default data source.
    fn run_pipeline(&self, ctx: &RoutingContext) -> RoutingDecision {
        for (stage, strategy) in PIPELINE {
            if let Some(decision) = strategy(self, ctx) {
                debug!(stage, reason = %decision.reason, "routing stage decided");
                return decision;
            }
        }
        RoutingDecision::new(
            self.config.default_data_source.clone(),
            ctx.table_name.clone(),
            "default",
        )
    }

    /// Applies alias and static table-mapping resolution to a decision.
    fn finalize(&self, ctx: &RoutingContext, decision: &mut RoutingDecision) {
        if let Some(data_source) = &decision.data_source
            && let Some(physical) = self.config.aliases.get(data_source)
        {
            decision.data_source = Some(physical.clone());
        }
        // Static table mappings apply only when no stage renamed the table.
        if decision.table_name == ctx.table_name
            && let Some(mapped) = self.config.table_mappings.get(&ctx.table_name)
        {
            decision.table_name = mapped.clone();
        }
    }

    /// Records a finalized decision with the metrics sink.
    fn record(&self, decision: &RoutingDecision) {
        let data_source = decision.data_source.as_deref().unwrap_or("");
        self.metrics.record_decision(data_source, &decision.table_name);
    }

    // ------------------------------------------------------------------
    // Stage 1: custom rules
    // ------------------------------------------------------------------

    /// Applies custom selection rules in priority order.
    fn apply_rules(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        for rule in &self.rules {
            match self.rule_matches(rule, ctx) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    // A broken condition skips the rule, never the decision.
                    warn!(rule = %rule.name, error = %err, "rule condition failed; skipped");
                    self.metrics.record_error("rules");
                    if matches!(err, ExprError::Evaluation(_)) {
                        continue;
                    }
                    return None;
                }
            }
            match self.resolve_rule(rule, ctx) {
                Ok(decision) => {
                    self.metrics.record_rule_hit(&rule.name);
                    return Some(decision);
                }
                Err(err) => {
                    warn!(rule = %rule.name, error = %err, "rule resolution failed; skipped");
                    self.metrics.record_error("rules");
                }
            }
        }
        None
    }

    /// Evaluates a rule condition; an empty condition always matches.
    fn rule_matches(&self, rule: &SelectionRule, ctx: &RoutingContext) -> Result<bool, ExprError> {
        let condition = rule.condition.trim();
        if condition.is_empty() {
            return Ok(true);
        }
        let source = expression_source(condition).unwrap_or(condition);
        self.evaluator.evaluate_condition(source, ctx)
    }

    /// Resolves a matched rule into a decision.
    fn resolve_rule(
        &self,
        rule: &SelectionRule,
        ctx: &RoutingContext,
    ) -> Result<RoutingDecision, ExprError> {
        let data_source = self.resolve_text(&rule.data_source, ctx)?;
        let table = if rule.table.trim().is_empty() {
            ctx.table_name.clone()
        } else {
            self.resolve_text(&rule.table, ctx)?
        };
        Ok(RoutingDecision::new(data_source, table, format!("rule:{}", rule.name)))
    }

    /// Resolves a configured text: literal pass-through, or evaluation when
    /// marked as an expression.
    fn resolve_text(&self, text: &str, ctx: &RoutingContext) -> Result<String, ExprError> {
        match expression_source(text) {
            Some(source) => {
                let value = self.evaluator.evaluate_expression(source, ctx, ExpectedKind::Text)?;
                Ok(value_text(&value))
            }
            None => Ok(text.trim().to_string()),
        }
    }

    // ------------------------------------------------------------------
    // Stage 2: multi-tenant
    // ------------------------------------------------------------------

    /// Applies multi-tenant resolution.
    fn apply_tenant(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        let tenant_config = &self.config.multi_tenant;
        if !tenant_config.enabled {
            return None;
        }
        let resolved = match tenant_config.resolver {
            TenantResolver::Header => {
                ctx.header(&tenant_config.tenant_key).map(ToString::to_string)
            }
            TenantResolver::Parameter => {
                ctx.parameter(&tenant_config.tenant_key).map(value_text)
            }
            TenantResolver::Custom => {
                let source = expression_source(&tenant_config.custom_expression)
                    .unwrap_or(&tenant_config.custom_expression);
                match self.evaluator.evaluate_expression(source, ctx, ExpectedKind::Text) {
                    Ok(value) => Some(value_text(&value)),
                    Err(err) => {
                        warn!(error = %err, "tenant expression failed; using default tenant");
                        self.metrics.record_error("tenant");
                        None
                    }
                }
            }
        };
        let tenant = match resolved.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None if tenant_config.default_tenant.is_empty() => return None,
            None => tenant_config.default_tenant.clone(),
        };

        match tenant_config.strategy {
            TenantStrategy::Datasource => {
                tenant_config.tenant_mappings.get(&tenant).map(|data_source| {
                    RoutingDecision::new(
                        data_source.clone(),
                        ctx.table_name.clone(),
                        format!("tenant:{tenant}"),
                    )
                })
            }
            TenantStrategy::Schema => Some(RoutingDecision::table_only(
                format!("{tenant}.{}", ctx.table_name),
                format!("tenant:{tenant}"),
            )),
            TenantStrategy::Table => Some(RoutingDecision::table_only(
                format!("{}_{tenant}", ctx.table_name),
                format!("tenant:{tenant}"),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Stage 3: sharding
    // ------------------------------------------------------------------

    /// Applies per-table sharding.
    fn apply_sharding(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        let sharding = self.config.sharding.get(&ctx.table_name)?;
        if !sharding.enabled {
            return None;
        }
        let Some(shard_value) = ctx.parameter(&sharding.sharding_key) else {
            debug!(
                table = %ctx.table_name,
                key = %sharding.sharding_key,
                "shard value absent; sharding skipped"
            );
            return None;
        };

        match sharding.strategy {
            ShardStrategy::Mod | ShardStrategy::Hash => {
                let index = deterministic_hash(&value_text(shard_value))
                    % u64::from(sharding.shard_count.max(1));
                Some(shard_decision(sharding, ctx, index, None))
            }
            ShardStrategy::Range => range_shard(sharding, ctx, shard_value),
            ShardStrategy::Custom => {
                let source = expression_source(&sharding.custom_expression)
                    .unwrap_or(&sharding.custom_expression);
                match self.evaluator.evaluate_expression(source, ctx, ExpectedKind::Integer) {
                    Ok(value) => {
                        let index = value.as_i64().and_then(|index| u64::try_from(index).ok())?;
                        Some(shard_decision(sharding, ctx, index, None))
                    }
                    Err(err) => {
                        warn!(table = %ctx.table_name, error = %err, "shard expression failed");
                        self.metrics.record_error("sharding");
                        None
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage 4: read/write split
    // ------------------------------------------------------------------

    /// Applies the read/write split.
    fn apply_read_write(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        let split = &self.config.read_write;
        if !split.enabled || split.master.is_empty() {
            return None;
        }
        if ctx.operation.is_write() {
            return Some(RoutingDecision::new(
                split.master.clone(),
                ctx.table_name.clone(),
                "read_write:master",
            ));
        }
        let replica = self
            .pool
            .pick(split.strategy, &split.slaves, &split.weights)
            .unwrap_or(split.master.as_str());
        Some(RoutingDecision::new(
            replica.to_string(),
            ctx.table_name.clone(),
            "read_write:replica",
        ))
    }

    // ------------------------------------------------------------------
    // Stage 5: load balancing
    // ------------------------------------------------------------------

    /// Applies a named load-balance pool.
    fn apply_load_balance(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        let pool = self
            .config
            .load_balance
            .get(&ctx.table_name)
            .or_else(|| self.config.load_balance.get(RouterConfig::DEFAULT_POOL))?;
        let picked = self.pool.pick(pool.strategy, &pool.data_sources, &pool.weights)?;
        Some(RoutingDecision::new(
            picked.to_string(),
            ctx.table_name.clone(),
            "load_balance",
        ))
    }

    // ------------------------------------------------------------------
    // Stage 6: pluggable selectors
    // ------------------------------------------------------------------

    /// Consults pluggable selectors in registration order.
    fn apply_selectors(&self, ctx: &RoutingContext) -> Option<RoutingDecision> {
        for selector in &self.selectors {
            if !selector.supports(ctx) {
                continue;
            }
            if let Some(data_source) = selector.select(ctx).filter(|name| !name.is_empty()) {
                return Some(RoutingDecision::new(
                    data_source,
                    ctx.table_name.clone(),
                    format!("selector:{}", selector.name()),
                ));
            }
        }
        None
    }
}

// ============================================================================
// SECTION: Value Helpers
// ============================================================================

/// Resolves a range-sharded decision from the first containing range.
fn range_shard(
    sharding: &ShardingConfig,
    ctx: &RoutingContext,
    shard_value: &Value,
) -> Option<RoutingDecision> {
    let rendered = value_text(shard_value);
    let (index, range) = sharding
        .ranges
        .iter()
        .enumerate()
        .find(|(_, range)| range_contains(range, &rendered))?;
    let suffix = (!range.table_suffix.is_empty()).then(|| range.table_suffix.clone());
    let index = u64::try_from(index).ok()?;
    let mut decision = shard_decision(sharding, ctx, index, suffix);
    if !range.data_source.is_empty() {
        decision.data_source = Some(range.data_source.clone());
    }
    Some(decision)
}

/// Builds a sharded decision from an index and optional table suffix.
fn shard_decision(
    sharding: &ShardingConfig,
    ctx: &RoutingContext,
    index: u64,
    suffix: Option<String>,
) -> RoutingDecision {
    let data_source = sharding
        .data_source_mapping
        .get(&index.to_string())
        .cloned()
        .unwrap_or_else(|| format!("shard{index}"));
    let filler = suffix.unwrap_or_else(|| index.to_string());
    let table = if sharding.table_template.is_empty() {
        ctx.table_name.clone()
    } else {
        sharding.table_template.replace("{0}", &filler)
    };
    RoutingDecision::new(data_source, table, format!("sharding:{index}"))
}

/// Renders a parameter value as plain text (strings unquoted).
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Checks inclusive range containment, numeric when all three parse as
/// numbers, lexical otherwise.
fn range_contains(range: &ShardRange, value: &str) -> bool {
    let numeric = (
        value.trim().parse::<f64>(),
        range.start.trim().parse::<f64>(),
        range.end.trim().parse::<f64>(),
    );
    if let (Ok(v), Ok(start), Ok(end)) = numeric {
        return v >= start && v <= end;
    }
    value >= range.start.as_str() && value <= range.end.as_str()
}
