// crates/dataroute-core/src/runtime/select.rs
// ============================================================================
// Module: Pool Selection
// Description: Replica selection strategies for split and load-balance pools.
// Purpose: Pick one data source from an ordered pool.
// Dependencies: dataroute-config, rand
// ============================================================================

//! ## Overview
//! Round robin advances an atomic monotonic counter modulo the pool size, so
//! concurrent bursts spread across replicas instead of correlating on a
//! coarse clock. Random picks uniformly; weight picks by weighted random
//! with a default weight of 1. Fairness is best-effort, not guaranteed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dataroute_config::SelectStrategy;
use rand::Rng;

// ============================================================================
// SECTION: Pool Selector
// ============================================================================

/// Stateful pool selector shared by all pools of one engine.
///
/// # Invariants
/// - The round-robin counter only ever advances; it is never derived from
///   wall-clock time.
#[derive(Debug, Default)]
pub struct PoolSelector {
    /// Monotonic counter for round-robin selection.
    counter: AtomicU64,
}

impl PoolSelector {
    /// Creates a selector with the counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks one member from the pool per the strategy, or `None` when the
    /// pool is empty.
    #[must_use]
    pub fn pick<'pool>(
        &self,
        strategy: SelectStrategy,
        pool: &'pool [String],
        weights: &BTreeMap<String, u32>,
    ) -> Option<&'pool str> {
        if pool.is_empty() {
            return None;
        }
        let index = match strategy {
            SelectStrategy::RoundRobin => {
                let tick = self.counter.fetch_add(1, Ordering::Relaxed);
                usize::try_from(tick % pool.len() as u64).unwrap_or(0)
            }
            SelectStrategy::Random => rand::thread_rng().gen_range(0 .. pool.len()),
            SelectStrategy::Weight => weighted_index(pool, weights),
        };
        pool.get(index).map(String::as_str)
    }
}

/// Picks a pool index by weighted random; unlisted members weigh 1.
fn weighted_index(pool: &[String], weights: &BTreeMap<String, u32>) -> usize {
    let weight_of = |name: &String| u64::from(weights.get(name).copied().unwrap_or(1).max(1));
    let total: u64 = pool.iter().map(weight_of).sum();
    let mut remaining = rand::thread_rng().gen_range(0 .. total);
    for (index, name) in pool.iter().enumerate() {
        let weight = weight_of(name);
        if remaining < weight {
            return index;
        }
        remaining -= weight;
    }
    pool.len() - 1
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let selector = PoolSelector::new();
        let members = pool(&["s1", "s2", "s3"]);
        let picks: Vec<&str> = (0 .. 6)
            .filter_map(|_| selector.pick(SelectStrategy::RoundRobin, &members, &BTreeMap::new()))
            .collect();
        assert_eq!(picks, ["s1", "s2", "s3", "s1", "s2", "s3"]);
    }

    #[test]
    fn empty_pool_yields_none() {
        let selector = PoolSelector::new();
        assert!(selector.pick(SelectStrategy::RoundRobin, &[], &BTreeMap::new()).is_none());
    }

    #[test]
    fn weighted_pick_prefers_heavy_members() {
        let selector = PoolSelector::new();
        let members = pool(&["light", "heavy"]);
        let mut weights = BTreeMap::new();
        weights.insert("heavy".to_string(), 50);

        let mut heavy_hits = 0_u32;
        for _ in 0 .. 500 {
            if selector.pick(SelectStrategy::Weight, &members, &weights) == Some("heavy") {
                heavy_hits += 1;
            }
        }
        assert!(heavy_hits > 400, "heavy member picked only {heavy_hits}/500 times");
    }

    #[test]
    fn random_pick_stays_in_pool() {
        let selector = PoolSelector::new();
        let members = pool(&["a", "b"]);
        for _ in 0 .. 50 {
            let pick = selector.pick(SelectStrategy::Random, &members, &BTreeMap::new());
            assert!(matches!(pick, Some("a" | "b")));
        }
    }
}
