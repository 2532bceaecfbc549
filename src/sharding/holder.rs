// Rule Holder
//
// Process-wide reference to the current rule snapshot. Queries clone the
// `Arc` once and keep using that snapshot; a reload swaps the whole rule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use super::rule::ShardingRule;

#[derive(Debug)]
pub struct RuleHolder {
    current: RwLock<Arc<ShardingRule>>,
    generation: AtomicU64,
}

impl RuleHolder {
    pub fn new(rule: ShardingRule) -> Self {
        RuleHolder { current: RwLock::new(Arc::new(rule)), generation: AtomicU64::new(1) }
    }

    /// The rule in force right now
    pub fn snapshot(&self) -> Arc<ShardingRule> {
        self.current.read().clone()
    }

    /// Replace the rule; returns the new generation
    pub fn swap(&self, rule: ShardingRule) -> u64 {
        let mut current = self.current.write();
        *current = Arc::new(rule);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Sharding rule replaced, generation {}", generation);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
