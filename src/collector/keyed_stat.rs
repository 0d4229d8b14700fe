use std::collections::HashMap;
use std::hash::Hash;

use crate::collector::rolling_stat::RollingStat;

/// A mapping from some per-container/per-package key to a `RollingStat`,
/// used for metrics that are sourced per-container (cgroup I/O, cgroupfs
/// stats) or per-package (RAPL) but also have a natural pod/node-level sum.
#[derive(Debug, Clone, Default)]
pub struct KeyedStat<K: Eq + Hash> {
    by_key: HashMap<K, RollingStat>,
}

impl<K: Eq + Hash + Clone> KeyedStat<K> {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
        }
    }

    /// Look up or insert the `RollingStat` under `key` and apply
    /// `add_new_current(value)`. Overflow is logged by the caller and the
    /// affected key's state is simply left unchanged for this tick.
    pub fn add_stat(&mut self, key: K, value: u64) {
        let stat = self.by_key.entry(key).or_insert_with(RollingStat::new);
        let _ = stat.add_new_current(value);
    }

    /// Look up or insert the `RollingStat` under `key` and apply
    /// `set_new_aggregate(new_aggr)` — for keyed sources that hand back a
    /// monotonic total rather than a per-tick delta (e.g. per-package RAPL
    /// counters).
    pub fn set_aggregate(&mut self, key: K, new_aggr: u64) {
        let stat = self.by_key.entry(key).or_insert_with(RollingStat::new);
        stat.set_new_aggregate(new_aggr);
    }

    pub fn sum_curr(&self) -> u64 {
        self.by_key.values().map(RollingStat::get_curr).sum()
    }

    pub fn sum_aggr(&self) -> u64 {
        self.by_key.values().map(RollingStat::get_aggr).sum()
    }

    pub fn get(&self, key: &K) -> Option<&RollingStat> {
        self.by_key.get(key)
    }

    pub fn reset_current(&mut self) {
        for stat in self.by_key.values_mut() {
            stat.reset_current();
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.by_key.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &RollingStat)> {
        self.by_key.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_curr_is_sum_of_keys_touched_this_tick() {
        let mut ks: KeyedStat<&str> = KeyedStat::new();
        ks.add_stat("a", 10);
        ks.add_stat("b", 20);
        assert_eq!(ks.sum_curr(), 30);

        ks.reset_current();
        ks.add_stat("a", 5);
        // "b" untouched this tick contributes 0
        assert_eq!(ks.sum_curr(), 5);
        assert_eq!(ks.sum_aggr(), 35);
    }

    #[test]
    fn reset_current_is_per_key() {
        let mut ks: KeyedStat<&str> = KeyedStat::new();
        ks.add_stat("a", 10);
        ks.reset_current();
        assert_eq!(ks.get(&"a").unwrap().get_curr(), 0);
        assert_eq!(ks.get(&"a").unwrap().get_aggr(), 10);
    }
}
