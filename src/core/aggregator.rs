//! Per-queue-key result aggregation with exactly-once finalize.

use std::collections::HashMap;

use super::interrogator::ResultBag;

/// Aggregated results for one queue key: item name to result bag.
pub type BatchResults = HashMap<String, ResultBag>;

/// Holds the partial/complete results of every open batch.
///
/// Each queue key owns a name-to-bag mapping that grows monotonically while
/// the batch is open and is removed wholesale by `pop_all`. The engine wraps
/// the aggregator in a mutex; methods here assume exclusive access.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    batches: HashMap<String, BatchResults>,
}

impl ResultAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is already recorded (pending or complete) under `queue_key`.
    pub fn contains(&self, queue_key: &str, name: &str) -> bool {
        self.batches
            .get(queue_key)
            .is_some_and(|batch| batch.contains_key(name))
    }

    /// Resolve a caller-supplied name against the names already taken under
    /// `queue_key`, appending `#0`, `#1`, ... until an unused name is found.
    pub fn resolve_name(&self, queue_key: &str, name: &str) -> String {
        if !self.contains(queue_key, name) {
            return name.to_string();
        }
        let mut j = 0;
        loop {
            let candidate = format!("{name}#{j}");
            if !self.contains(queue_key, &candidate) {
                return candidate;
            }
            j += 1;
        }
    }

    /// Pre-register `name` under `queue_key` with an empty bag so concurrent
    /// readers observe the item as pending.
    pub fn register(&mut self, queue_key: &str, name: &str) {
        self.batches
            .entry(queue_key.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default();
    }

    /// Store the bag for `name` under `queue_key`. Each name is written by
    /// exactly one dispatched task, so overwriting the pre-registered empty
    /// bag is the only overwrite that occurs.
    pub fn insert(&mut self, queue_key: &str, name: &str, bag: ResultBag) {
        self.batches
            .entry(queue_key.to_string())
            .or_default()
            .insert(name.to_string(), bag);
    }

    /// Atomically remove and return the full mapping for `queue_key`.
    ///
    /// Returns `None` when the key has no recorded results; a key may be
    /// popped at most once and is absent afterwards until reused.
    pub fn pop_all(&mut self, queue_key: &str) -> Option<BatchResults> {
        self.batches.remove(queue_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_insert() {
        let mut agg = ResultAggregator::new();
        agg.register("b", "x");
        assert!(agg.contains("b", "x"));

        agg.insert("b", "x", ResultBag::from([("cat".to_string(), 0.9)]));
        let popped = agg.pop_all("b").unwrap();
        assert_eq!(popped["x"]["cat"], 0.9);
    }

    #[test]
    fn test_resolve_name_appends_first_unused_suffix() {
        let mut agg = ResultAggregator::new();
        assert_eq!(agg.resolve_name("b", "img"), "img");

        agg.register("b", "img");
        assert_eq!(agg.resolve_name("b", "img"), "img#0");

        agg.register("b", "img#0");
        agg.register("b", "img#1");
        assert_eq!(agg.resolve_name("b", "img"), "img#2");
    }

    #[test]
    fn test_names_are_scoped_per_queue_key() {
        let mut agg = ResultAggregator::new();
        agg.register("a", "x");
        assert!(!agg.contains("b", "x"));
        assert_eq!(agg.resolve_name("b", "x"), "x");
    }

    #[test]
    fn test_pop_all_is_exactly_once() {
        let mut agg = ResultAggregator::new();
        agg.register("b", "x");
        assert!(agg.pop_all("b").is_some());
        assert!(agg.pop_all("b").is_none());

        // The key is reusable after popping.
        agg.register("b", "y");
        assert!(agg.contains("b", "y"));
    }

    #[test]
    fn test_pop_unknown_key() {
        let mut agg = ResultAggregator::new();
        assert!(agg.pop_all("missing").is_none());
    }
}
