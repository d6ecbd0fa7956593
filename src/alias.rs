//! Alias-analysis oracle abstraction (§4.3 `construct_aliases`): an external
//! judgement of whether two memory accesses can ever touch the same
//! address, consumed (and memoized) while building the AEG's address
//! constraints.

use std::collections::HashMap;
use std::hash::Hash;

/// The three-valued outcome an alias query can produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AliasResult {
    /// The two accesses always refer to the same address: `addr_i = addr_j`
    /// can be asserted outright.
    MustAlias,
    /// The two accesses may or may not refer to the same address: neither
    /// equality nor disequality is asserted, the relation is left free.
    MayAlias,
    /// The two accesses never refer to the same address: `addr_i ≠ addr_j`
    /// can be asserted outright.
    NoAlias,
}

/// A source of alias judgements between two memory-operation nodes,
/// identified by whatever node-id type the caller's graph uses.
pub trait AliasOracle<NodeId> {
    fn alias(&self, a: NodeId, b: NodeId) -> AliasResult;
}

/// Memoizes an underlying oracle's results keyed on the unordered pair of
/// node ids, mirroring `construct_aliases`' one-query-per-pair invariant.
pub struct AliasCache<NodeId, O> {
    oracle: O,
    memo: HashMap<(NodeId, NodeId), AliasResult>,
}

impl<NodeId, O> AliasCache<NodeId, O>
where
    NodeId: Copy + Eq + Hash + Ord,
    O: AliasOracle<NodeId>,
{
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            memo: HashMap::new(),
        }
    }

    fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Returns the memoized alias result for `(a, b)`, querying the
    /// underlying oracle on first use. `alias(a, b) == alias(b, a)`.
    pub fn query(&mut self, a: NodeId, b: NodeId) -> AliasResult {
        let key = Self::key(a, b);
        if let Some(&result) = self.memo.get(&key) {
            return result;
        }
        let result = self.oracle.alias(a, b);
        self.memo.insert(key, result);
        result
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

/// An oracle that never rules out aliasing: the conservative default when no
/// points-to information is available.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConservativeOracle;

impl<NodeId> AliasOracle<NodeId> for ConservativeOracle {
    fn alias(&self, _a: NodeId, _b: NodeId) -> AliasResult {
        AliasResult::MayAlias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(AliasResult, std::cell::Cell<usize>);

    impl AliasOracle<u32> for Fixed {
        fn alias(&self, _a: u32, _b: u32) -> AliasResult {
            self.1.set(self.1.get() + 1);
            self.0
        }
    }

    #[test]
    fn query_is_symmetric_on_node_order() {
        let mut cache = AliasCache::new(Fixed(AliasResult::MustAlias, std::cell::Cell::new(0)));
        assert_eq!(cache.query(1, 2), AliasResult::MustAlias);
        assert_eq!(cache.query(2, 1), AliasResult::MustAlias);
        assert_eq!(cache.oracle.1.get(), 1);
    }

    #[test]
    fn repeated_query_hits_the_memo() {
        let mut cache = AliasCache::new(Fixed(AliasResult::NoAlias, std::cell::Cell::new(0)));
        cache.query(5, 9);
        cache.query(5, 9);
        cache.query(9, 5);
        assert_eq!(cache.oracle.1.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn conservative_oracle_always_may_alias() {
        let oracle = ConservativeOracle::default();
        assert_eq!(AliasOracle::<u32>::alias(&oracle, 1, 2), AliasResult::MayAlias);
    }
}
