//! Taint-tracking strategies consumed by the AEG's `construct_taint` phase
//! (§4.3, step 13): which symbolic memory values carry a secret.

use crate::error::Result;
use crate::expr::{Array, Expression, Sort, Variable};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A strategy for deciding whether the value a memory-op node operates on
/// is tainted, parameterized over whatever node-id type the caller's graph
/// uses (the AEG's `NodeRef`).
pub trait Taint<NodeId> {
    /// A symbolic boolean: whether the value node `at` reads or writes is
    /// tainted.
    fn flag(&mut self, at: NodeId, address: &Expression) -> Result<Expression>;
}

/// One taint flag per node, independent of any other node - the original's
/// `taint_bits = 2` pointwise scheme. Cheap, but cannot express taint that
/// depends on *which* address within an aliasing class was touched.
pub struct BitVectorTaint<NodeId> {
    flags: HashMap<NodeId, Variable>,
}

impl<NodeId> Default for BitVectorTaint<NodeId> {
    fn default() -> Self {
        Self {
            flags: HashMap::new(),
        }
    }
}

impl<NodeId> BitVectorTaint<NodeId>
where
    NodeId: Copy + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&mut self, at: NodeId) -> &Variable {
        self.flags
            .entry(at)
            .or_insert_with(|| Variable::new(format!("taint_{}", at), Sort::boolean()))
    }
}

impl<NodeId> Taint<NodeId> for BitVectorTaint<NodeId>
where
    NodeId: Copy + Eq + Hash + fmt::Display,
{
    fn flag(&mut self, at: NodeId, _address: &Expression) -> Result<Expression> {
        Ok(Expression::variable(self.variable(at).clone()))
    }
}

/// An array of taint flags, one array variable per node, threaded through
/// program order the way `mems` threads memory contents: `run` (driven by
/// the AEG construction phase) stores `true` at the address a tainted store
/// writes and propagates the prior array unchanged everywhere else.
/// Distinguishes aliasing addresses the pointwise scheme conflates.
pub struct ArrayTaint<NodeId> {
    taint_mem: HashMap<NodeId, Variable>,
}

impl<NodeId> Default for ArrayTaint<NodeId> {
    fn default() -> Self {
        Self {
            taint_mem: HashMap::new(),
        }
    }
}

impl<NodeId> ArrayTaint<NodeId>
where
    NodeId: Copy + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort() -> Sort {
        Sort::array(&Sort::word(), &Sort::boolean())
    }

    /// Binds the `taint_mem` array variable active *at* node `at` (i.e. the
    /// snapshot after every predecessor in program order has applied its
    /// effect). The AEG construction phase calls this once per node, in
    /// program order, before any `flag` query on that node.
    pub fn set_taint_mem(&mut self, at: NodeId, variable: Variable) {
        self.taint_mem.insert(at, variable);
    }

    fn taint_mem_variable(&self, at: NodeId) -> Result<&Variable> {
        self.taint_mem
            .get(&at)
            .ok_or_else(|| format!("no taint_mem bound for node {}", at).into())
    }
}

impl<NodeId> Taint<NodeId> for ArrayTaint<NodeId>
where
    NodeId: Copy + Eq + Hash + fmt::Display,
{
    fn flag(&mut self, at: NodeId, address: &Expression) -> Result<Expression> {
        let variable = self.taint_mem_variable(at)?.clone();
        Array::select(Expression::variable(variable), address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BitVector, BitVectorValue};

    #[test]
    fn bit_vector_taint_returns_the_same_variable_for_repeated_queries() {
        let mut taint: BitVectorTaint<u32> = BitVectorTaint::new();
        let addr = BitVector::constant(BitVectorValue::new(0, 64));
        let a = taint.flag(1, &addr).unwrap();
        let b = taint.flag(1, &addr).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bit_vector_taint_differs_per_node() {
        let mut taint: BitVectorTaint<u32> = BitVectorTaint::new();
        let addr = BitVector::constant(BitVectorValue::new(0, 64));
        let a = taint.flag(1, &addr).unwrap();
        let b = taint.flag(2, &addr).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn array_taint_requires_a_bound_taint_mem() {
        let mut taint: ArrayTaint<u32> = ArrayTaint::new();
        let addr = BitVector::constant(BitVectorValue::new(0, 64));
        assert!(taint.flag(1, &addr).is_err());
    }

    #[test]
    fn array_taint_selects_from_the_bound_taint_mem() {
        let mut taint: ArrayTaint<u32> = ArrayTaint::new();
        let mem = Variable::new("taint_mem_1", ArrayTaint::<u32>::sort());
        taint.set_taint_mem(1, mem);
        let addr = BitVector::constant(BitVectorValue::new(0, 64));
        let flag = taint.flag(1, &addr).unwrap();
        flag.sort().expect_boolean().unwrap();
    }
}
