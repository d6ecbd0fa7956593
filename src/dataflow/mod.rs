//! Generic forward dataflow fixpoint (§4.1) plus its two instantiations:
//! `AddressDependencyAnalysis` and `DataDependencyAnalysis`.

mod address;
mod data;

pub use self::address::AddressDependencyAnalysis;
pub use self::data::DataDependencyAnalysis;

use crate::cfg::{Cfg2, NodeRef};
use crate::error::Result;
use crate::instr::Instruction;
use std::collections::{HashMap, HashSet, VecDeque};

/// A handle to a single instruction: its `Cfg2` node.
pub type InstRef = NodeRef;

/// Destination-to-sources mapping consumed by the AEG's address/data/control
/// construction phases.
pub type BinaryInstRel = HashMap<InstRef, HashSet<InstRef>>;

/// The lattice an analysis computes over, plus the per-instruction transfer
/// function. `meet` must be commutative, associative and idempotent;
/// `transfer` must be monotonic with respect to `meet` so the worklist
/// iteration below terminates.
pub trait Analysis {
    type Value: Clone + PartialEq;

    fn top(&self) -> Self::Value;

    fn meet(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    fn transfer(&self, at: InstRef, inst: &Instruction, in_: &Self::Value) -> Self::Value;

    fn entry(&self) -> Self::Value {
        self.top()
    }
}

/// Per-node `in`/`out` values of a completed fixpoint computation.
pub struct FixpointResult<V> {
    in_: HashMap<NodeRef, V>,
    out: HashMap<NodeRef, V>,
}

impl<V> FixpointResult<V> {
    pub fn node_in(&self, node: NodeRef) -> Option<&V> {
        self.in_.get(&node)
    }

    pub fn node_out(&self, node: NodeRef) -> Option<&V> {
        self.out.get(&node)
    }
}

/// Runs `analysis` to a fixpoint over `cfg`, in forward direction: a node's
/// `in` is the meet of its predecessors' `out`, and its `out` is `transfer`
/// applied once to that `in`.
pub fn run<A: Analysis>(cfg: &Cfg2, analysis: &A) -> Result<FixpointResult<A::Value>> {
    let entry = cfg.entry()?;

    let mut in_: HashMap<NodeRef, A::Value> = HashMap::new();
    let mut out: HashMap<NodeRef, A::Value> = HashMap::new();
    for (node, _) in cfg.nodes() {
        in_.insert(node, analysis.top());
        out.insert(node, analysis.top());
    }
    in_.insert(entry, analysis.entry());

    let mut worklist: VecDeque<NodeRef> = cfg.nodes().map(|(n, _)| n).collect();
    while let Some(node) = worklist.pop_front() {
        let new_in = if node == entry {
            analysis.entry()
        } else {
            let mut preds = cfg.predecessors(node).into_iter();
            match preds.next() {
                None => analysis.top(),
                Some(first) => preds.fold(out[&first].clone(), |acc, pred| {
                    analysis.meet(&acc, &out[&pred])
                }),
            }
        };

        let inst = cfg.instruction(node)?;
        let value = analysis.transfer(node, inst, &new_in);

        let changed = in_.get(&node) != Some(&new_in) || out.get(&node) != Some(&value);
        in_.insert(node, new_in);
        out.insert(node, value);

        if changed {
            for (succ, _) in cfg.successors(node) {
                if !worklist.contains(&succ) {
                    worklist.push_back(succ);
                }
            }
        }
    }

    Ok(FixpointResult { in_, out })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ReachingLoads;

    impl Analysis for ReachingLoads {
        type Value = HashSet<InstRef>;

        fn top(&self) -> Self::Value {
            HashSet::new()
        }

        fn meet(&self, a: &Self::Value, b: &Self::Value) -> Self::Value {
            a.union(b).cloned().collect()
        }

        fn transfer(&self, at: InstRef, inst: &Instruction, in_: &Self::Value) -> Self::Value {
            let mut out = in_.clone();
            if inst.is_load() {
                out.insert(at);
            }
            out
        }
    }

    fn loop_cfg() -> (Cfg2, NodeRef) {
        use crate::expr::{Expression, Variable};

        let mut cfg = Cfg2::new();
        let entry = cfg.add_instruction(Instruction::barrier());
        let r = Variable::new("r", crate::expr::Sort::bit_vector(64));
        let addr = Variable::new("a", crate::expr::Sort::bit_vector(64));
        let load = cfg.add_instruction(Instruction::load(r.clone(), Expression::variable(addr)));
        let branch = cfg.add_instruction(Instruction::branch(Expression::variable(r)));
        let exit = cfg.add_instruction(Instruction::barrier());
        cfg.set_entry(entry);
        cfg.add_exit(exit);

        cfg.unconditional_edge(entry, load);
        cfg.unconditional_edge(load, branch);
        cfg.conditional_edge(branch, load, true);
        cfg.conditional_edge(branch, exit, false);
        (cfg, branch)
    }

    #[test]
    fn fixpoint_terminates_on_a_cyclic_cfg_and_captures_the_load() {
        let (cfg, branch) = loop_cfg();
        let analysis = ReachingLoads::default();
        let result = run(&cfg, &analysis).unwrap();
        assert_eq!(result.node_out(branch).unwrap().len(), 1);
    }
}
