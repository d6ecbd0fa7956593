//! `CFG2`: the un-expanded, single-execution control-flow graph a function
//! lowers to before speculative expansion (`crate::expanded`). Nodes are
//! individual instructions - not basic blocks - so that every later phase
//! (expansion, AEG construction) can mint its fresh per-node symbols
//! (`addr`, `data`, ...) directly against one instruction.

mod edge;

pub use self::edge::Edge;

use crate::error::{Result, ResultExt};
use crate::instr::Instruction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

pub type NodeRef = NodeIndex;

/// The control-flow graph of a single function, at instruction granularity.
/// `Edge::Conditional(true)` marks the successor taken when the source
/// instruction's `Branch` condition evaluates true - this is what the
/// expansion in `crate::expanded` consults to tell "architecturally taken"
/// from "every other, possibly mis-speculated, successor" apart.
#[derive(Clone, Debug, Default)]
pub struct Cfg2 {
    graph: DiGraph<Instruction, Edge>,
    entry: Option<NodeRef>,
    exits: Vec<NodeRef>,
}

impl Cfg2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &DiGraph<Instruction, Edge> {
        &self.graph
    }

    pub fn add_instruction(&mut self, instruction: Instruction) -> NodeRef {
        self.graph.add_node(instruction)
    }

    pub fn instruction(&self, node: NodeRef) -> Result<&Instruction> {
        self.graph
            .node_weight(node)
            .ok_or_else(|| format!("Node {:?} does not exist", node).into())
    }

    pub fn instruction_mut(&mut self, node: NodeRef) -> Result<&mut Instruction> {
        self.graph
            .node_weight_mut(node)
            .ok_or_else(|| format!("Node {:?} does not exist", node).into())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeRef, &Instruction)> {
        self.graph.node_indices().map(move |n| (n, &self.graph[n]))
    }

    pub fn add_edge(&mut self, src: NodeRef, dst: NodeRef, edge: Edge) -> EdgeIndex {
        self.graph.add_edge(src, dst, edge)
    }

    pub fn unconditional_edge(&mut self, src: NodeRef, dst: NodeRef) -> EdgeIndex {
        self.add_edge(src, dst, Edge::Unconditional)
    }

    pub fn conditional_edge(&mut self, src: NodeRef, dst: NodeRef, taken: bool) -> EdgeIndex {
        self.add_edge(src, dst, Edge::Conditional(taken))
    }

    pub fn entry(&self) -> Result<NodeRef> {
        self.entry.ok_or_else(|| "CFG2 has no entry set".into())
    }

    pub fn set_entry(&mut self, node: NodeRef) {
        self.entry = Some(node);
    }

    pub fn exits(&self) -> &[NodeRef] {
        &self.exits
    }

    pub fn add_exit(&mut self, node: NodeRef) {
        self.exits.push(node);
    }

    pub fn successors(&self, node: NodeRef) -> Vec<(NodeRef, Edge)> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect()
    }

    pub fn predecessors(&self, node: NodeRef) -> Vec<NodeRef> {
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .collect()
    }

    /// The successor taken when the node's branch condition evaluates
    /// `true`, if any.
    pub fn taken_successor(&self, node: NodeRef) -> Option<NodeRef> {
        self.successors(node)
            .into_iter()
            .find(|(_, edge)| matches!(edge, Edge::Conditional(true)))
            .map(|(n, _)| n)
    }

    pub fn topological_order(&self) -> Result<Vec<NodeRef>> {
        petgraph::algo::toposort(&self.graph, None).chain_err(|| "CFG2 contains a cycle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;

    fn diamond() -> (Cfg2, NodeRef, NodeRef, NodeRef, NodeRef) {
        let mut cfg = Cfg2::new();
        let entry = cfg.add_instruction(Instruction::branch(Expression::nondet(
            crate::expr::Sort::boolean(),
        )));
        let taken = cfg.add_instruction(Instruction::barrier());
        let not_taken = cfg.add_instruction(Instruction::barrier());
        let exit = cfg.add_instruction(Instruction::barrier());
        cfg.set_entry(entry);
        cfg.add_exit(exit);
        cfg.conditional_edge(entry, taken, true);
        cfg.conditional_edge(entry, not_taken, false);
        cfg.unconditional_edge(taken, exit);
        cfg.unconditional_edge(not_taken, exit);
        (cfg, entry, taken, not_taken, exit)
    }

    #[test]
    fn taken_successor_picks_the_true_edge() {
        let (cfg, entry, taken, _not_taken, _exit) = diamond();
        assert_eq!(cfg.taken_successor(entry), Some(taken));
    }

    #[test]
    fn successors_include_both_branches() {
        let (cfg, entry, taken, not_taken, _exit) = diamond();
        let mut succs: Vec<NodeRef> = cfg.successors(entry).into_iter().map(|(n, _)| n).collect();
        succs.sort();
        let mut expected = vec![taken, not_taken];
        expected.sort();
        assert_eq!(succs, expected);
    }

    #[test]
    fn predecessors_of_exit_are_both_branch_targets() {
        let (cfg, _entry, taken, not_taken, exit) = diamond();
        let mut preds = cfg.predecessors(exit);
        preds.sort();
        let mut expected = vec![taken, not_taken];
        expected.sort();
        assert_eq!(preds, expected);
    }

    #[test]
    fn topological_order_respects_edges() {
        let (cfg, entry, _taken, _not_taken, exit) = diamond();
        let order = cfg.topological_order().unwrap();
        let entry_pos = order.iter().position(|&n| n == entry).unwrap();
        let exit_pos = order.iter().position(|&n| n == exit).unwrap();
        assert!(entry_pos < exit_pos);
    }
}
