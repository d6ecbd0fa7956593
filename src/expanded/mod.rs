//! Bounded speculative unrolling of `Cfg2` into a DAG (§4.2): one node per
//! `(source CFG2 node, speculation depth)` pair, depth 0 being architectural
//! and depth > 0 a mis-speculated continuation taken at a branch whose
//! architecturally-taken successor differs from it.

mod node;

pub use self::node::ExpandedNode;

use crate::cfg::{self, Cfg2};
use crate::error::Result;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use std::collections::{HashMap, VecDeque};

pub type ExpandedRef = NodeIndex;

/// The expanded control-flow DAG of a single function.
#[derive(Clone, Debug, Default)]
pub struct CfgExpanded {
    graph: DiGraph<ExpandedNode, ()>,
    root: Option<ExpandedRef>,
    postorder_index: HashMap<ExpandedRef, usize>,
}

impl CfgExpanded {
    pub fn graph(&self) -> &DiGraph<ExpandedNode, ()> {
        &self.graph
    }

    pub fn root(&self) -> Result<ExpandedRef> {
        self.root.ok_or_else(|| "CfgExpanded has no root".into())
    }

    pub fn node(&self, node: ExpandedRef) -> Result<&ExpandedNode> {
        self.graph
            .node_weight(node)
            .ok_or_else(|| format!("Expanded node {:?} does not exist", node).into())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (ExpandedRef, &ExpandedNode)> {
        self.graph.node_indices().map(move |n| (n, &self.graph[n]))
    }

    pub fn predecessors(&self, node: ExpandedRef) -> Vec<ExpandedRef> {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .collect()
    }

    pub fn successors(&self, node: ExpandedRef) -> Vec<ExpandedRef> {
        self.graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
            .collect()
    }

    /// Position of `node` in a postorder DFS rooted at the entry, used by
    /// the detector's backward traceback to compare two nodes' distance from
    /// the root without re-traversing the graph each time.
    pub fn postorder_index(&self, node: ExpandedRef) -> Option<usize> {
        self.postorder_index.get(&node).copied()
    }

    /// Expand `cfg` up to `num_specs` levels of mis-speculation, bounding
    /// every path (architectural or transient) to `rob_size` instructions.
    pub fn construct(cfg: &Cfg2, num_specs: usize, rob_size: usize) -> Result<Self> {
        let mut expanded = Self::default();

        let entry = cfg.entry()?;
        let root = expanded.graph.add_node(ExpandedNode::new(entry, 0));
        expanded.root = Some(root);

        // One coalescing map per speculation depth: a given (CFG2 node,
        // depth) pair is materialized at most once, which is what keeps the
        // expansion finite in the presence of loops.
        let mut node_maps: HashMap<usize, HashMap<cfg::NodeRef, ExpandedRef>> = HashMap::new();
        node_maps.entry(0).or_default().insert(entry, root);

        struct Task {
            in_src: cfg::NodeRef,
            in_dst: cfg::NodeRef,
            src: ExpandedRef,
            spec_depth: usize,
            path_len: usize,
        }

        let mut worklist: VecDeque<Task> = VecDeque::new();
        for (succ, _edge) in cfg.successors(entry) {
            worklist.push_back(Task {
                in_src: entry,
                in_dst: succ,
                src: root,
                spec_depth: 0,
                path_len: 1,
            });
        }

        while let Some(task) = worklist.pop_front() {
            if task.path_len > rob_size {
                continue;
            }

            let map = node_maps.entry(task.spec_depth).or_default();
            let (dst, freshly_created) = match map.get(&task.in_dst) {
                Some(&existing) => (existing, false),
                None => {
                    let n = expanded
                        .graph
                        .add_node(ExpandedNode::new(task.in_dst, task.spec_depth));
                    map.insert(task.in_dst, n);
                    (n, true)
                }
            };
            expanded.graph.update_edge(task.src, dst, ());

            if !freshly_created {
                // Already expanded further below `dst` on a prior visit.
                continue;
            }

            for (succ, edge) in cfg.successors(task.in_dst) {
                // Architectural (or same-depth transient) continuation.
                worklist.push_back(Task {
                    in_src: task.in_dst,
                    in_dst: succ,
                    src: dst,
                    spec_depth: task.spec_depth,
                    path_len: task.path_len + 1,
                });

                // Mis-speculation: branch off along the non-taken edge of a
                // conditional. `spec_depth` resets neither `path_len` nor the
                // node's identity; only a fresh `(node, new_depth)` pair is
                // materialized.
                let is_alt = edge.is_conditional() && !edge.is_taken();
                if is_alt
                    && task.spec_depth + 1 <= num_specs
                    && task.path_len + 1 <= rob_size
                {
                    worklist.push_back(Task {
                        in_src: task.in_dst,
                        in_dst: succ,
                        src: dst,
                        spec_depth: task.spec_depth + 1,
                        path_len: task.path_len + 1,
                    });
                }
            }
        }

        expanded.compute_postorder_index();
        Ok(expanded)
    }

    fn compute_postorder_index(&mut self) {
        if let Some(root) = self.root {
            let mut dfs = DfsPostOrder::new(&self.graph, root);
            let mut idx = 0;
            while let Some(node) = dfs.next(&self.graph) {
                self.postorder_index.insert(node, idx);
                idx += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `entry -> branch -> (taken, alt) -> join`, branch has two successors.
    fn diamond() -> Cfg2 {
        use crate::expr::{Expression, Sort};
        use crate::instr::Instruction;

        let mut cfg = Cfg2::new();
        let entry = cfg.add_instruction(Instruction::branch(Expression::nondet(Sort::boolean())));
        let taken = cfg.add_instruction(Instruction::barrier());
        let alt = cfg.add_instruction(Instruction::barrier());
        let join = cfg.add_instruction(Instruction::barrier());
        cfg.set_entry(entry);
        cfg.add_exit(join);
        cfg.conditional_edge(entry, taken, true);
        cfg.conditional_edge(entry, alt, false);
        cfg.unconditional_edge(taken, join);
        cfg.unconditional_edge(alt, join);
        cfg
    }

    #[test]
    fn architectural_path_has_no_transient_nodes_when_num_specs_is_zero() {
        let cfg = diamond();
        let expanded = CfgExpanded::construct(&cfg, 0, 10).unwrap();
        assert!(expanded.nodes().all(|(_, n)| n.is_architectural()));
    }

    #[test]
    fn branch_alternative_is_expanded_as_transient() {
        let cfg = diamond();
        let expanded = CfgExpanded::construct(&cfg, 1, 10).unwrap();
        assert!(expanded.nodes().any(|(_, n)| n.is_transient() && n.depth() == 1));
    }

    #[test]
    fn depth_never_exceeds_num_specs() {
        let cfg = diamond();
        let expanded = CfgExpanded::construct(&cfg, 2, 10).unwrap();
        assert!(expanded.nodes().all(|(_, n)| n.depth() <= 2));
    }

    #[test]
    fn rob_size_of_zero_expands_only_the_root() {
        let cfg = diamond();
        let expanded = CfgExpanded::construct(&cfg, 2, 0).unwrap();
        assert_eq!(expanded.nodes().count(), 1);
    }

    #[test]
    fn postorder_index_is_assigned_to_every_node() {
        let cfg = diamond();
        let expanded = CfgExpanded::construct(&cfg, 1, 10).unwrap();
        for (node, _) in expanded.nodes() {
            assert!(expanded.postorder_index(node).is_some());
        }
    }
}
