//! The Abstract Event Graph (§3): a symbolic event graph over one function's
//! expanded, speculative instruction stream. Each node carries the booleans
//! and bitvector symbols `construct` derives from the instruction it mirrors;
//! `Po`/`Tfo`/`Addr`/`Data`/`Ctrl` are stored edges, while the communication
//! relations (`RF`/`CO`/`FR`/`RFX`/`COX`/`FRX`) are pseudo-edges the detector
//! queries on demand through `rf_exists` and its siblings, never materialized
//! in the graph (grounded on `aeg/aeg.h`'s `is_pseudoedge`).

pub mod constraints;
mod edge;
mod node;

pub use self::constraints::Constraints;
pub use self::edge::{ComKind, ComxKind, Edge, Kind as EdgeKind};
pub use self::node::Node;

use crate::alias::{AliasOracle, AliasResult};
use crate::cfg::{self, Cfg2};
use crate::dataflow::BinaryInstRel;
use crate::environment::{Environment, TaintStrategy};
use crate::error::{Result, ResultExt};
use crate::expanded::{CfgExpanded, ExpandedRef};
use crate::expr::{Array, BitVector, Boolean, Expression, Sort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::HashMap;

pub type NodeRef = NodeIndex;

/// The AEG of a single function.
pub struct Aeg {
    graph: DiGraph<Node, Edge>,
    expanded_to_node: HashMap<ExpandedRef, NodeRef>,
    cfg_to_expanded: HashMap<cfg::NodeRef, Vec<ExpandedRef>>,
    topo: Vec<NodeRef>,
    postorder_index: HashMap<NodeRef, usize>,
    entry: Option<NodeRef>,
    exits: Vec<NodeRef>,
    constraints: Constraints,
}

impl Aeg {
    pub fn graph(&self) -> &DiGraph<Node, Edge> {
        &self.graph
    }

    pub fn node(&self, node: NodeRef) -> Result<&Node> {
        self.graph
            .node_weight(node)
            .ok_or_else(|| format!("AEG node {:?} does not exist", node).into())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.graph.node_indices().map(move |n| (n, &self.graph[n]))
    }

    pub fn entry(&self) -> Result<NodeRef> {
        self.entry.ok_or_else(|| "AEG has no entry".into())
    }

    pub fn exits(&self) -> &[NodeRef] {
        &self.exits
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn node_for_expanded(&self, expanded: ExpandedRef) -> Option<NodeRef> {
        self.expanded_to_node.get(&expanded).copied()
    }

    /// The expanded CFG's postorder index of `node`, used by the detector to
    /// order candidate sourced stores relative to a bypassed store
    /// (`aeg.po.postorder_idx` in the original).
    pub fn postorder_index(&self, node: NodeRef) -> Option<usize> {
        self.postorder_index.get(&node).copied()
    }

    /// Resolves the instruction a node mirrors. `Aeg` does not retain the
    /// `CfgExpanded`/`Cfg2` it was built from, so callers (the detector,
    /// witness rendering) pass them back in.
    pub fn instruction_for<'e>(
        &self,
        node: NodeRef,
        expanded: &CfgExpanded,
        cfg: &'e Cfg2,
    ) -> Result<&'e crate::instr::Instruction> {
        let source = self.node(node)?.source();
        let cfg_node = expanded.node(source)?.source();
        cfg.instruction(cfg_node)
    }

    /// Whether `store` may still service `load` out of the store buffer,
    /// i.e. lies no further back than `rob_size` in postorder (`may_source_stb`
    /// in the original). The postorder DFS visits the entry last, so an
    /// *older* node (the store) has a *larger* index than a later one (the
    /// load) — `store_idx >= load_idx` is "store is not newer than load".
    pub fn may_source_stb(&self, load: NodeRef, store: NodeRef, rob_size: usize) -> bool {
        match (self.postorder_index(load), self.postorder_index(store)) {
            (Some(load_idx), Some(store_idx)) => {
                store_idx >= load_idx && store_idx - load_idx <= rob_size
            }
            _ => false,
        }
    }

    /// Builds the AEG for one function: the speculative node set, its
    /// architectural/extended orders, the `mems` baseline and the taint
    /// annotation, in the fixed phase order `aeg/aeg.h`'s `construct` runs.
    pub fn construct<O>(
        expanded: &CfgExpanded,
        cfg: &Cfg2,
        addr_rel: &BinaryInstRel,
        data_rel: &BinaryInstRel,
        ctrl_rel: &BinaryInstRel,
        alias_oracle: &O,
        env: &Environment,
    ) -> Result<Self>
    where
        O: AliasOracle<cfg::NodeRef>,
    {
        let mut aeg = Self {
            graph: DiGraph::new(),
            expanded_to_node: HashMap::new(),
            cfg_to_expanded: HashMap::new(),
            topo: Vec::new(),
            postorder_index: HashMap::new(),
            entry: None,
            exits: Vec::new(),
            constraints: Constraints::new(),
        };

        aeg.construct_nodes(expanded, cfg)?;
        aeg.construct_exec()?;
        aeg.construct_arch(expanded, cfg)?;
        aeg.construct_trans(expanded)?;
        aeg.construct_po_tfo(expanded)?;
        aeg.construct_addr_defs(expanded, cfg)?;
        aeg.construct_aliases(expanded, alias_oracle)?;
        aeg.construct_arch_order()?;
        aeg.construct_xsaccess_order()?;
        aeg.construct_mem()?;
        aeg.construct_addr_data_ctrl(expanded, addr_rel, data_rel, ctrl_rel)?;
        aeg.construct_taint(env)?;

        Ok(aeg)
    }

    fn construct_nodes(&mut self, expanded: &CfgExpanded, cfg: &Cfg2) -> Result<()> {
        let topo_expanded = petgraph::algo::toposort(expanded.graph(), None)
            .chain_err(|| "expanded CFG contains a cycle")?;

        for expanded_ref in &topo_expanded {
            let expanded_node = expanded.node(*expanded_ref)?;
            let instruction = cfg.instruction(expanded_node.source())?;
            let index = self.graph.node_count();
            let node = Node::new(
                index,
                *expanded_ref,
                instruction.is_store(),
                instruction.is_load(),
            );
            let node_ref = self.graph.add_node(node);
            self.expanded_to_node.insert(*expanded_ref, node_ref);
            self.cfg_to_expanded
                .entry(expanded_node.source())
                .or_default()
                .push(*expanded_ref);
            self.topo.push(node_ref);
            if let Some(idx) = expanded.postorder_index(*expanded_ref) {
                self.postorder_index.insert(node_ref, idx);
            }
        }

        self.entry = Some(self.node_for_expanded(expanded.root()?).ok_or("no entry")?);
        for &exit in cfg.exits() {
            for &expanded_ref in self.cfg_to_expanded.get(&exit).into_iter().flatten() {
                if expanded.node(expanded_ref)?.depth() == 0 {
                    self.exits
                        .push(self.node_for_expanded(expanded_ref).ok_or("no exit")?);
                }
            }
        }

        Ok(())
    }

    /// `exec ↔ arch ∨ trans`, `¬(arch ∧ trans)`, and exactly one architectural
    /// path reaches an exit.
    fn construct_exec(&mut self) -> Result<()> {
        for node_ref in self.topo.clone() {
            let node = self.node(node_ref)?.clone();
            let exec_def = Boolean::or(node.arch(), node.trans())?;
            self.constraints.add(
                Expression::equal(node.exec(), exec_def)?,
                format!("exec_def_{:?}", node_ref),
            );
            let mutually_exclusive = Boolean::not(Boolean::and(node.arch(), node.trans())?)?;
            self.constraints
                .add(mutually_exclusive, format!("arch_trans_excl_{:?}", node_ref));
        }

        if !self.exits.is_empty() {
            let arches: Vec<Expression> = self
                .exits
                .iter()
                .map(|&e| self.graph[e].arch())
                .collect();
            self.constraints
                .add(Boolean::disjunction(&arches)?, "exactly_one_exit_at_least");

            for i in 0..self.exits.len() {
                for j in (i + 1)..self.exits.len() {
                    let both = Boolean::and(self.graph[self.exits[i]].arch(), self.graph[self.exits[j]].arch())?;
                    self.constraints.add(
                        Boolean::not(both)?,
                        format!("exactly_one_exit_most_{}_{}", i, j),
                    );
                }
            }
        }

        Ok(())
    }

    fn branch_condition<'c>(cfg: &'c Cfg2, node: cfg::NodeRef) -> Option<&'c Expression> {
        match cfg.instruction(node).ok()?.kind() {
            crate::instr::Kind::Branch { condition } => Some(condition),
            _ => None,
        }
    }

    fn selected_edge(cfg: &Cfg2, src: cfg::NodeRef, edge: cfg::Edge) -> Result<Expression> {
        match edge {
            cfg::Edge::Unconditional => Ok(Boolean::constant(true)),
            cfg::Edge::Conditional(taken) => {
                let condition = Self::branch_condition(cfg, src)
                    .ok_or("Conditional edge out of a non-branch instruction")?
                    .clone();
                if taken {
                    Ok(condition)
                } else {
                    Boolean::not(condition)
                }
            }
        }
    }

    /// Depth > 0 nodes are never architectural; the entry always is; every
    /// other depth-0 node is architectural iff some depth-0 predecessor is
    /// architectural and took the edge that leads to it.
    fn construct_arch(&mut self, expanded: &CfgExpanded, cfg: &Cfg2) -> Result<()> {
        let entry = self.entry()?;
        self.constraints.add(self.graph[entry].arch(), "entry_is_architectural");

        for node_ref in self.topo.clone() {
            let expanded_ref = self.node(node_ref)?.source();
            let depth = expanded.node(expanded_ref)?.depth();

            if depth > 0 {
                self.constraints.add(
                    Boolean::not(self.graph[node_ref].arch())?,
                    format!("transient_never_architectural_{:?}", node_ref),
                );
                continue;
            }
            if node_ref == entry {
                continue;
            }

            let dst_source = expanded.node(expanded_ref)?.source();
            let mut terms = Vec::new();
            for pred_expanded in expanded.predecessors(expanded_ref) {
                if expanded.node(pred_expanded)?.depth() != 0 {
                    continue;
                }
                let pred_node = self.node_for_expanded(pred_expanded).ok_or("missing pred")?;
                let pred_source = expanded.node(pred_expanded)?.source();
                let edge = cfg
                    .successors(pred_source)
                    .into_iter()
                    .find(|(succ, _)| *succ == dst_source)
                    .map(|(_, e)| e)
                    .ok_or("expanded edge has no CFG2 counterpart")?;
                let selected = Self::selected_edge(cfg, pred_source, edge)?;
                terms.push(Boolean::and(self.graph[pred_node].arch(), selected)?);
            }

            let rhs = Boolean::disjunction(&terms)?;
            self.constraints.add(
                Expression::equal(self.graph[node_ref].arch(), rhs)?,
                format!("arch_def_{:?}", node_ref),
            );
        }

        Ok(())
    }

    /// Depth 0 nodes are never transient. A depth > 0 node's `trans` holds
    /// iff it was reached either by misprediction off a branch one depth
    /// shallower that itself executed architecturally (what becomes a `Tfo`
    /// edge in `construct_po_tfo`), or by continuing, at the same depth,
    /// from a predecessor that is itself already transient (what becomes a
    /// `Po` edge among depth > 0 nodes). Without this, `trans` is a free
    /// boolean and `rfx_exists` is satisfiable by speculation that was
    /// never actually triggered by a mispredicted branch.
    ///
    /// The ≤ `rob_size` bound on transient path length is already enforced
    /// structurally: `CfgExpanded::construct` never materializes a node
    /// past that bound, so there is no predecessor to chain `trans` through
    /// beyond it.
    fn construct_trans(&mut self, expanded: &CfgExpanded) -> Result<()> {
        for node_ref in self.topo.clone() {
            let expanded_ref = self.node(node_ref)?.source();
            let depth = expanded.node(expanded_ref)?.depth();

            if depth == 0 {
                self.constraints.add(
                    Boolean::not(self.graph[node_ref].trans())?,
                    format!("trans_never_architectural_{:?}", node_ref),
                );
                continue;
            }

            let mut terms = Vec::new();
            for pred_expanded in expanded.predecessors(expanded_ref) {
                let pred_node = self.node_for_expanded(pred_expanded).ok_or("missing pred")?;
                let pred_depth = expanded.node(pred_expanded)?.depth();
                if pred_depth == depth {
                    terms.push(self.graph[pred_node].trans());
                } else {
                    terms.push(self.graph[pred_node].arch());
                }
            }

            let rhs = Boolean::disjunction(&terms)?;
            self.constraints.add(
                Expression::equal(self.graph[node_ref].trans(), rhs)?,
                format!("trans_def_{:?}", node_ref),
            );
        }

        Ok(())
    }

    fn construct_po_tfo(&mut self, expanded: &CfgExpanded) -> Result<()> {
        for edge in expanded.graph().edge_references() {
            let src_expanded = edge.source();
            let dst_expanded = edge.target();
            let src = self.node_for_expanded(src_expanded).ok_or("missing src")?;
            let dst = self.node_for_expanded(dst_expanded).ok_or("missing dst")?;

            let src_depth = expanded.node(src_expanded)?.depth();
            let dst_depth = expanded.node(dst_expanded)?.depth();
            let kind = if dst_depth == src_depth {
                EdgeKind::Po
            } else {
                EdgeKind::Tfo
            };

            let exists = Boolean::and(self.graph[src].exec(), self.graph[dst].exec())?;
            self.graph.add_edge(src, dst, Edge::new(kind, exists));
        }
        Ok(())
    }

    fn to_word(expr: Expression) -> Result<Expression> {
        if expr.sort().is_word() {
            Ok(expr)
        } else if expr.sort().is_bit_vector() {
            BitVector::zero_extend_to_word(expr)
        } else {
            Err("address/data operand must be a bitvector".into())
        }
    }

    /// Ties each memory-op node's fresh `addr` (and, for stores, `data`)
    /// symbol to the expression its source instruction actually computes.
    /// Loads' `data` is left to `construct_mem`, which defines it from the
    /// threaded memory state instead.
    fn construct_addr_defs(&mut self, expanded: &CfgExpanded, cfg: &Cfg2) -> Result<()> {
        for node_ref in self.topo.clone() {
            let node = self.node(node_ref)?;
            if !node.is_memory_op() {
                continue;
            }
            let source = expanded.node(node.source())?.source();
            let instruction = cfg.instruction(source)?;

            let address = instruction
                .access_address()
                .ok_or("memory-op node without an address operand")?
                .clone();
            let addr_var = node.addr().ok_or("memory-op node without addr symbol")?;
            self.constraints.add(
                Expression::equal(addr_var, Self::to_word(address)?)?,
                format!("addr_def_{:?}", node_ref),
            );

            if node.is_write() {
                let value = instruction
                    .store_value()
                    .ok_or("store node without a stored value")?
                    .clone();
                let data_var = node.data().ok_or("store node without data symbol")?;
                self.constraints.add(
                    Expression::equal(data_var, Self::to_word(value)?)?,
                    format!("data_def_{:?}", node_ref),
                );
            }
        }
        Ok(())
    }

    /// Consults `alias_oracle` once per pair of memory-op nodes sharing a
    /// CFG2 source identity, asserting the equality or disequality a
    /// conclusive verdict licenses (`MayAlias` leaves the relation free).
    fn construct_aliases<O>(&mut self, expanded: &CfgExpanded, alias_oracle: &O) -> Result<()>
    where
        O: AliasOracle<cfg::NodeRef>,
    {
        let memory_ops: Vec<NodeRef> = self
            .nodes()
            .filter(|(_, n)| n.is_memory_op())
            .map(|(n, _)| n)
            .collect();

        for i in 0..memory_ops.len() {
            for j in (i + 1)..memory_ops.len() {
                let (a, b) = (memory_ops[i], memory_ops[j]);
                let cfg_a = expanded.node(self.node(a)?.source())?.source();
                let cfg_b = expanded.node(self.node(b)?.source())?.source();

                match alias_oracle.alias(cfg_a, cfg_b) {
                    AliasResult::MustAlias => {
                        let addr_a = self.node(a)?.addr().ok_or("aliasing node without addr")?;
                        let addr_b = self.node(b)?.addr().ok_or("aliasing node without addr")?;
                        self.constraints.add(
                            Expression::equal(addr_a, addr_b)?,
                            format!("must_alias_{:?}_{:?}", a, b),
                        );
                    }
                    AliasResult::NoAlias => {
                        let addr_a = self.node(a)?.addr().ok_or("aliasing node without addr")?;
                        let addr_b = self.node(b)?.addr().ok_or("aliasing node without addr")?;
                        self.constraints.add(
                            Expression::unequal(addr_a, addr_b)?,
                            format!("no_alias_{:?}_{:?}", a, b),
                        );
                    }
                    AliasResult::MayAlias => {}
                }
            }
        }
        Ok(())
    }

    /// Every `Po` edge's endpoints are ordered by `arch_order` whenever both
    /// execute architecturally.
    fn construct_arch_order(&mut self) -> Result<()> {
        let po_edges: Vec<(NodeRef, NodeRef)> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().kind() == EdgeKind::Po)
            .map(|e| (e.source(), e.target()))
            .collect();

        for (src, dst) in po_edges {
            let both_arch = Boolean::and(self.graph[src].arch(), self.graph[dst].arch())?;
            let ordered = BitVector::ult(self.graph[src].arch_order(), self.graph[dst].arch_order())?;
            self.constraints.add(
                Boolean::imply(both_arch, ordered)?,
                format!("arch_order_{:?}_{:?}", src, dst),
            );
        }
        Ok(())
    }

    /// Every `Po`/`Tfo` edge between two memory-op nodes is ordered by
    /// `xsaccess_order` whenever both execute (architecturally or not).
    fn construct_xsaccess_order(&mut self) -> Result<()> {
        let edges: Vec<(NodeRef, NodeRef)> = self
            .graph
            .edge_references()
            .filter(|e| matches!(e.weight().kind(), EdgeKind::Po | EdgeKind::Tfo))
            .map(|e| (e.source(), e.target()))
            .collect();

        for (src, dst) in edges {
            if !self.graph[src].is_memory_op() || !self.graph[dst].is_memory_op() {
                continue;
            }
            let both_exec = Boolean::and(self.graph[src].exec(), self.graph[dst].exec())?;
            let ordered = BitVector::ult(
                self.graph[src].xsaccess_order(),
                self.graph[dst].xsaccess_order(),
            )?;
            self.constraints.add(
                Boolean::imply(both_exec, ordered)?,
                format!("xsaccess_order_{:?}_{:?}", src, dst),
            );
        }
        Ok(())
    }

    /// `Po`/`Tfo` predecessors of `node`, sorted for determinism. Exposed for
    /// the detector's backward program-order walk (`run_bypassed_store_fast`).
    pub fn po_tfo_predecessors(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut preds: Vec<NodeRef> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .filter(|e| matches!(e.weight().kind(), EdgeKind::Po | EdgeKind::Tfo))
            .map(|e| e.source())
            .collect();
        preds.sort();
        preds
    }

    /// Folds `ite(p0.exec, v(p0), ite(p1.exec, v(p1), ..., default))` over a
    /// node's `Po`/`Tfo` predecessors, in the order `po_tfo_predecessors`
    /// returns them.
    fn fold_predecessors(
        preds: &[NodeRef],
        values: &HashMap<NodeRef, Expression>,
        execs: &HashMap<NodeRef, Expression>,
        default: Expression,
    ) -> Result<Expression> {
        let mut acc = default;
        for pred in preds.iter().rev() {
            let value = values.get(pred).ok_or("missing predecessor value")?.clone();
            let exec = execs.get(pred).ok_or("missing predecessor exec")?.clone();
            acc = Expression::ite(exec, value, acc)?;
        }
        Ok(acc)
    }

    /// Threads the architectural memory state through program order: a
    /// store updates it only when `arch` holds, mirroring that speculative
    /// writes never reach the real memory until they retire. A load's `data`
    /// symbol is defined as selecting from the state visible just before it;
    /// the detector separately asserts an `rfx` override when witnessing a
    /// bypass, rather than this baseline modeling it.
    fn construct_mem(&mut self) -> Result<()> {
        let mut mems_before: HashMap<NodeRef, Expression> = HashMap::new();
        let mut mems_after: HashMap<NodeRef, Expression> = HashMap::new();
        let mut execs: HashMap<NodeRef, Expression> = HashMap::new();
        for &n in &self.topo {
            execs.insert(n, self.graph[n].exec());
        }

        for &node_ref in &self.topo {
            let preds = self.po_tfo_predecessors(node_ref);
            let before = Self::fold_predecessors(
                &preds,
                &mems_after,
                &execs,
                Expression::nondet(Sort::memory()),
            )?;

            let node = self.node(node_ref)?.clone();
            if node.is_read() {
                let data = node.data().ok_or("load without data symbol")?;
                let addr = node.addr().ok_or("load without addr symbol")?;
                let value = Array::select(before.clone(), addr)?;
                self.constraints.add(
                    Expression::equal(data, value)?,
                    format!("load_reads_mems_{:?}", node_ref),
                );
            }

            let after = if node.is_write() {
                let addr = node.addr().ok_or("store without addr symbol")?;
                let data = node.data().ok_or("store without data symbol")?;
                let stored = Array::store(before.clone(), addr, data)?;
                Expression::ite(node.arch(), stored, before.clone())?
            } else {
                before.clone()
            };

            mems_before.insert(node_ref, before);
            mems_after.insert(node_ref, after);
        }

        Ok(())
    }

    fn project_rel(
        &self,
        expanded: &CfgExpanded,
        rel: &BinaryInstRel,
    ) -> Result<Vec<(NodeRef, NodeRef)>> {
        let mut out = Vec::new();
        for (cfg_src, cfg_dsts) in rel {
            let src_refs = self.cfg_to_expanded.get(cfg_src).cloned().unwrap_or_default();
            for cfg_dst in cfg_dsts {
                let dst_refs = self.cfg_to_expanded.get(cfg_dst).cloned().unwrap_or_default();
                for &esrc in &src_refs {
                    let depth_src = expanded.node(esrc)?.depth();
                    for &edst in &dst_refs {
                        if expanded.node(edst)?.depth() == depth_src {
                            let src = self.node_for_expanded(esrc).ok_or("missing src")?;
                            let dst = self.node_for_expanded(edst).ok_or("missing dst")?;
                            out.push((src, dst));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Projects the address/data/control dependency relations the dataflow
    /// framework computed over `Cfg2` onto same-depth pairs of expanded
    /// nodes, adding one stored edge per pair.
    fn construct_addr_data_ctrl(
        &mut self,
        expanded: &CfgExpanded,
        addr_rel: &BinaryInstRel,
        data_rel: &BinaryInstRel,
        ctrl_rel: &BinaryInstRel,
    ) -> Result<()> {
        let rels: Vec<(&BinaryInstRel, EdgeKind)> = vec![
            (addr_rel, EdgeKind::Addr),
            (data_rel, EdgeKind::Data),
            (ctrl_rel, EdgeKind::Ctrl),
        ];
        for (rel, kind) in rels {
            for (src, dst) in self.project_rel(expanded, rel)? {
                let exists = Boolean::and(self.graph[src].exec(), self.graph[dst].exec())?;
                self.graph.add_edge(src, dst, Edge::new(kind, exists));
            }
        }
        Ok(())
    }

    /// Annotates every node with a symbolic flag for whether its address or
    /// value could depend on a load (the generic taint-source assumption
    /// for this leak class). `TaintStrategy::Array` additionally threads a
    /// `taint_mem` array through program order the same way `construct_mem`
    /// threads `mems`, distinguishing which address is tainted; `BitVector`
    /// collapses that into one flag per node.
    fn construct_taint(&mut self, env: &Environment) -> Result<()> {
        let mut taint_mem_after: HashMap<NodeRef, Expression> = HashMap::new();
        let mut execs: HashMap<NodeRef, Expression> = HashMap::new();
        for &n in &self.topo {
            execs.insert(n, self.graph[n].exec());
        }

        let mut taints: HashMap<NodeRef, Expression> = HashMap::new();

        for &node_ref in &self.topo {
            let node = self.node(node_ref)?.clone();

            let mut terms = vec![Boolean::constant(node.is_read())];

            for (pred, _) in self.exists_src(EdgeKind::Addr, node_ref) {
                terms.push(taints.get(&pred).cloned().unwrap_or_else(|| Boolean::constant(false)));
            }
            for (pred, _) in self.exists_src(EdgeKind::Data, node_ref) {
                terms.push(taints.get(&pred).cloned().unwrap_or_else(|| Boolean::constant(false)));
            }
            for (pred, _) in self.exists_src(EdgeKind::Ctrl, node_ref) {
                terms.push(taints.get(&pred).cloned().unwrap_or_else(|| Boolean::constant(false)));
            }

            let array_strategy = env.taint_strategy == TaintStrategy::Array;
            let mem_before = if array_strategy {
                let preds = self.po_tfo_predecessors(node_ref);
                let before = Self::fold_predecessors(
                    &preds,
                    &taint_mem_after,
                    &execs,
                    Expression::nondet(Sort::array(&Sort::word(), &Sort::boolean())),
                )?;
                if node.is_memory_op() {
                    let addr = node.addr().ok_or("memory-op node without addr symbol")?;
                    terms.push(Array::select(before.clone(), addr)?);
                }
                Some(before)
            } else {
                None
            };

            let taint = Boolean::disjunction(&terms)?;
            self.graph[node_ref].set_taint(taint.clone());
            taints.insert(node_ref, taint.clone());

            if let Some(before) = mem_before {
                let after = if node.is_write() {
                    let addr = node.addr().ok_or("store node without addr symbol")?;
                    Array::store(before.clone(), addr, taint)?
                } else {
                    before.clone()
                };
                taint_mem_after.insert(node_ref, after);
            }
        }

        Ok(())
    }

    // --- Stored-edge existence API ---

    pub fn exists(&self, kind: EdgeKind, src: NodeRef, dst: NodeRef) -> Option<Expression> {
        self.graph
            .edges_directed(src, Direction::Outgoing)
            .find(|e| e.target() == dst && e.weight().kind() == kind)
            .map(|e| e.weight().exists().clone())
    }

    pub fn exists_src(&self, kind: EdgeKind, dst: NodeRef) -> Vec<(NodeRef, Expression)> {
        self.graph
            .edges_directed(dst, Direction::Incoming)
            .filter(|e| e.weight().kind() == kind)
            .map(|e| (e.source(), e.weight().exists().clone()))
            .collect()
    }

    pub fn exists_dst(&self, kind: EdgeKind, src: NodeRef) -> Vec<(NodeRef, Expression)> {
        self.graph
            .edges_directed(src, Direction::Outgoing)
            .filter(|e| e.weight().kind() == kind)
            .map(|e| (e.target(), e.weight().exists().clone()))
            .collect()
    }

    // --- Pseudo-edge (communication relation) API ---

    fn addr_equal(&self, a: NodeRef, b: NodeRef) -> Result<Expression> {
        match (self.graph[a].addr(), self.graph[b].addr()) {
            (Some(x), Some(y)) => Expression::equal(x, y),
            _ => Ok(Boolean::constant(false)),
        }
    }

    /// `rf_exists(store, load)`: `store` is the architectural source of
    /// `load`'s value - same address, both architectural, ordered, and no
    /// other same-address architectural write falls in between.
    pub fn rf_exists(&self, store: NodeRef, load: NodeRef) -> Result<Expression> {
        let (s, l) = (&self.graph[store], &self.graph[load]);
        if !s.is_write() || !l.is_read() {
            return Ok(Boolean::constant(false));
        }
        let same_addr = self.addr_equal(store, load)?;
        let ordered = BitVector::ult(s.arch_order(), l.arch_order())?;

        let mut no_intervening = Vec::new();
        for (m, node_m) in self.nodes() {
            if m == store || m == load || !node_m.is_write() {
                continue;
            }
            let addr_eq = self.addr_equal(m, load)?;
            let between = Boolean::and(
                BitVector::ult(s.arch_order(), node_m.arch_order())?,
                BitVector::ult(node_m.arch_order(), l.arch_order())?,
            )?;
            let bad = Boolean::conjunction(&[node_m.write(), node_m.arch(), addr_eq, between])?;
            no_intervening.push(Boolean::not(bad)?);
        }

        Boolean::conjunction(&[
            s.write(),
            l.read(),
            s.arch(),
            l.arch(),
            same_addr,
            ordered,
            Boolean::conjunction(&no_intervening)?,
        ])
    }

    /// `co_exists(s1, s2)`: both architectural writes to the same address,
    /// `s1` ordered before `s2`.
    pub fn co_exists(&self, s1: NodeRef, s2: NodeRef) -> Result<Expression> {
        let (a, b) = (&self.graph[s1], &self.graph[s2]);
        if !a.is_write() || !b.is_write() {
            return Ok(Boolean::constant(false));
        }
        Boolean::conjunction(&[
            a.write(),
            b.write(),
            a.arch(),
            b.arch(),
            self.addr_equal(s1, s2)?,
            BitVector::ult(a.arch_order(), b.arch_order())?,
        ])
    }

    /// `fr_exists(load, store)`: some write `s0` that `load` reads from is
    /// overwritten, for the same address, by `store`.
    pub fn fr_exists(&self, load: NodeRef, store: NodeRef) -> Result<Expression> {
        let mut terms = Vec::new();
        for (s0, node_s0) in self.nodes() {
            if !node_s0.is_write() {
                continue;
            }
            terms.push(Boolean::and(self.rf_exists(s0, load)?, self.co_exists(s0, store)?)?);
        }
        Boolean::disjunction(&terms)
    }

    /// The extended-order counterpart of `rf_exists`: evaluated over `exec`/
    /// `xsaccess_order` so it can witness a transient bypass no
    /// architectural execution ever takes.
    pub fn rfx_exists(&self, store: NodeRef, load: NodeRef) -> Result<Expression> {
        let (s, l) = (&self.graph[store], &self.graph[load]);
        if !s.is_write() || !l.is_read() {
            return Ok(Boolean::constant(false));
        }
        let same_addr = self.addr_equal(store, load)?;
        let ordered = BitVector::ult(s.xsaccess_order(), l.xsaccess_order())?;

        let mut no_intervening = Vec::new();
        for (m, node_m) in self.nodes() {
            if m == store || m == load || !node_m.is_write() {
                continue;
            }
            let addr_eq = self.addr_equal(m, load)?;
            let between = Boolean::and(
                BitVector::ult(s.xsaccess_order(), node_m.xsaccess_order())?,
                BitVector::ult(node_m.xsaccess_order(), l.xsaccess_order())?,
            )?;
            let bad = Boolean::conjunction(&[node_m.write(), node_m.exec(), addr_eq, between])?;
            no_intervening.push(Boolean::not(bad)?);
        }

        Boolean::conjunction(&[
            s.write(),
            l.read(),
            s.exec(),
            l.exec(),
            same_addr,
            ordered,
            Boolean::conjunction(&no_intervening)?,
        ])
    }

    pub fn cox_exists(&self, s1: NodeRef, s2: NodeRef) -> Result<Expression> {
        let (a, b) = (&self.graph[s1], &self.graph[s2]);
        if !a.is_write() || !b.is_write() {
            return Ok(Boolean::constant(false));
        }
        Boolean::conjunction(&[
            a.write(),
            b.write(),
            a.exec(),
            b.exec(),
            self.addr_equal(s1, s2)?,
            BitVector::ult(a.xsaccess_order(), b.xsaccess_order())?,
        ])
    }

    pub fn frx_exists(&self, load: NodeRef, store: NodeRef) -> Result<Expression> {
        let mut terms = Vec::new();
        for (s0, node_s0) in self.nodes() {
            if !node_s0.is_write() {
                continue;
            }
            terms.push(Boolean::and(
                self.rfx_exists(s0, load)?,
                self.cox_exists(s0, store)?,
            )?);
        }
        Boolean::disjunction(&terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::ConservativeOracle;
    use crate::dataflow::BinaryInstRel;
    use crate::expr::Expression as E;
    use crate::instr::Instruction;
    use std::convert::TryFrom;

    /// `store(p, 0); store(p, 1); load(p) -> r; load(r) -> s` - the classic
    /// Spectre-v4 shape, straight-line, single basic block.
    fn straight_line() -> (Cfg2, cfg::NodeRef, cfg::NodeRef, cfg::NodeRef) {
        use crate::expr::{BitVector, Sort, Variable};

        let mut cfg = Cfg2::new();
        let p = Variable::new("p", Sort::word());
        let r = Variable::new("r", Sort::word());

        let store0 = cfg.add_instruction(Instruction::store(
            E::variable(p.clone()),
            BitVector::word_constant(0),
        ));
        let store1 = cfg.add_instruction(Instruction::store(
            E::variable(p.clone()),
            BitVector::word_constant(1),
        ));
        let load0 = cfg.add_instruction(Instruction::load(r.clone(), E::variable(p.clone())));
        let load1 = cfg.add_instruction(Instruction::load(
            Variable::new("s", Sort::word()),
            E::variable(r),
        ));

        cfg.unconditional_edge(store0, store1);
        cfg.unconditional_edge(store1, load0);
        cfg.unconditional_edge(load0, load1);
        cfg.set_entry(store0);
        cfg.add_exit(load1);
        (cfg, store0, store1, load0)
    }

    #[test]
    fn construct_builds_one_node_per_expanded_node() {
        let (cfg, ..) = straight_line();
        let expanded = CfgExpanded::construct(&cfg, 0, 10).unwrap();
        let addr_rel = BinaryInstRel::new();
        let data_rel = BinaryInstRel::new();
        let ctrl_rel = BinaryInstRel::new();
        let env = Environment::default();

        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &addr_rel,
            &data_rel,
            &ctrl_rel,
            &ConservativeOracle::default(),
            &env,
        )
        .unwrap();

        assert_eq!(aeg.nodes().count(), expanded.nodes().count());
    }

    #[test]
    fn entry_is_asserted_architectural() {
        let (cfg, ..) = straight_line();
        let expanded = CfgExpanded::construct(&cfg, 0, 10).unwrap();
        let env = Environment::default();
        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &ConservativeOracle::default(),
            &env,
        )
        .unwrap();

        let entry = aeg.entry().unwrap();
        assert!(aeg
            .constraints()
            .iter()
            .any(|(e, _)| *e == aeg.node(entry).unwrap().arch()));
    }

    #[test]
    fn rf_exists_is_false_for_non_memory_nodes() {
        let (cfg, ..) = straight_line();
        let expanded = CfgExpanded::construct(&cfg, 0, 10).unwrap();
        let env = Environment::default();
        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &ConservativeOracle::default(),
            &env,
        )
        .unwrap();

        let entry = aeg.entry().unwrap();
        let formula = aeg.rf_exists(entry, entry).unwrap();
        assert_eq!(bool::try_from(&formula), Ok(false));
    }

    #[test]
    fn memory_op_nodes_get_distinct_addr_symbols() {
        let (cfg, store0, store1, _) = straight_line();
        let expanded = CfgExpanded::construct(&cfg, 0, 10).unwrap();
        let env = Environment::default();
        let aeg = Aeg::construct(
            &expanded,
            &cfg,
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &ConservativeOracle::default(),
            &env,
        )
        .unwrap();

        let expanded_store0 = expanded
            .nodes()
            .find(|(_, n)| n.source() == store0 && n.depth() == 0)
            .unwrap()
            .0;
        let expanded_store1 = expanded
            .nodes()
            .find(|(_, n)| n.source() == store1 && n.depth() == 0)
            .unwrap()
            .0;
        let node0 = aeg.node_for_expanded(expanded_store0).unwrap();
        let node1 = aeg.node_for_expanded(expanded_store1).unwrap();
        assert_ne!(
            aeg.node(node0).unwrap().addr_variable(),
            aeg.node(node1).unwrap().addr_variable()
        );
    }
}
