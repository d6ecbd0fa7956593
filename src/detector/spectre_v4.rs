//! Spectre-v4 (speculative store-bypass): §4.5's per-transmitter routine.
//!
//! Grounded on `examples/original_source/src/leakage/spectre-v4.cc`'s
//! `SpectreV4_Detector`: `run_transmitter` tracebacks two `ADDR` hops to a
//! load, then `run_bypassed_store` either asserts the default
//! `rfx(entry, load)` disjunction (fast path) or enumerates concrete
//! bypassed/sourced store pairs when `concrete_sourced_stores` is set.

use super::{CheckStats, Detector, Leakage, TracebackOutcome};
use crate::aeg::{EdgeKind, NodeRef};
use crate::environment::{CheckMode, Environment};
use crate::error::Result;
use crate::expr::{Boolean, Expression};
use crate::solver::Solver;
use std::collections::HashSet;

/// A store the traceback pinned down, or the degenerate "some predecessor
/// qualifies" case the default fast path asserts without naming one.
///
/// Resolves the spec's bypassed/sourced-store Open Question: rather than
/// reusing `aeg.entry()` as a sentinel node reference (as the original's
/// `aeg.entry` placeholder does), the unconstrained case is its own variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sourced {
    Node(NodeRef),
    Unconstrained,
}

pub struct SpectreV4<'a> {
    core: Detector<'a>,
    leaks: Vec<Leakage>,
}

impl<'a> SpectreV4<'a> {
    pub fn new(aeg: &'a crate::aeg::Aeg, solver: &'a mut dyn Solver, env: &'a Environment) -> Self {
        Self {
            core: Detector::new(aeg, solver, env),
            leaks: Vec::new(),
        }
    }

    pub fn leaks(&self) -> &[Leakage] {
        &self.leaks
    }

    pub fn check_stats(&self) -> &CheckStats {
        self.core.stats()
    }

    /// Drives every candidate transmitter via two `ADDR` hops. `batch_mode`
    /// stops after the function's first witness (not after the first per
    /// transmitter - `for_each_transmitter` already visits each transmitter
    /// exactly once).
    pub fn run(&mut self) -> Result<()> {
        let SpectreV4 { core, leaks } = self;
        let mode = core.env.check_mode;
        let batch_mode = core.env.batch_mode;

        core.for_each_transmitter(EdgeKind::Addr, mode, |core, transmitter, mode| {
            if batch_mode && !leaks.is_empty() {
                return Ok(());
            }
            Self::run_transmitter(core, leaks, transmitter, mode)
        })
    }

    fn run_transmitter(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        transmitter: NodeRef,
        mode: CheckMode,
    ) -> Result<()> {
        let kinds = [EdgeKind::Addr, EdgeKind::Addr];
        core.traceback_deps(transmitter, &kinds, mode, &mut |core, path| {
            Self::run_with_load(core, leaks, path, mode)
        })?;
        Ok(())
    }

    fn run_with_load(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        path: &[NodeRef],
        mode: CheckMode,
    ) -> Result<TracebackOutcome> {
        let load = *path.last().ok_or("traceback produced an empty path")?;
        let concrete = core.env.spectre_v4_mode.concrete_sourced_stores;
        let slow = mode == CheckMode::Slow;

        core.with_scope(slow, |core| {
            if !concrete && slow {
                let entry = core.aeg.entry()?;
                let rfx = core.aeg.rfx_exists(entry, load)?;
                core.solver.assert(&rfx)?;
            }
            Self::run_bypassed_store(core, leaks, load, path, mode, concrete)
        })
    }

    fn run_bypassed_store(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        load: NodeRef,
        path: &[NodeRef],
        mode: CheckMode,
        concrete: bool,
    ) -> Result<TracebackOutcome> {
        if mode == CheckMode::Slow && core.check()?.is_none() {
            return Ok(TracebackOutcome::Continue);
        }

        if !concrete {
            return Self::run_bypassed_store_fast(core, leaks, load, path, mode);
        }

        let rob_size = core.env.rob_size;
        let entry = core.aeg.entry()?;
        let candidates: Vec<NodeRef> = core
            .aeg
            .nodes()
            .filter(|(node_ref, node)| {
                *node_ref != entry && node.is_write() && core.aeg.may_source_stb(load, *node_ref, rob_size)
            })
            .map(|(node_ref, _)| node_ref)
            .collect();

        for bypassed_store in candidates {
            let slow = mode == CheckMode::Slow;
            let outcome = core.with_scope(slow, |core| {
                if slow {
                    let arch = core.aeg.node(bypassed_store)?.arch();
                    core.solver.assert(&arch)?;
                    if core.check()?.is_none() {
                        return Ok(TracebackOutcome::Continue);
                    }
                }
                Self::run_sourced_store(core, leaks, load, bypassed_store, path, mode)
            })?;
            if outcome != TracebackOutcome::Continue {
                return Ok(outcome);
            }
        }
        Ok(TracebackOutcome::Continue)
    }

    /// The default path: a disjunction over every program-order predecessor
    /// within the reorder-buffer window that may have written the load's
    /// address, asserted all at once rather than enumerated one by one. In
    /// FAST mode the first qualifying candidate short-circuits the walk
    /// entirely, with no disjunction built and no solver touched.
    fn run_bypassed_store_fast(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        load: NodeRef,
        path: &[NodeRef],
        mode: CheckMode,
    ) -> Result<TracebackOutcome> {
        let rob_size = core.env.rob_size;
        let mut todo = vec![load];
        let mut seen = HashSet::new();
        let mut disjuncts = Vec::new();

        while let Some(candidate) = todo.pop() {
            if !seen.insert(candidate) {
                continue;
            }
            let node = core.aeg.node(candidate)?.clone();
            if node.is_write() && core.aeg.may_source_stb(load, candidate, rob_size) {
                if mode == CheckMode::Fast {
                    return Self::check_solution(
                        core,
                        leaks,
                        load,
                        Sourced::Node(candidate),
                        Sourced::Unconstrained,
                        path,
                        mode,
                    );
                }
                let load_addr = core.aeg.node(load)?.addr().ok_or("load node without addr")?;
                let store_addr = node.addr().ok_or("store node without addr")?;
                let same_addr = Expression::equal(store_addr, load_addr)?;
                disjuncts.push(Boolean::conjunction(&[node.arch(), node.write(), same_addr])?);
            }
            todo.extend(core.aeg.po_tfo_predecessors(candidate));
        }

        if mode != CheckMode::Slow || disjuncts.is_empty() {
            return Ok(TracebackOutcome::Continue);
        }

        let any = Boolean::disjunction(&disjuncts)?;
        core.solver.assert(&any)?;
        Self::check_solution(core, leaks, load, Sourced::Unconstrained, Sourced::Unconstrained, path, mode)
    }

    /// Only reached with `concrete_sourced_stores` set: enumerate candidate
    /// sourced stores later than `bypassed_store` in postorder, asserting
    /// same address and `rfx(sourced_store, load)`.
    fn run_sourced_store(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        load: NodeRef,
        bypassed_store: NodeRef,
        path: &[NodeRef],
        mode: CheckMode,
    ) -> Result<TracebackOutcome> {
        let bypassed_idx = core
            .aeg
            .postorder_index(bypassed_store)
            .ok_or("bypassed store has no postorder index")?;

        let candidates: Vec<NodeRef> = core
            .aeg
            .nodes()
            .filter(|(node_ref, node)| {
                node.is_write()
                    && core
                        .aeg
                        .postorder_index(*node_ref)
                        .map_or(false, |idx| idx > bypassed_idx)
            })
            .map(|(node_ref, _)| node_ref)
            .collect();

        for sourced_store in candidates {
            let slow = mode == CheckMode::Slow;
            let outcome = core.with_scope(slow, |core| {
                if slow {
                    let load_addr = core.aeg.node(load)?.addr().ok_or("load node without addr")?;
                    let store_addr = core
                        .aeg
                        .node(sourced_store)?
                        .addr()
                        .ok_or("store node without addr")?;
                    let same_addr = Expression::equal(store_addr, load_addr)?;
                    core.solver.assert(&same_addr)?;
                    let rfx = core.aeg.rfx_exists(sourced_store, load)?;
                    core.solver.assert(&rfx)?;
                }
                core.actions.push(format!("sourced store {}", sourced_store.index()));
                let outcome = Self::check_solution(
                    core,
                    leaks,
                    load,
                    Sourced::Node(bypassed_store),
                    Sourced::Node(sourced_store),
                    path,
                    mode,
                );
                core.actions.pop();
                outcome
            })?;
            if outcome != TracebackOutcome::Continue {
                return Ok(outcome);
            }
        }
        Ok(TracebackOutcome::Continue)
    }

    /// FAST mode records a witness straight off the structural candidate
    /// (no SMT query, best-effort) and signals `LookaheadFound`; SLOW mode
    /// confirms SAT first. `Unknown` is folded into "no model" by
    /// `Detector::check`, so it reaches this function exactly like `Unsat`
    /// does - an explicit divergence from the original, which aborted the
    /// whole run on `Unknown` (§5 "Cancellation").
    fn check_solution(
        core: &mut Detector<'a>,
        leaks: &mut Vec<Leakage>,
        load: NodeRef,
        bypassed_store: Sourced,
        sourced_store: Sourced,
        path: &[NodeRef],
        mode: CheckMode,
    ) -> Result<TracebackOutcome> {
        if mode != CheckMode::Slow {
            Self::record_leak(core, leaks, load, bypassed_store, sourced_store, path)?;
            return Ok(TracebackOutcome::LookaheadFound);
        }

        match core.check()? {
            None => Ok(TracebackOutcome::Continue),
            Some(_model) => {
                Self::record_leak(core, leaks, load, bypassed_store, sourced_store, path)?;
                Ok(TracebackOutcome::Continue)
            }
        }
    }

    fn record_leak(
        core: &Detector<'a>,
        leaks: &mut Vec<Leakage>,
        load: NodeRef,
        bypassed_store: Sourced,
        sourced_store: Sourced,
        path: &[NodeRef],
    ) -> Result<()> {
        let universal_transmitter = *path.first().ok_or("empty traceback path")?;
        let mut witness = Vec::new();
        if let Sourced::Node(n) = sourced_store {
            witness.push(n);
        }
        if let Sourced::Node(n) = bypassed_store {
            witness.push(n);
        }
        witness.push(load);
        witness.push(universal_transmitter);

        leaks.push(Leakage::new(witness, universal_transmitter, core.actions.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aeg::Aeg;
    use crate::alias::ConservativeOracle;
    use crate::cfg::Cfg2;
    use crate::dataflow::{AddressDependencyAnalysis, BinaryInstRel};
    use crate::environment::Environment;
    use crate::expanded::CfgExpanded;
    use crate::expr::{BitVector, Expression as E, Sort, Variable};
    use crate::instr::Instruction;
    use crate::solver::{CheckResult, DumpFormula, Model};
    use std::path::Path;
    use std::time::Duration;

    /// A `Solver` stub that never actually solves: every `check_sat` call
    /// reports `Unknown`. FAST-mode tracebacks never call it at all; under
    /// SLOW mode it exercises the "`Unknown` folds into no-model" path.
    struct NullSolver;

    impl DumpFormula for NullSolver {
        fn dump_formula_to_file(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    impl Solver for NullSolver {
        fn declare(&mut self, _variable: &Variable) -> Result<()> {
            Ok(())
        }
        fn define(&mut self, _variable: &Variable, _expr: &Expression) -> Result<()> {
            Ok(())
        }
        fn assert(&mut self, _expr: &Expression) -> Result<()> {
            Ok(())
        }
        fn push(&mut self) -> Result<()> {
            Ok(())
        }
        fn pop(&mut self) -> Result<()> {
            Ok(())
        }
        fn check_sat_with_timeout(&mut self, _timeout: Duration) -> Result<CheckResult> {
            Ok(CheckResult::Unknown)
        }
    }

    /// `store(p, 0); store(p, 1); load(p) -> r; load(r) -> s` - the classic
    /// Spectre-v4 shape.
    fn straight_line() -> Cfg2 {
        let mut cfg = Cfg2::new();
        let p = Variable::new("p", Sort::word());
        let r = Variable::new("r", Sort::word());

        let store0 = cfg.add_instruction(Instruction::store(E::variable(p.clone()), BitVector::word_constant(0)));
        let store1 = cfg.add_instruction(Instruction::store(E::variable(p.clone()), BitVector::word_constant(1)));
        let load0 = cfg.add_instruction(Instruction::load(r.clone(), E::variable(p)));
        let load1 = cfg.add_instruction(Instruction::load(Variable::new("s", Sort::word()), E::variable(r)));

        cfg.unconditional_edge(store0, store1);
        cfg.unconditional_edge(store1, load0);
        cfg.unconditional_edge(load0, load1);
        cfg.set_entry(store0);
        cfg.add_exit(load1);
        cfg
    }

    fn build_aeg(cfg: &Cfg2, env: &Environment) -> Aeg {
        let expanded = CfgExpanded::construct(cfg, env.num_specs, env.rob_size).unwrap();
        let addr_rel = AddressDependencyAnalysis::default().get_result(cfg).unwrap();
        Aeg::construct(
            &expanded,
            cfg,
            &addr_rel,
            &BinaryInstRel::new(),
            &BinaryInstRel::new(),
            &ConservativeOracle::default(),
            env,
        )
        .unwrap()
    }

    #[test]
    fn fast_mode_records_a_witness_without_touching_the_solver() {
        let cfg = straight_line();
        let mut env = Environment::default();
        env.check_mode = CheckMode::Fast;
        let aeg = build_aeg(&cfg, &env);

        let mut solver = NullSolver;
        let mut detector = SpectreV4::new(&aeg, &mut solver, &env);
        detector.run().unwrap();

        assert!(!detector.leaks().is_empty());
    }

    #[test]
    fn slow_mode_with_an_always_unknown_solver_finds_nothing() {
        let cfg = straight_line();
        let mut env = Environment::default();
        env.check_mode = CheckMode::Slow;
        let aeg = build_aeg(&cfg, &env);

        let mut solver = NullSolver;
        let mut detector = SpectreV4::new(&aeg, &mut solver, &env);
        detector.run().unwrap();

        assert!(detector.leaks().is_empty());
    }

    #[test]
    fn no_memory_ops_means_no_transmitters_and_no_leaks() {
        let mut cfg = Cfg2::new();
        let ret = cfg.add_instruction(Instruction::branch(E::nondet(Sort::boolean())));
        cfg.set_entry(ret);
        cfg.add_exit(ret);

        let env = Environment::default();
        let aeg = build_aeg(&cfg, &env);

        let mut solver = NullSolver;
        let mut detector = SpectreV4::new(&aeg, &mut solver, &env);
        detector.run().unwrap();

        assert!(detector.leaks().is_empty());
    }
}
