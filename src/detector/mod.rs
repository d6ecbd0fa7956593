//! Backward dependency traceback over an AEG (§4.5): the generic machinery
//! each leak-detection routine (currently just `spectre_v4`) drives to walk
//! from a candidate transmitter back through `Addr`/`Data`/`Ctrl` edges,
//! conditionally asserting the path's existence in the SLOW solver-backed
//! mode and skipping the solver entirely in FAST mode.
//!
//! Grounded on `examples/original_source/src/leakage/leakage.h`'s `Detector`
//! base class: `traceback_deps`/`traceback_deps_rec`, `for_each_transmitter`,
//! `CheckStats`/timeout adaptation and the `Actions` breadcrumb. The
//! original's `next_transmitter`/`lookahead_found` C++ exceptions become the
//! explicit `TracebackOutcome` return value here instead.

pub mod spectre_v4;
pub mod witness;

pub use self::witness::Leakage;

use crate::aeg::{Aeg, EdgeKind, NodeRef};
use crate::environment::{CheckMode, Environment};
use crate::error::Result;
use crate::solver::{CheckResult, Model, Solver};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// What a traceback step found, in place of the original's exceptions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TracebackOutcome {
    /// Nothing conclusive here; try the next branch.
    Continue,
    /// Stop driving the current transmitter entirely (a witness was
    /// recorded and `batch_mode` wants at most one per function).
    SkipTransmitter,
    /// FAST mode found a candidate without a solver query; the caller
    /// should treat this transmitter as done.
    LookaheadFound,
}

/// Running tallies of `sat`/`unsat`/`unknown` outcomes, driving the
/// adaptive timeout: 5x the rolling average of prior `unsat` wall time, or
/// 5 seconds with no data yet (`get_timeout`/`set_timeout` in the original).
#[derive(Clone, Debug, Default)]
pub struct CheckStats {
    sat: u32,
    unsat: u32,
    unknown: u32,
    unsat_times: Vec<Duration>,
}

impl CheckStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sat(&self) -> u32 {
        self.sat
    }

    pub fn unsat(&self) -> u32 {
        self.unsat
    }

    pub fn unknown(&self) -> u32 {
        self.unknown
    }

    pub fn total(&self) -> u32 {
        self.sat + self.unsat + self.unknown
    }

    fn record_sat(&mut self) {
        self.sat += 1;
    }

    fn record_unsat(&mut self, elapsed: Duration) {
        self.unsat += 1;
        self.unsat_times.push(elapsed);
    }

    fn record_unknown(&mut self) {
        self.unknown += 1;
    }

    pub fn next_timeout(&self) -> Duration {
        if self.unsat_times.is_empty() {
            return Duration::from_secs(5);
        }
        let sum: Duration = self.unsat_times.iter().sum();
        (sum / self.unsat_times.len() as u32) * 5
    }
}

/// Per-function traceback state: the AEG and solver being queried, the
/// environment driving FAST/SLOW mode, the running `CheckStats`, the
/// `Actions` breadcrumb printed alongside each witness, and the set of
/// transmitters already driven (each one is visited at most once).
pub struct Detector<'a> {
    pub aeg: &'a Aeg,
    pub solver: &'a mut dyn Solver,
    pub env: &'a Environment,
    stats: CheckStats,
    pub actions: Vec<String>,
    driven: HashSet<NodeRef>,
}

impl<'a> Detector<'a> {
    pub fn new(aeg: &'a Aeg, solver: &'a mut dyn Solver, env: &'a Environment) -> Self {
        Self {
            aeg,
            solver,
            env,
            stats: CheckStats::new(),
            actions: Vec::new(),
            driven: HashSet::new(),
        }
    }

    pub fn stats(&self) -> &CheckStats {
        &self.stats
    }

    /// Pushes a solver scope (when `enter`), runs `f`, pops it back off
    /// regardless of `f`'s outcome. A failure to pop is logged, not
    /// propagated, matching `solver::Scope`'s drop behavior - this exists
    /// instead of `Scope` itself because `f` needs a second mutable borrow
    /// of `self` that a held `Scope<'a>` guard would conflict with.
    pub fn with_scope<R>(&mut self, enter: bool, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if enter {
            self.solver.push()?;
        }
        let result = f(self);
        if enter {
            if let Err(e) = self.solver.pop() {
                eprintln!("warning: failed to pop solver scope: {}", e);
            }
        }
        result
    }

    /// Runs `check_sat_with_timeout` with the adaptive timeout, folding
    /// `Unknown` into "no model" alongside `Unsat` (§5 "Cancellation": a
    /// stalled query is treated as no leak, not as an abort).
    pub fn check(&mut self) -> Result<Option<Box<dyn Model>>> {
        let timeout = self.stats.next_timeout();
        let start = Instant::now();
        let result = self.solver.check_sat_with_timeout(timeout)?;
        let elapsed = start.elapsed();
        match result {
            CheckResult::Sat(model) => {
                self.stats.record_sat();
                Ok(Some(model))
            }
            CheckResult::Unsat => {
                self.stats.record_unsat(elapsed);
                Ok(None)
            }
            CheckResult::Unknown => {
                self.stats.record_unknown();
                Ok(None)
            }
        }
    }

    /// Walks backward from `from` over one edge of `kinds[0]`, then
    /// `kinds[1]`, and so on, stopping as soon as the node reached by a hop
    /// is a load - `on_path` is then called with the full node sequence
    /// (transmitter first, load last). `from` itself is never treated as
    /// the load even if it is one: at least one hop is always consumed
    /// before `on_path` can fire, matching the original `traceback_deps`
    /// (a transmitter that is itself a load must still be traced back to
    /// the load *it* depends on, not reported as its own witness). Exhausting
    /// `kinds` without hitting a load is a dead end and yields `Continue`
    /// without calling `on_path`.
    pub fn traceback_deps(
        &mut self,
        from: NodeRef,
        kinds: &[EdgeKind],
        mode: CheckMode,
        on_path: &mut dyn FnMut(&mut Self, &[NodeRef]) -> Result<TracebackOutcome>,
    ) -> Result<TracebackOutcome> {
        let mut path = vec![from];
        self.traceback_deps_rec(kinds, mode, &mut path, on_path)
    }

    fn traceback_deps_rec(
        &mut self,
        kinds: &[EdgeKind],
        mode: CheckMode,
        path: &mut Vec<NodeRef>,
        on_path: &mut dyn FnMut(&mut Self, &[NodeRef]) -> Result<TracebackOutcome>,
    ) -> Result<TracebackOutcome> {
        let (&kind, rest) = match kinds.split_first() {
            Some(split) => split,
            None => return Ok(TracebackOutcome::Continue),
        };
        let current = *path.last().expect("traceback path is never empty");

        for (pred, exists) in self.aeg.exists_src(kind, current) {
            let slow = mode == CheckMode::Slow;
            if slow {
                self.solver.push()?;
                self.solver.assert(&exists)?;
                if self.check()?.is_none() {
                    if let Err(e) = self.solver.pop() {
                        eprintln!("warning: failed to pop solver scope: {}", e);
                    }
                    continue;
                }
            }

            path.push(pred);
            let outcome = if self.aeg.node(pred)?.is_read() {
                on_path(self, path)
            } else {
                self.traceback_deps_rec(rest, mode, path, on_path)
            };
            path.pop();

            if slow {
                if let Err(e) = self.solver.pop() {
                    eprintln!("warning: failed to pop solver scope: {}", e);
                }
            }

            match outcome? {
                TracebackOutcome::Continue => continue,
                other => return Ok(other),
            }
        }
        Ok(TracebackOutcome::Continue)
    }

    /// Drives `on_transmitter` once per memory-access node not yet visited
    /// this run. Candidate determination is implicit: `on_transmitter`
    /// itself calls `traceback_deps` and simply finds no path for nodes
    /// that aren't real transmitters.
    pub fn for_each_transmitter(
        &mut self,
        _deps: EdgeKind,
        mode: CheckMode,
        mut on_transmitter: impl FnMut(&mut Self, NodeRef, CheckMode) -> Result<()>,
    ) -> Result<()> {
        let candidates: Vec<NodeRef> = self
            .aeg
            .nodes()
            .filter(|(_, node)| node.is_memory_op())
            .map(|(node_ref, _)| node_ref)
            .collect();

        for transmitter in candidates {
            if !self.driven.insert(transmitter) {
                continue;
            }
            on_transmitter(self, transmitter, mode)?;
        }
        Ok(())
    }
}
