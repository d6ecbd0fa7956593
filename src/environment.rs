use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Bit-width used for addresses, data values and `mems` indices throughout
/// the symbolic encoding.
pub const WORD_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    Z3,
    CVC4,
    Yices2,
}

impl Default for SolverKind {
    fn default() -> Self {
        Self::Z3
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Z3 => write!(f, "z3"),
            Self::CVC4 => write!(f, "cvc4"),
            Self::Yices2 => write!(f, "yices2"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    Fast,
    Slow,
}

impl Default for CheckMode {
    fn default() -> Self {
        Self::Slow
    }
}

/// Which taint-tracking strategy `Aeg::construct_taint` threads through the
/// graph (`crate::taint`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaintStrategy {
    BitVector,
    Array,
}

impl Default for TaintStrategy {
    fn default() -> Self {
        Self::Array
    }
}

/// Knobs specific to the Spectre-v4 (speculative store-bypass) routine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectreV4Mode {
    /// When `true`, the bypassed-store search enumerates concrete candidate
    /// sourced stores via `traceback_rf`/`run_sourced_store` instead of
    /// asserting the default `rfx(entry, load)` disjunction.
    pub concrete_sourced_stores: bool,
}

impl Default for SpectreV4Mode {
    fn default() -> Self {
        Self {
            concrete_sourced_stores: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Maximum bound of mis-speculation unrolling depth (`[MODULE] CFG
    /// Expanded`).
    pub num_specs: usize,
    /// Reorder-buffer size: bounds both expanded-path length and the
    /// look-behind window the store-bypass search considers.
    pub rob_size: usize,
    /// FAST vs SLOW detector traceback mode.
    pub check_mode: CheckMode,
    pub spectre_v4_mode: SpectreV4Mode,
    pub taint_strategy: TaintStrategy,
    /// When set, at most one leak witness is kept per function (the first
    /// one found), matching `batch_mode`'s "survey, don't enumerate" use.
    pub batch_mode: bool,
    /// When set, every leak's witness execution is additionally dumped as a
    /// `.dot` graph.
    pub witness_executions: bool,
    solver: SolverKind,
    pub output_dir: PathBuf,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            num_specs: 2,
            rob_size: 20,
            check_mode: CheckMode::default(),
            spectre_v4_mode: SpectreV4Mode::default(),
            taint_strategy: TaintStrategy::default(),
            batch_mode: false,
            witness_executions: false,
            solver: SolverKind::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Environment {
    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn solver(&self) -> SolverKind {
        self.solver
    }

    pub fn set_solver(&mut self, solver: SolverKind) {
        self.solver = solver;
    }

    pub fn is_fast_mode(&self) -> bool {
        self.check_mode == CheckMode::Fast
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_yaml::to_string(self) {
            Ok(yaml) => write!(f, "{}", yaml),
            Err(e) => write!(f, "<invalid environment: {}>", e),
        }
    }
}
