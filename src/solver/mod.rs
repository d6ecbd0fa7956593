use crate::environment::Environment;
use crate::error::Result;
use crate::expr::{Constant, Expression, Variable};
use std::path::Path;
use std::time::Duration;

mod rsmt;
mod scope;

pub use self::scope::Scope;

pub trait Model {
    fn get_interpretation(&self, variable: &Variable) -> Option<Constant>;
    fn evaluate(&self, expr: &Expression) -> Option<Constant>;
}

/// Outcome of a single `check_sat` call. `Unknown` carries the same meaning as
/// `Unsat` for this detector's soundness obligations (see the detector
/// module): a leak is only reported for a definite `Sat`.
pub enum CheckResult {
    Sat(Box<dyn Model>),
    Unsat,
    Unknown,
}

pub trait DumpFormula {
    fn dump_formula_to_file(&self, path: &Path) -> Result<()>;
}

pub trait Solver: DumpFormula {
    /// Declares (without defining) a free symbolic variable.
    fn declare(&mut self, variable: &Variable) -> Result<()>;

    /// Defines a variable as being equal to `expr` (or declares it free if
    /// `expr` is a `nondet()` placeholder).
    fn define(&mut self, variable: &Variable, expr: &Expression) -> Result<()>;

    /// Asserts `expr` unconditionally for the remainder of the current scope.
    fn assert(&mut self, expr: &Expression) -> Result<()>;

    /// Pushes a new assertion scope.
    fn push(&mut self) -> Result<()>;

    /// Pops the innermost assertion scope.
    fn pop(&mut self) -> Result<()>;

    /// Checks satisfiability of everything asserted in the current scope
    /// stack, aborting after `timeout` with `CheckResult::Unknown`.
    fn check_sat_with_timeout(&mut self, timeout: Duration) -> Result<CheckResult>;
}

pub fn create_solver(env: &Environment) -> Result<Box<dyn Solver>> {
    let solver = rsmt::RSMTSolver::new_from_env(env)?;
    Ok(Box::new(solver))
}
