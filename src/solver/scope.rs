use crate::error::Result;
use crate::solver::Solver;

/// RAII assertion scope: `push`es on construction and `pop`s on drop.
///
/// Replaces the `z3_cond_scope`-style macro the original detector used to
/// bracket a speculative assertion around a solver call - the guard makes
/// the scope's extent a normal Rust lifetime instead of a macro-expanded
/// block.
pub struct Scope<'a> {
    solver: &'a mut dyn Solver,
}

impl<'a> Scope<'a> {
    pub fn new(solver: &'a mut dyn Solver) -> Result<Self> {
        solver.push()?;
        Ok(Self { solver })
    }

    pub fn solver(&mut self) -> &mut dyn Solver {
        self.solver
    }
}

impl<'a> Drop for Scope<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.solver.pop() {
            eprintln!("warning: failed to pop solver scope: {}", e);
        }
    }
}
