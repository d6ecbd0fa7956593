//! A named assertion list (grounded on `aeg/constraints.h`): every formula
//! the construction phases derive is kept alongside a human-readable tag
//! instead of being asserted blind, so a later unsat core could still name
//! which phase produced it.

use crate::error::Result;
use crate::expr::{Boolean, Expression};
use crate::solver::Solver;

#[derive(Clone, Debug, Default)]
pub struct Constraints {
    exprs: Vec<(Expression, String)>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expr: Expression, name: impl Into<String>) {
        self.exprs.push((expr, name.into()));
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Expression, String)> {
        self.exprs.iter()
    }

    /// Folds every named assertion into one conjunction, discarding the
    /// names - for call sites that need the constraint set as a single
    /// expression rather than a sequence of solver assertions.
    pub fn simplify(&self) -> Result<Expression> {
        let formulas: Vec<Expression> = self.exprs.iter().map(|(e, _)| e.clone()).collect();
        Boolean::conjunction(&formulas)
    }

    /// Asserts every constraint into `solver`.
    pub fn add_to(&self, solver: &mut dyn Solver) -> Result<()> {
        for (expr, _name) in &self.exprs {
            solver.assert(expr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Boolean as B;
    use std::convert::TryFrom;

    #[test]
    fn simplify_conjoins_every_added_expression() {
        let mut constraints = Constraints::new();
        constraints.add(B::constant(true), "a");
        constraints.add(B::constant(false), "b");
        let formula = constraints.simplify().unwrap();
        assert_eq!(formula.operands().len(), 2);
    }

    #[test]
    fn empty_constraints_simplify_to_true() {
        let constraints = Constraints::new();
        let formula = constraints.simplify().unwrap();
        assert_eq!(bool::try_from(&formula), Ok(true));
    }
}
