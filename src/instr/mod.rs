//! The flat, already-lifted instruction surface this crate consumes. Each
//! function is a sequence of `Instruction`s grouped into basic blocks by the
//! `cfg` module; lifting from a real ISA is out of scope (see `loader`).

mod kind;

pub use self::kind::Kind;

use crate::expr::{Expression, Variable};
use std::fmt;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Instruction {
    kind: Kind,
    address: Option<u64>,
}

impl Instruction {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            address: None,
        }
    }

    pub fn assign(variable: Variable, expr: Expression) -> Self {
        Self::new(Kind::Assign { variable, expr })
    }

    pub fn load(variable: Variable, address: Expression) -> Self {
        Self::new(Kind::Load { variable, address })
    }

    pub fn store(address: Expression, expr: Expression) -> Self {
        Self::new(Kind::Store { address, expr })
    }

    pub fn branch(condition: Expression) -> Self {
        Self::new(Kind::Branch { condition })
    }

    pub fn barrier() -> Self {
        Self::new(Kind::Barrier)
    }

    pub fn call(target: u64, result: Option<Variable>) -> Self {
        Self::new(Kind::Call { target, result })
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_assign(&self) -> bool {
        matches!(self.kind, Kind::Assign { .. })
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, Kind::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self.kind, Kind::Store { .. })
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, Kind::Branch { .. })
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, Kind::Barrier)
    }

    /// Returns the symbolic address this instruction accesses, for `Load`
    /// and `Store` only.
    pub fn access_address(&self) -> Option<&Expression> {
        match &self.kind {
            Kind::Load { address, .. } => Some(address),
            Kind::Store { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Returns the symbolic value written to memory, for `Store` only.
    pub fn store_value(&self) -> Option<&Expression> {
        match &self.kind {
            Kind::Store { expr, .. } => Some(expr),
            _ => None,
        }
    }

    /// Returns the destination `Variable`, for `Assign`/`Load` only.
    pub fn result(&self) -> Option<&Variable> {
        match &self.kind {
            Kind::Assign { variable, .. } => Some(variable),
            Kind::Load { variable, .. } => Some(variable),
            Kind::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// The function address a `Call` targets.
    pub fn call_target(&self) -> Option<u64> {
        match &self.kind {
            Kind::Call { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn set_address(&mut self, address: Option<u64>) {
        self.address = address;
    }

    pub fn variables_written(&self) -> Vec<&Variable> {
        match &self.kind {
            Kind::Assign { variable, .. } | Kind::Load { variable, .. } => vec![variable],
            Kind::Call {
                result: Some(result),
                ..
            } => vec![result],
            _ => vec![],
        }
    }

    pub fn variables_read(&self) -> Vec<&Variable> {
        match &self.kind {
            Kind::Assign { expr, .. } => expr.variables(),
            Kind::Load { address, .. } => address.variables(),
            Kind::Store { address, expr } => {
                let mut vars = address.variables();
                vars.extend(expr.variables());
                vars
            }
            Kind::Branch { condition } => condition.variables(),
            Kind::Barrier | Kind::Call { .. } => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(address) = self.address {
            write!(f, "{:x}: ", address)?;
        }
        write!(f, "{}", self.kind)
    }
}
