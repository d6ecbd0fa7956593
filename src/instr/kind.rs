use crate::expr::{Expression, Variable};
use std::fmt;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Kind {
    Assign {
        variable: Variable,
        expr: Expression,
    },
    Load {
        variable: Variable,
        address: Expression,
    },
    Store {
        address: Expression,
        expr: Expression,
    },
    /// The condition under which the block's non-fallthrough CFG2 successor
    /// is taken; the other successor is implicitly taken otherwise.
    Branch {
        condition: Expression,
    },
    /// A serializing instruction (e.g. `lfence`): transient execution may
    /// not cross it.
    Barrier,
    Call {
        target: u64,
        /// Variable the callee's return value is captured into, if the call
        /// site uses the result.
        result: Option<Variable>,
    },
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Assign { variable, expr } => write!(f, "{} = {}", variable, expr),
            Self::Load { variable, address } => write!(f, "{} = load({})", variable, address),
            Self::Store { address, expr } => write!(f, "store({}, {})", address, expr),
            Self::Branch { condition } => write!(f, "branch {}", condition),
            Self::Barrier => write!(f, "barrier"),
            Self::Call { target, result } => match result {
                Some(result) => write!(f, "{} = call 0x{:x}", result, target),
                None => write!(f, "call 0x{:x}", target),
            },
        }
    }
}
