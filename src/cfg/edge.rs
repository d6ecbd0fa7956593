/// The architectural (non-speculative) flavor of a CFG2 edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Edge {
    Unconditional,
    /// `true` for the successor taken when the source block's branch
    /// condition holds, `false` for the fallthrough successor.
    Conditional(bool),
}

impl Edge {
    pub fn is_conditional(self) -> bool {
        matches!(self, Self::Conditional(_))
    }

    pub fn is_taken(self) -> bool {
        matches!(self, Self::Conditional(true))
    }
}
