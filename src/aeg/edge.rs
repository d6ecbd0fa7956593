//! Stored AEG edges mirror the expanded CFG's own structure (`Po`/`Tfo`) or
//! a dataflow dependency relation (`Addr`/`Data`/`Ctrl`). The six
//! communication relations (`RF`/`CO`/`FR` over arch, `RFX`/`COX`/`FRX`
//! over exec) are pseudo-edges: never stored, always recomputed by
//! `Aeg::rf_exists` and its siblings from the nodes' own symbols.

use crate::expr::Expression;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    /// Program order: both endpoints at the same speculation depth.
    Po,
    /// Transient fallthrough order: the target is one mis-speculation level
    /// deeper than the source.
    Tfo,
    Addr,
    Data,
    Ctrl,
}

/// A communication relation over the architectural order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ComKind {
    Rf,
    Co,
    Fr,
}

/// The extended-order counterpart of `ComKind`, evaluated over `exec`/
/// `xsaccess_order` instead of `arch`/`arch_order`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ComxKind {
    Rfx,
    Cox,
    Frx,
}

#[derive(Clone, Debug)]
pub struct Edge {
    kind: Kind,
    exists: Expression,
}

impl Edge {
    pub fn new(kind: Kind, exists: Expression) -> Self {
        Self { kind, exists }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn exists(&self) -> &Expression {
        &self.exists
    }
}
