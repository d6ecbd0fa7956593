//! A single leak as the detector reports it: the node sequence that drove
//! the witnessing SMT query, the transmitter that observes it, and the
//! breadcrumb of named decisions (`Detector::actions`) that led there.
//!
//! Grounded on `examples/original_source/src/leakage/leakage.h`'s `Leakage`
//! struct (`print_short`/`print_long`).

use crate::aeg::{Aeg, NodeRef};
use crate::cfg::Cfg2;
use crate::error::Result;
use crate::expanded::CfgExpanded;
use crate::util::RenderGraph;
use std::fmt;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct Leakage {
    pub vec: Vec<NodeRef>,
    pub transmitter: NodeRef,
    pub actions: Vec<String>,
}

impl Leakage {
    pub fn new(vec: Vec<NodeRef>, transmitter: NodeRef, actions: Vec<String>) -> Self {
        Self {
            vec,
            transmitter,
            actions,
        }
    }

    /// `leakage.txt`'s one-line-per-leak format: node-ref numbers, then the
    /// action breadcrumb, then a dump of every node's instruction.
    pub fn print_long(&self, aeg: &Aeg, expanded: &CfgExpanded, cfg: &Cfg2) -> Result<String> {
        let refs: Vec<String> = self.vec.iter().map(|n| n.index().to_string()).collect();
        let mut instructions = Vec::with_capacity(self.vec.len());
        for &n in &self.vec {
            instructions.push(aeg.instruction_for(n, expanded, cfg)?.to_string());
        }
        Ok(format!(
            "{}: {} -- {}",
            refs.join(" "),
            self.actions.join("; "),
            instructions.join(" | ")
        ))
    }

    /// Renders the full AEG graph as a `.dot` witness; the leak's own node
    /// sequence is highlighted nowhere special (the original's execution
    /// dump is the whole graph too) but is named in the output file path.
    pub fn render_witness(&self, aeg: &Aeg, path: &Path) -> Result<()> {
        aeg.graph().render_to_file(path)
    }

    pub fn witness_file_name(&self, function_name: &str) -> String {
        let refs: Vec<String> = self.vec.iter().map(|n| n.index().to_string()).collect();
        format!("{}-{}.dot", function_name, refs.join("-"))
    }
}

impl fmt::Display for Leakage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let refs: Vec<String> = self.vec.iter().map(|n| n.index().to_string()).collect();
        write!(
            f,
            "leak: {} (transmitter {})",
            refs.join(" -> "),
            self.transmitter.index()
        )
    }
}
