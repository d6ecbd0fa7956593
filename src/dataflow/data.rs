use super::{Analysis, BinaryInstRel, InstRef};
use crate::cfg::Cfg2;
use crate::error::Result;
use crate::expr::Variable;
use crate::instr::Instruction;
use std::collections::{HashMap, HashSet};

/// Value of the data-dependency fixpoint: which variables currently carry a
/// call's return value, and the call sites observed to flow into a later
/// instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Value {
    tainted: HashMap<Variable, HashSet<InstRef>>,
    dependents: BinaryInstRel,
}

/// Maps each instruction to the set of call sites whose return value flows
/// into it, seeding call-site taint for the AEG's `construct_data` phase.
#[derive(Default)]
pub struct DataDependencyAnalysis;

impl Analysis for DataDependencyAnalysis {
    type Value = Value;

    fn top(&self) -> Self::Value {
        Value::default()
    }

    fn meet(&self, a: &Self::Value, b: &Self::Value) -> Self::Value {
        let mut tainted = a.tainted.clone();
        for (var, sources) in &b.tainted {
            tainted
                .entry(var.clone())
                .or_default()
                .extend(sources.iter().cloned());
        }
        let mut dependents = a.dependents.clone();
        for (src, dsts) in &b.dependents {
            dependents
                .entry(*src)
                .or_default()
                .extend(dsts.iter().cloned());
        }
        Value {
            tainted,
            dependents,
        }
    }

    fn transfer(&self, at: InstRef, inst: &Instruction, in_: &Self::Value) -> Self::Value {
        let mut out = in_.clone();

        let sources: HashSet<InstRef> = inst
            .variables_read()
            .iter()
            .filter_map(|v| out.tainted.get(*v))
            .flatten()
            .cloned()
            .collect();

        if !sources.is_empty() {
            for &src in &sources {
                out.dependents.entry(src).or_default().insert(at);
            }
            if let Some(dst) = inst.result() {
                out.tainted.insert(dst.clone(), sources);
            }
        } else if let Some(dst) = inst.result() {
            out.tainted.remove(dst);
        }

        if inst.call_target().is_some() {
            if let Some(dst) = inst.result() {
                out.tainted.entry(dst.clone()).or_default().insert(at);
            }
        }

        out
    }
}

impl DataDependencyAnalysis {
    pub fn get_result(&self, cfg: &Cfg2) -> Result<BinaryInstRel> {
        let result = super::run(cfg, self)?;
        let mut rel = BinaryInstRel::new();
        for &exit in cfg.exits() {
            if let Some(value) = result.node_out(exit) {
                for (src, dsts) in &value.dependents {
                    rel.entry(*src).or_default().extend(dsts.iter().cloned());
                }
            }
        }
        Ok(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg2;
    use crate::expr::{Expression, Sort};

    #[test]
    fn call_return_value_reaches_a_later_branch() {
        let mut cfg = Cfg2::new();

        let ret = Variable::new("ret", Sort::bit_vector(64));

        let call = cfg.add_instruction(Instruction::call(0x1000, Some(ret.clone())));
        let branch = cfg.add_instruction(Instruction::branch(Expression::variable(ret)));
        cfg.unconditional_edge(call, branch);
        cfg.set_entry(call);
        cfg.add_exit(branch);

        let analysis = DataDependencyAnalysis::default();
        let rel = analysis.get_result(&cfg).unwrap();
        assert_eq!(rel.len(), 1);
        let (_, dependents) = rel.iter().next().unwrap();
        assert_eq!(dependents.len(), 1);
    }

    #[test]
    fn call_without_captured_result_taints_nothing() {
        let mut cfg = Cfg2::new();

        let call = cfg.add_instruction(Instruction::call(0x1000, None));
        cfg.set_entry(call);
        cfg.add_exit(call);

        let analysis = DataDependencyAnalysis::default();
        let rel = analysis.get_result(&cfg).unwrap();
        assert!(rel.is_empty());
    }
}
