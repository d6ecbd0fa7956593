use super::{Analysis, BinaryInstRel, InstRef};
use crate::cfg::Cfg2;
use crate::error::Result;
use crate::expr::Variable;
use crate::instr::Instruction;
use std::collections::{HashMap, HashSet};

/// Value of the address-dependency fixpoint at a program point: which
/// variables are currently "tainted" by a load (and by which loads), plus
/// the dependents accumulated for each load seen so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Value {
    tainted: HashMap<Variable, HashSet<InstRef>>,
    dependents: BinaryInstRel,
}

/// Maps each load to the set of later instructions whose computation
/// observably depends on the loaded value, by propagating taint through
/// register assignment.
#[derive(Default)]
pub struct AddressDependencyAnalysis;

impl Analysis for AddressDependencyAnalysis {
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

        if inst.is_load() {
            if let Some(dst) = inst.result() {
                out.tainted.entry(dst.clone()).or_default().insert(at);
            }
        }

        out
    }
}

impl AddressDependencyAnalysis {
    /// Runs the fixpoint over `cfg` and returns the accumulated
    /// destination-to-sources relation, merged across every exit block.
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
    fn load_result_taint_reaches_a_later_store() {
        let mut cfg = Cfg2::new();

        let secret = Variable::new("secret", Sort::bit_vector(64));
        let addr = Variable::new("addr", Sort::bit_vector(64));
        let scratch = Variable::new("scratch", Sort::bit_vector(64));

        let load = cfg.add_instruction(Instruction::load(
            secret.clone(),
            Expression::variable(addr),
        ));
        let store = cfg.add_instruction(Instruction::store(
            Expression::variable(scratch),
            Expression::variable(secret),
        ));
        cfg.unconditional_edge(load, store);
        cfg.set_entry(load);
        cfg.add_exit(store);

        let analysis = AddressDependencyAnalysis::default();
        let rel = analysis.get_result(&cfg).unwrap();
        assert_eq!(rel.len(), 1);
        let (_, dependents) = rel.iter().next().unwrap();
        assert_eq!(dependents.len(), 1);
    }

    #[test]
    fn unrelated_instruction_does_not_depend_on_the_load() {
        let mut cfg = Cfg2::new();

        let secret = Variable::new("secret", Sort::bit_vector(64));
        let addr = Variable::new("addr", Sort::bit_vector(64));
        let unrelated = Variable::new("unrelated", Sort::bit_vector(64));

        let load = cfg.add_instruction(Instruction::load(secret, Expression::variable(addr.clone())));
        let assign = cfg.add_instruction(Instruction::assign(unrelated, Expression::variable(addr)));
        cfg.unconditional_edge(load, assign);
        cfg.set_entry(load);
        cfg.add_exit(assign);

        let analysis = AddressDependencyAnalysis::default();
        let rel = analysis.get_result(&cfg).unwrap();
        let (_, dependents) = rel.iter().next().unwrap();
        assert!(dependents.is_empty());
    }
}
