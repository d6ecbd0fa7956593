//! A serde-based loader for the toy instruction-sequence module format:
//! functions made of basic blocks, each a short list of instructions
//! written in a small textual form (`store(p, 0)`, `r = load(p)`, ...) and
//! parsed here into `instr::Instruction`/`expr::Expression`.

use crate::cfg::{Cfg2, NodeRef};
use crate::error::Result;
use crate::expr::{BitVector, Expression, Sort, Variable};
use crate::instr::Instruction;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ModuleFile {
    functions: Vec<FunctionDef>,
}

#[derive(Debug, Deserialize)]
struct FunctionDef {
    name: String,
    #[serde(default)]
    entry: usize,
    blocks: Vec<BlockDef>,
}

#[derive(Debug, Deserialize)]
struct BlockDef {
    id: usize,
    #[serde(default)]
    instructions: Vec<String>,
    /// Unconditional (or fallthrough) successors.
    #[serde(default)]
    successors: Vec<usize>,
    /// When set, the block ends in a branch; this is the taken target and
    /// every id in `successors` is the not-taken target(s).
    #[serde(default)]
    taken: Option<usize>,
}

/// A loaded module: every function's `Cfg2`, keyed by name.
pub struct Module {
    functions: HashMap<String, Cfg2>,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = (&String, &Cfg2)> {
        self.functions.iter()
    }

    pub fn function(&self, name: &str) -> Option<&Cfg2> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

pub fn load_file(path: &Path) -> Result<Module> {
    let file = std::fs::File::open(path)?;
    let module_file: ModuleFile = serde_yaml::from_reader(file)?;
    load(module_file)
}

fn load(module_file: ModuleFile) -> Result<Module> {
    let mut functions = HashMap::new();
    for function in &module_file.functions {
        functions.insert(function.name.clone(), build_cfg(function)?);
    }
    Ok(Module { functions })
}

fn build_cfg(function: &FunctionDef) -> Result<Cfg2> {
    let mut cfg = Cfg2::new();
    let mut block_nodes: HashMap<usize, Vec<NodeRef>> = HashMap::new();

    for block in &function.blocks {
        let mut nodes = Vec::with_capacity(block.instructions.len());
        for text in &block.instructions {
            let instruction = parse_instruction(text)?;
            nodes.push(cfg.add_instruction(instruction));
        }
        for pair in nodes.windows(2) {
            cfg.unconditional_edge(pair[0], pair[1]);
        }
        block_nodes.insert(block.id, nodes);
    }

    for block in &function.blocks {
        let nodes = block_nodes
            .get(&block.id)
            .ok_or_else(|| format!("block {} was not registered", block.id))?;
        let last = *nodes
            .last()
            .ok_or_else(|| format!("block {} has no instructions", block.id))?;

        if let Some(taken_id) = block.taken {
            let taken_first = first_node(&block_nodes, taken_id)?;
            cfg.conditional_edge(last, taken_first, true);
            for &succ_id in &block.successors {
                let succ_first = first_node(&block_nodes, succ_id)?;
                cfg.conditional_edge(last, succ_first, false);
            }
        } else {
            for &succ_id in &block.successors {
                let succ_first = first_node(&block_nodes, succ_id)?;
                cfg.unconditional_edge(last, succ_first);
            }
        }

        if block.successors.is_empty() && block.taken.is_none() {
            cfg.add_exit(last);
        }
    }

    let entry_first = first_node(&block_nodes, function.entry)?;
    cfg.set_entry(entry_first);

    Ok(cfg)
}

fn first_node(block_nodes: &HashMap<usize, Vec<NodeRef>>, id: usize) -> Result<NodeRef> {
    block_nodes
        .get(&id)
        .and_then(|nodes| nodes.first())
        .copied()
        .ok_or_else(|| format!("block {} does not exist or is empty", id).into())
}

/// Parses one instruction line. Grammar (whitespace-insensitive around
/// tokens):
///
/// ```text
/// ident "=" "load" "(" operand ")"
/// "store" "(" operand "," operand ")"
/// ident "=" operand                       ; assign
/// "branch" "(" operand ")"
/// "barrier"
/// ident "=" "call" "(" hex-address ")"
/// "call" "(" hex-address ")"
/// ```
///
/// `operand` is an identifier, an unsigned integer literal (a word-sized
/// constant), or `nondet()`.
fn parse_instruction(text: &str) -> Result<Instruction> {
    let text = text.trim();

    if text == "barrier" {
        return Ok(Instruction::barrier());
    }
    if let Some(rest) = text.strip_prefix("branch") {
        let cond = parse_call_style_args(rest, 1)?;
        return Ok(Instruction::branch(cond.into_iter().next().unwrap()));
    }
    if let Some(rest) = text.strip_prefix("store") {
        let mut args = parse_call_style_args(rest, 2)?.into_iter();
        let address = args.next().unwrap();
        let value = args.next().unwrap();
        return Ok(Instruction::store(address, value));
    }

    if let Some((lhs, rhs)) = split_assignment(text) {
        let variable = Variable::new(lhs.trim(), Sort::word());
        let rhs = rhs.trim();
        if let Some(rest) = rhs.strip_prefix("load") {
            let address = parse_call_style_args(rest, 1)?.into_iter().next().unwrap();
            return Ok(Instruction::load(variable, address));
        }
        if let Some(rest) = rhs.strip_prefix("call") {
            let target = parse_hex_address(strip_parens(rest)?.trim())?;
            return Ok(Instruction::call(target, Some(variable)));
        }
        let value = parse_operand(rhs)?;
        return Ok(Instruction::assign(variable, value));
    }

    if let Some(rest) = text.strip_prefix("call") {
        let target = parse_hex_address(strip_parens(rest)?.trim())?;
        return Ok(Instruction::call(target, None));
    }

    Err(format!("could not parse instruction: {:?}", text).into())
}

fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let eq = text.find('=')?;
    // Don't confuse `==` (not part of this grammar, but defensive) with `=`.
    if text[eq + 1..].starts_with('=') {
        return None;
    }
    Some((&text[..eq], &text[eq + 1..]))
}

fn strip_parens(text: &str) -> Result<&str> {
    let text = text.trim();
    let inner = text
        .strip_prefix('(')
        .ok_or_else(|| format!("expected '(' in {:?}", text))?
        .strip_suffix(')')
        .ok_or_else(|| format!("expected ')' in {:?}", text))?;
    Ok(inner)
}

fn parse_call_style_args(text: &str, expected: usize) -> Result<Vec<Expression>> {
    let inner = strip_parens(text)?;
    let operands: Vec<Expression> = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner
            .split(',')
            .map(parse_operand)
            .collect::<Result<Vec<_>>>()?
    };
    if operands.len() != expected {
        return Err(format!("expected {} argument(s), got {:?}", expected, text).into());
    }
    Ok(operands)
}

fn parse_operand(text: &str) -> Result<Expression> {
    let text = text.trim();
    if text == "nondet()" {
        return Ok(Expression::nondet(Sort::word()));
    }
    if let Ok(value) = text.parse::<u64>() {
        return Ok(BitVector::word_constant(value));
    }
    if is_identifier(text) {
        return Ok(Expression::variable(Variable::new(text, Sort::word())));
    }
    Err(format!("could not parse operand: {:?}", text).into())
}

fn parse_hex_address(text: &str) -> Result<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid address {:?}: {}", text, e).into())
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_load_load_as_three_instructions() {
        let store = parse_instruction("store(p, 0)").unwrap();
        assert!(store.is_store());

        let load = parse_instruction("r = load(p)").unwrap();
        assert!(load.is_load());
        assert_eq!(load.result().unwrap().name(), "r");

        let assign = parse_instruction("x = nondet()").unwrap();
        assert!(assign.is_assign());
    }

    #[test]
    fn parses_branch_and_barrier() {
        assert!(parse_instruction("barrier").unwrap().is_barrier());
        assert!(parse_instruction("branch(c)").unwrap().is_branch());
    }

    #[test]
    fn parses_call_with_and_without_result() {
        let call = parse_instruction("r = call(0x1000)").unwrap();
        assert_eq!(call.call_target(), Some(0x1000));
        assert_eq!(call.result().unwrap().name(), "r");

        let call_no_result = parse_instruction("call(0x2A)").unwrap();
        assert_eq!(call_no_result.call_target(), Some(0x2A));
        assert!(call_no_result.result().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_instruction("this is not an instruction").is_err());
    }

    #[test]
    fn builds_a_straight_line_cfg_from_yaml() {
        let yaml = r#"
functions:
  - name: victim
    entry: 0
    blocks:
      - id: 0
        instructions:
          - "store(p, 0)"
          - "store(p, 1)"
          - "r = load(p)"
          - "s = load(r)"
        successors: []
"#;
        let module_file: ModuleFile = serde_yaml::from_str(yaml).unwrap();
        let module = load(module_file).unwrap();
        let cfg = module.function("victim").unwrap();
        assert_eq!(cfg.nodes().count(), 4);
        assert_eq!(cfg.exits().len(), 1);
    }

    #[test]
    fn builds_a_branch_with_taken_and_fallthrough_targets() {
        let yaml = r#"
functions:
  - name: f
    entry: 0
    blocks:
      - id: 0
        instructions:
          - "branch(c)"
        taken: 1
        successors: [2]
      - id: 1
        instructions:
          - "barrier"
        successors: []
      - id: 2
        instructions:
          - "barrier"
        successors: []
"#;
        let module_file: ModuleFile = serde_yaml::from_str(yaml).unwrap();
        let module = load(module_file).unwrap();
        let cfg = module.function("f").unwrap();
        assert_eq!(cfg.exits().len(), 2);
    }
}
