use crate::environment;
use crate::error::Result;
use crate::expr;
use crate::solver::{CheckResult, DumpFormula, Model, Solver};
use num_bigint::BigUint;
use rsmt2::parse::*;
use rsmt2::print::{Expr2Smt, Sort2Smt, Sym2Smt};
use rsmt2::{Logic, SmtConf};
use std::cell::RefCell;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

pub struct RSMTSolver {
    solver: Rc<RefCell<rsmt2::Solver<Parser>>>,
}

impl RSMTSolver {
    pub fn new_from_env(env: &environment::Environment) -> Result<Self> {
        let mut conf = match env.solver() {
            environment::SolverKind::Z3 => SmtConf::z3(),
            environment::SolverKind::CVC4 => SmtConf::cvc4(),
            environment::SolverKind::Yices2 => SmtConf::yices_2(),
        };

        conf.models();

        let parser = Parser::new();
        let mut solver = rsmt2::Solver::new(conf, parser)?;
        solver.set_logic(Logic::QF_AUFBV)?;

        Ok(Self {
            solver: Rc::new(RefCell::new(solver)),
        })
    }
}

impl DumpFormula for RSMTSolver {
    fn dump_formula_to_file(&self, path: &Path) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        let file = File::create(Path::new(path))?;
        Ok(solver.tee(file)?)
    }
}

impl Solver for RSMTSolver {
    fn declare(&mut self, variable: &expr::Variable) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        Ok(solver.declare_const(variable, variable.sort())?)
    }

    fn define(&mut self, variable: &expr::Variable, expr: &expr::Expression) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        if expr.is_nondet() {
            Ok(solver.declare_const(variable, variable.sort())?)
        } else {
            Ok(solver.define_const(variable, variable.sort(), expr)?)
        }
    }

    fn assert(&mut self, expr: &expr::Expression) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        Ok(solver.assert(expr)?)
    }

    fn push(&mut self) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        Ok(solver.push(1)?)
    }

    fn pop(&mut self) -> Result<()> {
        let mut solver = self.solver.borrow_mut();
        Ok(solver.pop(1)?)
    }

    fn check_sat_with_timeout(&mut self, timeout: Duration) -> Result<CheckResult> {
        {
            let mut solver = self.solver.borrow_mut();
            let _ = solver.set_option("timeout", &timeout.as_millis().to_string());
        }

        let mut solver = self.solver.borrow_mut();
        match solver.check_sat_or_unk() {
            Ok(Some(true)) => {
                drop(solver);
                let model = Box::new(RSMTModel::new(Rc::clone(&self.solver)));
                Ok(CheckResult::Sat(model))
            }
            Ok(Some(false)) => Ok(CheckResult::Unsat),
            Ok(None) => Ok(CheckResult::Unknown),
            Err(e) => Err(e.into()),
        }
    }
}

impl Expr2Smt<()> for expr::Expression {
    fn expr_to_smt2<Writer>(&self, w: &mut Writer, i: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        if self.operands().is_empty() {
            self.operator().expr_to_smt2(w, i)
        } else {
            write!(w, "(")?;
            self.operator().expr_to_smt2(w, i)?;
            for operand in self.operands() {
                write!(w, " ")?;
                operand.expr_to_smt2(w, i)?;
            }
            write!(w, ")")?;
            Ok(())
        }
    }
}

impl Expr2Smt<()> for expr::Operator {
    fn expr_to_smt2<Writer>(&self, w: &mut Writer, i: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        match self {
            Self::Variable(v) => v.sym_to_smt2(w, i),
            Self::Ite => {
                write!(w, "ite")?;
                Ok(())
            }
            Self::Equal => {
                write!(w, "=")?;
                Ok(())
            }
            Self::Nondet => Err("Incorrect use of nondet()".into()),
            Self::Boolean(op) => op.expr_to_smt2(w, i),
            Self::BitVector(op) => op.expr_to_smt2(w, i),
            Self::Array(op) => op.expr_to_smt2(w, i),
        }
    }
}

impl Expr2Smt<()> for expr::Boolean {
    fn expr_to_smt2<Writer>(&self, w: &mut Writer, _: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        match self {
            Self::True => write!(w, "true")?,
            Self::False => write!(w, "false")?,
            Self::Not => write!(w, "not")?,
            Self::Imply => write!(w, "=>")?,
            Self::And => write!(w, "and")?,
            Self::Or => write!(w, "or")?,
            Self::Xor => write!(w, "xor")?,
        };
        Ok(())
    }
}

impl Expr2Smt<()> for expr::BitVector {
    fn expr_to_smt2<Writer>(&self, w: &mut Writer, _: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        match self {
            Self::Constant(v) => write!(w, "(_ bv{} {})", v.value(), v.bits())?,
            Self::Concat => write!(w, "concat")?,
            Self::Extract(i, j) => write!(w, "(_ extract {} {})", i, j)?,
            Self::Truncate(i) => write!(w, "(_ extract {} 0)", i - 1)?,
            Self::Not => write!(w, "bvnot")?,
            Self::And => write!(w, "bvand")?,
            Self::Or => write!(w, "bvor")?,
            Self::Neg => write!(w, "bvneg")?,
            Self::Add => write!(w, "bvadd")?,
            Self::Sub => write!(w, "bvsub")?,
            Self::Mul => write!(w, "bvmul")?,
            Self::UDiv => write!(w, "bvudiv")?,
            Self::URem => write!(w, "bvurem")?,
            Self::Shl => write!(w, "bvshl")?,
            Self::LShr => write!(w, "bvlshr")?,
            Self::AShr => write!(w, "bvashr")?,
            Self::Xor => write!(w, "bvxor")?,
            Self::ULt => write!(w, "bvult")?,
            Self::ULe => write!(w, "bvule")?,
            Self::UGt => write!(w, "bvugt")?,
            Self::UGe => write!(w, "bvuge")?,
            Self::SLt => write!(w, "bvslt")?,
            Self::SLe => write!(w, "bvsle")?,
            Self::SGt => write!(w, "bvsgt")?,
            Self::SGe => write!(w, "bvsge")?,
            Self::ZeroExtend(i) => write!(w, "(_ zero_extend {})", i)?,
            Self::SignExtend(i) => write!(w, "(_ sign_extend {})", i)?,
            Self::ToBoolean | Self::FromBoolean(_) => {
                panic!("ToBoolean/FromBoolean should have been lowered before reaching the solver")
            }
        };
        Ok(())
    }
}

impl Expr2Smt<()> for expr::Array {
    fn expr_to_smt2<Writer>(&self, w: &mut Writer, _: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        match self {
            Self::Select => write!(w, "select")?,
            Self::Store => write!(w, "store")?,
        };
        Ok(())
    }
}

impl Sym2Smt<()> for expr::Variable {
    fn sym_to_smt2<Writer>(&self, w: &mut Writer, _: ()) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        write!(w, "{}", self.identifier())?;
        Ok(())
    }
}

impl Sort2Smt for expr::Sort {
    fn sort_to_smt2<Writer>(&self, w: &mut Writer) -> rsmt2::SmtRes<()>
    where
        Writer: ::std::io::Write,
    {
        match self {
            Self::Boolean => write!(w, "Bool")?,
            Self::BitVector(width) => write!(w, "(_ BitVec {})", width)?,
            Self::Array { range, domain } => {
                write!(w, "(Array ")?;
                range.sort_to_smt2(w)?;
                write!(w, " ")?;
                domain.sort_to_smt2(w)?;
                write!(w, ")")?
            }
        };
        Ok(())
    }
}

struct RSMTModel {
    solver: Rc<RefCell<rsmt2::Solver<Parser>>>,
}

impl RSMTModel {
    pub fn new(solver: Rc<RefCell<rsmt2::Solver<Parser>>>) -> Self {
        Self { solver }
    }
}

impl Model for RSMTModel {
    fn get_interpretation(&self, variable: &expr::Variable) -> Option<expr::Constant> {
        self.evaluate(&variable.clone().into())
    }

    fn evaluate(&self, expr: &expr::Expression) -> Option<expr::Constant> {
        let mut solver = self.solver.borrow_mut();
        let result = solver.get_values(&[expr]).ok()?;
        result.first().map(|(_, value)| value.clone())
    }
}

mod parser {
    use super::*;
    use nom::{
        branch::alt,
        bytes::complete::{tag, take_while1},
        character::complete::{char, digit1, hex_digit1, multispace1},
        combinator::{all_consuming, map, map_res, value},
        sequence::{preceded, terminated, tuple},
        IResult,
    };

    fn bit_vec_sort(input: &str) -> IResult<&str, expr::Sort> {
        map(
            tuple((
                tag("(_"),
                multispace1,
                tag("BitVec"),
                multispace1,
                map_res(digit1, FromStr::from_str),
                char(')'),
            )),
            |(_, _, _, _, bits, _)| expr::Sort::bit_vector(bits),
        )(input)
    }

    fn array_sort(input: &str) -> IResult<&str, expr::Sort> {
        map(
            tuple((
                tag("(Array"),
                multispace1,
                sort,
                multispace1,
                sort,
                char(')'),
            )),
            |(_, _, range, _, domain, _)| expr::Sort::array(&range, &domain),
        )(input)
    }

    fn sort(input: &str) -> IResult<&str, expr::Sort> {
        alt((value(expr::Sort::Boolean, tag("Bool")), bit_vec_sort, array_sort))(input)
    }

    fn bin_digit1(input: &str) -> IResult<&str, &str> {
        take_while1(|c| c == '0' || c == '1')(input)
    }

    fn boolean_literal(input: &str) -> IResult<&str, expr::Constant> {
        alt((
            value(expr::Constant::boolean(false), tag("false")),
            value(expr::Constant::boolean(true), tag("true")),
        ))(input)
    }

    fn bitvec_literal_hex(input: &str) -> IResult<&str, expr::Constant> {
        let from_str = |s: &str| {
            expr::Constant::bit_vector_big_uint(BigUint::parse_bytes(s.as_bytes(), 16).unwrap())
        };
        map(preceded(tag("#x"), hex_digit1), from_str)(input)
    }

    fn bitvec_literal_binary(input: &str) -> IResult<&str, expr::Constant> {
        let from_str = |s: &str| {
            expr::Constant::bit_vector_big_uint(BigUint::parse_bytes(s.as_bytes(), 2).unwrap())
        };
        map(preceded(tag("#b"), bin_digit1), from_str)(input)
    }

    fn bitvec_literal_smt(input: &str) -> IResult<&str, expr::Constant> {
        // (_ bv42 64)
        map(
            tuple((tag("(_ bv"), digit1, char(' '), digit1, char(')'))),
            |(_, value, _, _, _)| {
                let value: &str = value;
                expr::Constant::bit_vector_big_uint(
                    BigUint::parse_bytes(value.as_bytes(), 10).unwrap(),
                )
            },
        )(input)
    }

    fn bitvec_literal(input: &str) -> IResult<&str, expr::Constant> {
        alt((bitvec_literal_hex, bitvec_literal_binary, bitvec_literal_smt))(input)
    }

    fn as_const(input: &str) -> IResult<&str, expr::Sort> {
        // (as const (Array (_ BitVec 64) (_ BitVec 64)))
        preceded(tag("(as const "), terminated(sort, char(')')))(input)
    }

    fn array_init(input: &str) -> IResult<&str, expr::ArrayValue> {
        map(
            tuple((char('('), as_const, multispace1, literal, char(')'))),
            |(_, _, _, value, _)| expr::ArrayValue::new(Some(value)),
        )(input)
    }

    fn array_store(input: &str) -> IResult<&str, expr::ArrayValue> {
        map(
            tuple((
                tag("(store"),
                multispace1,
                array_nested,
                multispace1,
                literal,
                multispace1,
                literal,
                char(')'),
            )),
            |(_, _, mut arr, _, addr, _, value, _)| {
                arr.store(addr, value);
                arr
            },
        )(input)
    }

    fn array_nested(input: &str) -> IResult<&str, expr::ArrayValue> {
        alt((array_init, array_store))(input)
    }

    fn array_literal(input: &str) -> IResult<&str, expr::Constant> {
        map(array_nested, expr::Constant::array)(input)
    }

    fn literal(input: &str) -> IResult<&str, expr::Constant> {
        alt((boolean_literal, bitvec_literal, array_literal))(input)
    }

    pub(super) fn parse_literal(input: &str) -> rsmt2::SmtRes<expr::Constant> {
        match all_consuming(literal)(input) {
            Ok((_, lit)) => Ok(lit),
            Err(_) => Err("Failed to parse literal!".into()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self {}
    }
}

impl<'a> ValueParser<expr::Constant, &'a str> for Parser {
    fn parse_value(self, input: &'a str) -> rsmt2::SmtRes<expr::Constant> {
        parser::parse_literal(input)
    }
}

impl<'a> ExprParser<String, (), &'a str> for Parser {
    fn parse_expr(self, input: &'a str, _: ()) -> rsmt2::SmtRes<String> {
        Ok(input.into())
    }
}
