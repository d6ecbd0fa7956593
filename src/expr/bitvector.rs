use crate::environment;
use crate::error::Result;
use crate::expr::{Expression, Sort, Variable};
use num_bigint::BigUint;
use num_traits::Zero;
use std::convert::TryFrom;
use std::fmt;

/// A fixed-width bit-vector constant, represented as an arbitrary-precision
/// unsigned magnitude plus its declared width.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Value {
    value: BigUint,
    bits: usize,
}

impl Value {
    pub fn new(value: u64, bits: usize) -> Self {
        Self::new_big(BigUint::from(value), bits)
    }

    pub fn new_big(value: BigUint, bits: usize) -> Self {
        let mask = (BigUint::from(1u8) << bits) - 1u8;
        Self {
            value: value & mask,
            bits,
        }
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn value_u64(&self) -> Option<u64> {
        use num_traits::ToPrimitive;
        self.value.to_u64()
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}:{}", self.value, self.bits)
    }
}

pub use Value as BitVectorValue;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum BitVector {
    Constant(Value),
    ToBoolean,
    FromBoolean(usize),
    Concat,
    Extract(usize, usize),
    Truncate(usize),
    Not,
    And,
    Or,
    Neg,
    Add,
    Sub,
    Mul,
    UDiv,
    URem,
    Shl,
    LShr,
    AShr,
    Xor,
    ULt,
    ULe,
    UGt,
    UGe,
    SLt,
    SLe,
    SGt,
    SGe,
    ZeroExtend(usize),
    SignExtend(usize),
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Constant(v) => return write!(f, "{}", v),
            Self::ToBoolean => "bv2bool".to_owned(),
            Self::FromBoolean(i) => format!("(bool2bv {})", i),
            Self::Concat => "bvconcat".to_owned(),
            Self::Extract(i, j) => format!("(bvextract {} {})", i, j),
            Self::Truncate(i) => format!("(bvtrunc {})", i),
            Self::Not => "bvnot".to_owned(),
            Self::And => "bvand".to_owned(),
            Self::Or => "bvor".to_owned(),
            Self::Neg => "bvneg".to_owned(),
            Self::Add => "bvadd".to_owned(),
            Self::Sub => "bvsub".to_owned(),
            Self::Mul => "bvmul".to_owned(),
            Self::UDiv => "bvudiv".to_owned(),
            Self::URem => "bvurem".to_owned(),
            Self::Shl => "bvshl".to_owned(),
            Self::LShr => "bvlshr".to_owned(),
            Self::AShr => "bvashr".to_owned(),
            Self::Xor => "bvxor".to_owned(),
            Self::ULt => "bvult".to_owned(),
            Self::ULe => "bvule".to_owned(),
            Self::UGt => "bvugt".to_owned(),
            Self::UGe => "bvuge".to_owned(),
            Self::SLt => "bvslt".to_owned(),
            Self::SLe => "bvsle".to_owned(),
            Self::SGt => "bvsgt".to_owned(),
            Self::SGe => "bvsge".to_owned(),
            Self::ZeroExtend(i) => format!("(bvzext {})", i),
            Self::SignExtend(i) => format!("(bvsext {})", i),
        };
        write!(f, "{}", s)
    }
}

macro_rules! bv_unary {
    ( $name:ident, $op:expr ) => {
        pub fn $name(expr: Expression) -> Result<Expression> {
            expr.sort().expect_bit_vector()?;

            let result_sort = expr.sort().clone();
            Ok(Expression::new($op.into(), vec![expr], result_sort))
        }
    };
}

macro_rules! bv_arith {
    ( $name:ident, $op:expr ) => {
        pub fn $name(lhs: Expression, rhs: Expression) -> Result<Expression> {
            lhs.sort().expect_bit_vector()?;
            rhs.sort().expect_sort(lhs.sort())?;

            let result_sort = lhs.sort().clone();
            Ok(Expression::new($op.into(), vec![lhs, rhs], result_sort))
        }
    };
}

macro_rules! bv_comp {
    ( $name:ident, $op:expr ) => {
        pub fn $name(lhs: Expression, rhs: Expression) -> Result<Expression> {
            lhs.sort().expect_bit_vector()?;
            rhs.sort().expect_sort(lhs.sort())?;

            Ok(Expression::new($op.into(), vec![lhs, rhs], Sort::boolean()))
        }
    };
}

impl BitVector {
    pub fn variable(name: &str, bits: usize) -> Variable {
        Variable::new(name, Sort::bit_vector(bits))
    }

    pub fn word_variable(name: &str) -> Variable {
        Variable::new(name, Sort::word())
    }

    pub fn constant(value: Value) -> Expression {
        let bits = value.bits();
        Expression::new(Self::Constant(value).into(), vec![], Sort::bit_vector(bits))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    pub fn word_constant(value: u64) -> Expression {
        Self::constant_u64(value, environment::WORD_SIZE)
    }

    pub fn constant_u64(value: u64, bits: usize) -> Expression {
        Self::constant(Value::new(value, bits))
    }

    pub fn constant_big_uint(value: BigUint) -> Expression {
        let bits = value.bits().max(1) as usize;
        Self::constant(Value::new_big(value, bits))
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_boolean(expr: Expression) -> Result<Expression> {
        expr.sort().expect_bit_vector()?;

        Ok(Expression::new(
            BitVector::ToBoolean.into(),
            vec![expr],
            Sort::boolean(),
        ))
    }

    pub fn from_boolean(bits: usize, expr: Expression) -> Result<Expression> {
        expr.sort().expect_boolean()?;

        Ok(Expression::new(
            BitVector::FromBoolean(bits).into(),
            vec![expr],
            Sort::bit_vector(bits),
        ))
    }

    bv_unary!(not, Self::Not);
    bv_unary!(neg, Self::Neg);

    bv_arith!(and, Self::And);
    bv_arith!(or, Self::Or);
    bv_arith!(xor, Self::Xor);
    bv_arith!(add, Self::Add);
    bv_arith!(sub, Self::Sub);
    bv_arith!(mul, Self::Mul);
    bv_arith!(udiv, Self::UDiv);
    bv_arith!(urem, Self::URem);
    bv_arith!(shl, Self::Shl);
    bv_arith!(lshr, Self::LShr);
    bv_arith!(ashr, Self::AShr);

    bv_comp!(ult, Self::ULt);
    bv_comp!(ule, Self::ULe);
    bv_comp!(ugt, Self::UGt);
    bv_comp!(uge, Self::UGe);
    bv_comp!(slt, Self::SLt);
    bv_comp!(sle, Self::SLe);
    bv_comp!(sgt, Self::SGt);
    bv_comp!(sge, Self::SGe);

    pub fn zero_extend(n: usize, expr: Expression) -> Result<Expression> {
        expr.sort().expect_bit_vector()?;
        let width = expr.sort().unwrap_bit_vector();

        Ok(Expression::new(
            Self::ZeroExtend(n).into(),
            vec![expr],
            Sort::bit_vector(width + n),
        ))
    }

    pub fn zero_extend_to_word(expr: Expression) -> Result<Expression> {
        expr.sort().expect_bit_vector()?;
        let width = expr.sort().unwrap_bit_vector();
        Self::zero_extend(environment::WORD_SIZE - width, expr)
    }

    pub fn extract(highest_bit: usize, lowest_bit: usize, expr: Expression) -> Result<Expression> {
        expr.sort().expect_bit_vector()?;

        Ok(Expression::new(
            Self::Extract(highest_bit, lowest_bit).into(),
            vec![expr],
            Sort::bit_vector(highest_bit - lowest_bit + 1),
        ))
    }

    pub fn concat(exprs: &[Expression]) -> Result<Expression> {
        for expr in exprs {
            expr.sort().expect_bit_vector()?;
        }

        if exprs.len() == 1 {
            return Ok(exprs[0].clone());
        }

        let result_width = exprs
            .iter()
            .map(|expr| expr.sort().unwrap_bit_vector())
            .sum();

        Ok(Expression::new(
            Self::Concat.into(),
            exprs.to_vec(),
            Sort::bit_vector(result_width),
        ))
    }
}

impl TryFrom<&BitVector> for bool {
    type Error = &'static str;

    fn try_from(b: &BitVector) -> std::result::Result<bool, Self::Error> {
        match b {
            BitVector::Constant(v) => Ok(!v.is_zero()),
            _ => Err("not a constant"),
        }
    }
}

impl TryFrom<&BitVector> for u64 {
    type Error = &'static str;

    fn try_from(b: &BitVector) -> std::result::Result<u64, Self::Error> {
        match b {
            BitVector::Constant(v) => v.value_u64().ok_or("does not fit into u64"),
            _ => Err("not a constant"),
        }
    }
}

impl TryFrom<&BitVector> for Value {
    type Error = &'static str;

    fn try_from(b: &BitVector) -> std::result::Result<Value, Self::Error> {
        match b {
            BitVector::Constant(v) => Ok(v.clone()),
            _ => Err("not a constant"),
        }
    }
}
