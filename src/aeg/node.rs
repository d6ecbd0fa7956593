//! A single AEG node: the symbolic state of one instruction instance in the
//! expanded speculative CFG (`expanded::ExpandedRef`).

use crate::expanded::ExpandedRef;
use crate::expr::{Boolean, Expression, Sort, Variable};

#[derive(Clone, Debug)]
pub struct Node {
    source: ExpandedRef,
    write: bool,
    read: bool,
    arch: Variable,
    trans: Variable,
    exec: Variable,
    addr: Option<Variable>,
    data: Option<Variable>,
    arch_order: Variable,
    xsaccess_order: Variable,
    taint: Option<Expression>,
}

impl Node {
    pub(super) fn new(index: usize, source: ExpandedRef, write: bool, read: bool) -> Self {
        let is_memory_op = write || read;
        Self {
            source,
            write,
            read,
            arch: Variable::new(format!("arch_{}", index), Sort::boolean()),
            trans: Variable::new(format!("trans_{}", index), Sort::boolean()),
            exec: Variable::new(format!("exec_{}", index), Sort::boolean()),
            addr: is_memory_op.then(|| Variable::new(format!("addr_{}", index), Sort::word())),
            data: is_memory_op.then(|| Variable::new(format!("data_{}", index), Sort::word())),
            arch_order: Variable::new(format!("arch_order_{}", index), Sort::word()),
            xsaccess_order: Variable::new(format!("xsaccess_order_{}", index), Sort::word()),
            taint: None,
        }
    }

    pub fn source(&self) -> ExpandedRef {
        self.source
    }

    pub fn is_memory_op(&self) -> bool {
        self.addr.is_some()
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn arch(&self) -> Expression {
        Expression::variable(self.arch.clone())
    }

    pub fn arch_variable(&self) -> &Variable {
        &self.arch
    }

    pub fn trans(&self) -> Expression {
        Expression::variable(self.trans.clone())
    }

    pub fn trans_variable(&self) -> &Variable {
        &self.trans
    }

    pub fn exec(&self) -> Expression {
        Expression::variable(self.exec.clone())
    }

    pub fn exec_variable(&self) -> &Variable {
        &self.exec
    }

    pub fn write(&self) -> Expression {
        Boolean::constant(self.write)
    }

    pub fn read(&self) -> Expression {
        Boolean::constant(self.read)
    }

    pub fn addr(&self) -> Option<Expression> {
        self.addr.clone().map(Expression::variable)
    }

    pub fn addr_variable(&self) -> Option<&Variable> {
        self.addr.as_ref()
    }

    pub fn data(&self) -> Option<Expression> {
        self.data.clone().map(Expression::variable)
    }

    pub fn data_variable(&self) -> Option<&Variable> {
        self.data.as_ref()
    }

    pub fn arch_order(&self) -> Expression {
        Expression::variable(self.arch_order.clone())
    }

    pub fn arch_order_variable(&self) -> &Variable {
        &self.arch_order
    }

    pub fn xsaccess_order(&self) -> Expression {
        Expression::variable(self.xsaccess_order.clone())
    }

    pub fn xsaccess_order_variable(&self) -> &Variable {
        &self.xsaccess_order
    }

    pub fn taint(&self) -> Option<&Expression> {
        self.taint.as_ref()
    }

    pub(super) fn set_taint(&mut self, taint: Expression) {
        self.taint = Some(taint);
    }
}
