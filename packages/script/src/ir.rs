//! Resolved, typed form of a unit, as produced by the checker and run by
//! the interpreter. Names are gone: locals are frame slots, fields are
//! indexes and calls point at their target.

use std::sync::Arc;

use crate::library::NativeFunction;
use crate::types::{StructType, Type};
use crate::value::Value;

/// Functions of one unit or library. Calls between them use
/// [`Callee::Local`].
#[derive(Debug, Default)]
pub struct FunctionTable {
    pub functions: Vec<Function>,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub frame_size: usize,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Callee {
    Native(&'static NativeFunction),
    /// Index into the table of the code currently running.
    Local(usize),
    /// Function of a referenced library.
    Library(Arc<FunctionTable>, usize),
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug)]
pub enum StmtKind {
    Let {
        slot: usize,
        value: Expr,
    },
    /// `op` is set for compound assignment.
    Assign {
        place: Place,
        op: Option<BinaryOp>,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `while` and `for`. `step` runs after the body and after `continue`.
    Loop {
        cond: Option<Expr>,
        body: Vec<Stmt>,
        step: Vec<Stmt>,
    },
    /// Iterates a snapshot of `iterable`; each element is widened to
    /// `element` before it is stored in `slot`.
    Foreach {
        slot: usize,
        element: Type,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Block(Vec<Stmt>),
}

/// An assignable location: a local, optionally followed by field and element
/// accesses.
#[derive(Debug)]
pub struct Place {
    pub slot: usize,
    pub steps: Vec<PlaceStep>,
}

#[derive(Debug)]
pub enum PlaceStep {
    Field(usize),
    Index(Expr),
}

#[derive(Debug)]
pub enum Expr {
    Const(Value),
    /// Zero value of a type, built when evaluated.
    Default(Type),
    Local(usize),
    Field {
        object: Box<Expr>,
        index: usize,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Length(Box<Expr>),
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Implicit numeric widening.
    Widen {
        value: Box<Expr>,
        to: Type,
    },
    NewStruct {
        ty: Arc<StructType>,
        inits: Vec<(usize, Expr)>,
    },
    NewArray(Vec<Expr>),
    NewArrayOfLength {
        element: Type,
        length: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}
